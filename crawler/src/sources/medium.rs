use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common_types::{Post, Sentiment, Topic};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::fetch::{FetchError, HttpClient};
use crate::sources::{SourceAdapter, SUB_SOURCE_DELAY_MS};

const FEED_URL: &str = "https://medium.com/feed/tag";

// Stable item id: the trailing hex-ish run Medium appends to article links
static ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-f0-9]{8,})$").unwrap());
static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static LINK_AUTHOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@([A-Za-z0-9_-]+)").unwrap());

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize, Default)]
struct Item {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "creator", alias = "dc:creator")]
    author: Option<String>,
    #[serde(default, rename = "pubDate")]
    pub_date: Option<String>,
}

/// RSS adapter: one feed per configured topic, `limit` items per feed.
pub struct MediumAdapter {
    client: HttpClient,
    topics: Vec<String>,
    limit: usize,
}

impl MediumAdapter {
    pub fn new(client: HttpClient, topics: Vec<String>, limit: usize) -> Self {
        Self {
            client,
            topics,
            limit,
        }
    }

    async fn fetch_topic(&self, topic: &str) -> Result<Vec<Post>, FetchError> {
        let body = self.client.get(&format!("{FEED_URL}/{topic}")).await?;
        let xml = std::str::from_utf8(&body).map_err(|e| FetchError::Exhausted {
            attempts: 0,
            last: format!("feed for {topic} is not UTF-8: {e}"),
        })?;

        let rss: Rss = quick_xml::de::from_str(xml).map_err(|e| FetchError::Exhausted {
            attempts: 0,
            last: format!("undecodable feed for {topic}: {e}"),
        })?;

        Ok(rss
            .channel
            .item
            .into_iter()
            .take(self.limit)
            .filter_map(|item| post_from_item(item, topic))
            .collect())
    }
}

#[async_trait]
impl SourceAdapter for MediumAdapter {
    async fn fetch(&self) -> Result<Vec<Post>, FetchError> {
        info!("fetching Medium posts");

        let mut posts = Vec::new();
        for topic in &self.topics {
            debug!("crawling feed {topic}");
            match self.fetch_topic(topic).await {
                Ok(topic_posts) => posts.extend(topic_posts),
                Err(e) => warn!("feed {topic} failed: {e}"),
            }

            tokio::time::sleep(Duration::from_millis(SUB_SOURCE_DELAY_MS)).await;
        }

        info!("fetched {} posts from Medium", posts.len());
        Ok(posts)
    }

    fn name(&self) -> &'static str {
        "medium"
    }
}

fn post_from_item(item: Item, topic: &str) -> Option<Post> {
    let link = item.link.as_deref().unwrap_or_default();
    if link.is_empty() {
        return None;
    }

    // Items whose link carries no stable id are skipped outright
    let id = ID_RE.captures(link)?.get(1)?.as_str().to_string();

    let title = item.title.unwrap_or_default();
    let content = match item.description.as_deref() {
        Some(description) if !description.is_empty() => clean_html(description),
        _ => title.clone(),
    };

    let author = match item.author.map(|a| a.trim().to_string()) {
        Some(author) if !author.is_empty() => author,
        _ => LINK_AUTHOR_RE
            .captures(link)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "Unknown".to_string()),
    };

    let created_at = item
        .pub_date
        .as_deref()
        .and_then(parse_pub_date)
        .unwrap_or_else(Utc::now);

    Some(Post {
        id,
        author,
        content,
        topic: map_topic(topic),
        sentiment: Sentiment::Neutral,
        likes: 0,
        comments: 0,
        shares: 0,
        platform: "medium".to_string(),
        url: Some(link.to_string()),
        source: Some("medium".to_string()),
        created_at,
    })
}

/// Strip tags and resolve entities from an RSS description blob.
fn clean_html(raw: &str) -> String {
    let stripped = HTML_TAG_RE.replace_all(raw, "");
    let unescaped = match quick_xml::escape::unescape(stripped.as_ref()) {
        Ok(cow) => cow.into_owned(),
        // Malformed entities: keep the stripped text as-is
        Err(_) => stripped.to_string(),
    };
    unescaped.trim().to_string()
}

/// RFC2822 covers the usual RSS date shapes; RFC3339 is the stray variant.
fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    None
}

fn map_topic(topic: &str) -> Topic {
    match topic {
        "machine-learning" | "artificial-intelligence" => Topic::Ai,
        "cloud-computing" => Topic::Cloud,
        "devops" => Topic::Devops,
        "startups" => Topic::Startup,
        _ => Topic::Programming,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(link: &str) -> Item {
        Item {
            title: Some("Why foo".to_string()),
            link: Some(link.to_string()),
            description: None,
            author: None,
            pub_date: None,
        }
    }

    #[test]
    fn extracts_hex_id_from_link() {
        let post =
            post_from_item(item("https://medium.com/@alice/why-foo-abc123def"), "devops").unwrap();
        assert_eq!(post.id, "abc123def");
        assert_eq!(post.author, "alice");
        assert_eq!(post.topic, Topic::Devops);
    }

    #[test]
    fn skips_links_without_hex_tail() {
        assert!(post_from_item(item("https://medium.com/no-hex/"), "devops").is_none());
        assert!(post_from_item(Item::default(), "devops").is_none());
    }

    #[test]
    fn cleans_html_from_description() {
        let mut it = item("https://medium.com/@bob/thing-deadbeef01");
        it.description = Some("<p>Ship &amp; iterate <em>fast</em></p>".to_string());
        let post = post_from_item(it, "startups").unwrap();
        assert_eq!(post.content, "Ship & iterate fast");
        assert_eq!(post.topic, Topic::Startup);
    }

    #[test]
    fn empty_description_falls_back_to_title() {
        let mut it = item("https://medium.com/@bob/thing-deadbeef01");
        it.description = Some(String::new());
        let post = post_from_item(it, "machine-learning").unwrap();
        assert_eq!(post.content, "Why foo");
        assert_eq!(post.topic, Topic::Ai);
    }

    #[test]
    fn author_falls_back_to_unknown() {
        let post = post_from_item(item("https://medium.com/story-deadbeef01"), "devops").unwrap();
        assert_eq!(post.author, "Unknown");
    }

    #[test]
    fn parses_rfc2822_pub_date() {
        let mut it = item("https://medium.com/@x/y-abcdef1234");
        it.pub_date = Some("Mon, 01 Apr 2024 09:00:00 GMT".to_string());
        let post = post_from_item(it, "devops").unwrap();
        assert_eq!(post.created_at.to_rfc3339(), "2024-04-01T09:00:00+00:00");
    }

    #[test]
    fn unparseable_pub_date_falls_back_to_now() {
        let mut it = item("https://medium.com/@x/y-abcdef1234");
        it.pub_date = Some("yesterday-ish".to_string());
        let before = Utc::now();
        let post = post_from_item(it, "devops").unwrap();
        assert!(post.created_at >= before);
    }

    #[test]
    fn deserializes_feed_xml() {
        let xml = r#"<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
          <channel>
            <title>t</title>
            <item>
              <title>A post</title>
              <link>https://medium.com/@carol/a-post-1234abcd99</link>
              <dc:creator>Carol</dc:creator>
              <pubDate>Tue, 02 Apr 2024 10:00:00 GMT</pubDate>
              <description>&lt;p&gt;Hello&lt;/p&gt;</description>
            </item>
          </channel>
        </rss>"#;
        let rss: Rss = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(rss.channel.item.len(), 1);
        let post = post_from_item(rss.channel.item.into_iter().next().unwrap(), "devops").unwrap();
        assert_eq!(post.id, "1234abcd99");
        assert_eq!(post.author, "Carol");
        assert_eq!(post.content, "Hello");
    }
}
