use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common_types::{Post, Sentiment, Topic};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::fetch::{FetchError, HttpClient};
use crate::sources::SourceAdapter;

const TOP_STORIES_URL: &str = "https://hacker-news.firebaseio.com/v0/topstories.json";
const ITEM_URL: &str = "https://hacker-news.firebaseio.com/v0/item";

/// Pause after every 10 item fetches, to stay friendly with the API.
const ITEM_BATCH_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Deserialize)]
struct HnItem {
    id: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    by: String,
    #[serde(default)]
    score: i32,
    #[serde(default, rename = "type")]
    kind: String,
}

/// Ranked-story adapter: one request for the ordered id list, then one per
/// story, truncated to `stories_limit`.
pub struct HackerNewsAdapter {
    client: HttpClient,
    stories_limit: usize,
}

impl HackerNewsAdapter {
    pub fn new(client: HttpClient, stories_limit: usize) -> Self {
        Self {
            client,
            stories_limit,
        }
    }

    async fn fetch_story(&self, id: i64) -> Result<Option<Post>, FetchError> {
        let body = self.client.get(&format!("{ITEM_URL}/{id}.json")).await?;
        let item: HnItem = serde_json::from_slice(&body)
            .map_err(|e| FetchError::Exhausted {
                attempts: 0,
                last: format!("undecodable item {id}: {e}"),
            })?;
        Ok(post_from_item(item))
    }
}

#[async_trait]
impl SourceAdapter for HackerNewsAdapter {
    async fn fetch(&self) -> Result<Vec<Post>, FetchError> {
        info!("fetching HackerNews top stories");

        let body = self.client.get(TOP_STORIES_URL).await?;
        let mut story_ids: Vec<i64> = serde_json::from_slice(&body).map_err(|e| {
            FetchError::Exhausted {
                attempts: 0,
                last: format!("undecodable top stories list: {e}"),
            }
        })?;
        story_ids.truncate(self.stories_limit);

        debug!("got {} story ids, fetching details", story_ids.len());

        let mut posts = Vec::with_capacity(story_ids.len());
        for (i, id) in story_ids.iter().enumerate() {
            match self.fetch_story(*id).await {
                Ok(Some(post)) => posts.push(post),
                Ok(None) => {}
                Err(e) => warn!("skipping story {id}: {e}"),
            }

            if (i + 1) % 10 == 0 {
                tokio::time::sleep(ITEM_BATCH_DELAY).await;
            }
        }

        info!("fetched {} stories from HackerNews", posts.len());
        Ok(posts)
    }

    fn name(&self) -> &'static str {
        "hn"
    }
}

/// Only real stories with a title or URL become posts; polls, jobs and
/// deleted items are dropped.
fn post_from_item(item: HnItem) -> Option<Post> {
    if item.kind != "story" {
        return None;
    }
    if item.title.is_empty() && item.url.is_empty() {
        return None;
    }

    Some(Post {
        id: item.id.to_string(),
        author: item.by,
        content: item.title.clone(),
        topic: detect_topic(&item.title),
        sentiment: Sentiment::Neutral,
        likes: item.score,
        comments: 0,
        shares: 0,
        platform: "hackernews".to_string(),
        url: (!item.url.is_empty()).then_some(item.url),
        source: Some("hn".to_string()),
        created_at: Utc::now(),
    })
}

const TOPIC_KEYWORDS: &[(&[&str], Topic)] = &[
    (
        &["ai", "llm", "machine learning", "chatgpt", "gpt", "neural"],
        Topic::Ai,
    ),
    (&["cloud", "aws", "gcp", "azure"], Topic::Cloud),
    (&["devops", "kubernetes", "docker", "ci/cd"], Topic::Devops),
    (&["startup", "funding", "venture", "ipo"], Topic::Startup),
];

/// Case-insensitive keyword match over the title. Multi-word and slashed
/// keywords match as substrings; single words must match a whole token, so
/// "raised" never reads as "ai".
fn detect_topic(title: &str) -> Topic {
    let title = title.to_lowercase();

    for (keywords, topic) in TOPIC_KEYWORDS {
        for keyword in *keywords {
            let hit = if keyword.contains(' ') || keyword.contains('/') {
                title.contains(keyword)
            } else {
                title
                    .split(|c: char| !c.is_alphanumeric())
                    .any(|word| word == *keyword)
            };
            if hit {
                return *topic;
            }
        }
    }

    Topic::Programming
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_inference() {
        assert_eq!(detect_topic("Introducing GPT-5"), Topic::Ai);
        assert_eq!(detect_topic("Our startup just raised"), Topic::Startup);
        assert_eq!(detect_topic("On hash tables"), Topic::Programming);
        assert_eq!(detect_topic("Kubernetes at scale"), Topic::Devops);
        assert_eq!(detect_topic("Migrating off AWS"), Topic::Cloud);
        assert_eq!(detect_topic("Machine learning in the wild"), Topic::Ai);
        assert_eq!(detect_topic("Better CI/CD pipelines"), Topic::Devops);
        // "raised" and "said" must not trip the single-word "ai" keyword
        assert_eq!(detect_topic("What they said about Rust"), Topic::Programming);
    }

    fn item(kind: &str, title: &str, url: &str) -> HnItem {
        HnItem {
            id: 1,
            title: title.to_string(),
            url: url.to_string(),
            by: "pg".to_string(),
            score: 42,
            kind: kind.to_string(),
        }
    }

    #[test]
    fn skips_non_story_items() {
        assert!(post_from_item(item("job", "Hiring", "")).is_none());
        assert!(post_from_item(item("poll", "Which?", "")).is_none());
    }

    #[test]
    fn skips_items_without_title_or_url() {
        assert!(post_from_item(item("story", "", "")).is_none());
    }

    #[test]
    fn builds_post_from_story() {
        let post = post_from_item(item("story", "On hash tables", "https://x.test/p")).unwrap();
        assert_eq!(post.id, "1");
        assert_eq!(post.author, "pg");
        assert_eq!(post.content, "On hash tables");
        assert_eq!(post.topic, Topic::Programming);
        assert_eq!(post.likes, 42);
        assert_eq!(post.platform, "hackernews");
        assert_eq!(post.sentiment, Sentiment::Neutral);
        assert_eq!(post.url.as_deref(), Some("https://x.test/p"));
    }

    #[test]
    fn parses_item_json() {
        let raw = r#"{"id": 9, "title": "Show HN: a thing", "by": "alice",
                      "score": 7, "type": "story", "descendants": 3}"#;
        let item: HnItem = serde_json::from_str(raw).unwrap();
        assert_eq!(item.id, 9);
        assert_eq!(item.score, 7);
        assert_eq!(item.kind, "story");
        assert!(item.url.is_empty());
    }
}
