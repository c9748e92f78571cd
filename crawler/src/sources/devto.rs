use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common_types::{Post, Sentiment, Topic};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::fetch::{FetchError, HttpClient};
use crate::sources::{SourceAdapter, SUB_SOURCE_DELAY_MS};

const ARTICLES_URL: &str = "https://dev.to/api/articles";

#[derive(Debug, Deserialize)]
struct DevtoArticle {
    id: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    user: DevtoUser,
    #[serde(default)]
    published_at: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DevtoUser {
    #[serde(default)]
    name: String,
}

/// Tag-indexed REST adapter: one page-sized request per configured tag.
pub struct DevtoAdapter {
    client: HttpClient,
    tags: Vec<String>,
    per_page: usize,
}

impl DevtoAdapter {
    pub fn new(client: HttpClient, tags: Vec<String>, per_page: usize) -> Self {
        Self {
            client,
            tags,
            per_page,
        }
    }

    async fn fetch_tag(&self, tag: &str) -> Result<Vec<Post>, FetchError> {
        let url = format!("{ARTICLES_URL}?tag={tag}&per_page={}", self.per_page);
        let body = self.client.get(&url).await?;

        let articles: Vec<DevtoArticle> =
            serde_json::from_slice(&body).map_err(|e| FetchError::Exhausted {
                attempts: 0,
                last: format!("undecodable article list for tag {tag}: {e}"),
            })?;

        Ok(articles
            .into_iter()
            .filter_map(|article| post_from_article(article, tag))
            .collect())
    }
}

#[async_trait]
impl SourceAdapter for DevtoAdapter {
    async fn fetch(&self) -> Result<Vec<Post>, FetchError> {
        info!("fetching dev.to posts");

        let mut posts = Vec::new();
        for tag in &self.tags {
            debug!("crawling tag {tag}");
            match self.fetch_tag(tag).await {
                Ok(tag_posts) => posts.extend(tag_posts),
                Err(e) => warn!("tag {tag} failed: {e}"),
            }

            tokio::time::sleep(Duration::from_millis(SUB_SOURCE_DELAY_MS)).await;
        }

        info!("fetched {} posts from dev.to", posts.len());
        Ok(posts)
    }

    fn name(&self) -> &'static str {
        "devto"
    }
}

fn post_from_article(article: DevtoArticle, tag: &str) -> Option<Post> {
    if article.title.is_empty() {
        return None;
    }

    let created_at = article
        .published_at
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Some(Post {
        id: article.id.to_string(),
        author: article.user.name,
        content: article.title,
        topic: map_tag(tag),
        sentiment: Sentiment::Neutral,
        likes: 0,
        comments: 0,
        shares: 0,
        platform: "devto".to_string(),
        url: (!article.url.is_empty()).then_some(article.url),
        source: Some("devto".to_string()),
        created_at,
    })
}

fn map_tag(tag: &str) -> Topic {
    match tag.to_lowercase().as_str() {
        "ai" | "machine-learning" | "ml" | "llm" => Topic::Ai,
        "cloud" | "aws" | "gcp" | "azure" => Topic::Cloud,
        "devops" | "kubernetes" | "docker" => Topic::Devops,
        "startups" | "entrepreneurship" => Topic::Startup,
        _ => Topic::Programming,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_tags_to_topics() {
        assert_eq!(map_tag("machine-learning"), Topic::Ai);
        assert_eq!(map_tag("Cloud"), Topic::Cloud);
        assert_eq!(map_tag("kubernetes"), Topic::Devops);
        assert_eq!(map_tag("startups"), Topic::Startup);
        assert_eq!(map_tag("rust"), Topic::Programming);
    }

    #[test]
    fn parses_article_list() {
        let raw = r#"[{
            "id": 101,
            "title": "Terraform in anger",
            "url": "https://dev.to/a/terraform-in-anger",
            "user": {"name": "Sam"},
            "published_at": "2024-03-10T08:30:00Z",
            "tag_list": ["devops"]
        }]"#;
        let articles: Vec<DevtoArticle> = serde_json::from_str(raw).unwrap();
        let post = post_from_article(articles.into_iter().next().unwrap(), "devops").unwrap();
        assert_eq!(post.id, "101");
        assert_eq!(post.author, "Sam");
        assert_eq!(post.topic, Topic::Devops);
        assert_eq!(post.platform, "devto");
        assert_eq!(post.created_at.to_rfc3339(), "2024-03-10T08:30:00+00:00");
    }

    #[test]
    fn missing_published_at_falls_back_to_now() {
        let article = DevtoArticle {
            id: 5,
            title: "untitled times".to_string(),
            url: String::new(),
            user: DevtoUser::default(),
            published_at: None,
        };
        let before = Utc::now();
        let post = post_from_article(article, "ai").unwrap();
        assert!(post.created_at >= before);
        assert_eq!(post.url, None);
    }

    #[test]
    fn skips_articles_without_title() {
        let article = DevtoArticle {
            id: 6,
            title: String::new(),
            url: String::new(),
            user: DevtoUser::default(),
            published_at: None,
        };
        assert!(post_from_article(article, "ai").is_none());
    }
}
