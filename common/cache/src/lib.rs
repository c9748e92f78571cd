use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common_redis::{Client, CustomRedisError};
use common_types::{Post, Sentiment, Topic};
use tracing::warn;

/// Sorted set of the newest posts, score = created_at unix seconds.
pub const RECENT_POSTS_KEY: &str = "recent_posts";
/// The recent set never holds more than this many members.
pub const RECENT_POSTS_LIMIT: i64 = 1000;

pub const POST_CACHE_TTL_SECS: u64 = 60 * 60;
pub const SOURCE_SEEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;
pub const CONTENT_HASH_SEEN_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Dedup namespace for cross-source content hashes; per-source ids use the
/// source name as their namespace.
pub const CONTENT_HASH_NAMESPACE: &str = "content_hash";

pub const TOTAL_COUNTER_KEY: &str = "posts:total";

pub fn post_key(id: &str) -> String {
    format!("post:{id}")
}

pub fn topic_counter_key(topic: Topic) -> String {
    format!("posts:{topic}")
}

pub fn sentiment_counter_key(sentiment: Sentiment) -> String {
    format!("sentiment:{sentiment}")
}

pub fn seen_key(namespace: &str, key: &str) -> String {
    format!("seen:{namespace}:{key}")
}

pub fn last_crawl_key(source: &str) -> String {
    format!("last_crawl:{source}")
}

/// Every counter key the stats view reads, in a stable order.
pub fn stat_keys() -> Vec<String> {
    let mut keys = vec![TOTAL_COUNTER_KEY.to_string()];
    keys.extend(Topic::ALL.iter().map(|t| topic_counter_key(*t)));
    keys.extend(Sentiment::ALL.iter().map(|s| sentiment_counter_key(*s)));
    keys
}

/// Typed view of the pipeline's cache keyspace. Everything here is
/// best-effort: the store is authoritative and callers treat failures as
/// log-and-continue.
#[derive(Clone)]
pub struct FeedCache {
    client: Arc<dyn Client + Send + Sync>,
}

impl FeedCache {
    pub fn new(client: Arc<dyn Client + Send + Sync>) -> Self {
        Self { client }
    }

    pub async fn cache_post(&self, post: &Post) -> Result<(), CustomRedisError> {
        let payload = serde_json::to_string(post)
            .map_err(|e| CustomRedisError::ParseError(e.to_string()))?;
        self.client
            .setex(post_key(&post.id), payload, POST_CACHE_TTL_SECS)
            .await
    }

    pub async fn get_post(&self, id: &str) -> Result<Option<Post>, CustomRedisError> {
        match self.client.get(post_key(id)).await {
            Ok(payload) => serde_json::from_str(&payload)
                .map(Some)
                .map_err(|e| CustomRedisError::ParseError(e.to_string())),
            Err(CustomRedisError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn increment_counter(&self, key: String) -> Result<i64, CustomRedisError> {
        self.client.incr(key).await
    }

    pub async fn counter(&self, key: String) -> Result<i64, CustomRedisError> {
        match self.client.get(key).await {
            Ok(v) => v
                .parse()
                .map_err(|_| CustomRedisError::ParseError(format!("bad counter value: {v}"))),
            Err(CustomRedisError::NotFound) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// ZADD + trim: only ever the `RECENT_POSTS_LIMIT` newest survive.
    pub async fn add_to_recent(&self, post: &Post) -> Result<(), CustomRedisError> {
        let payload = serde_json::to_string(post)
            .map_err(|e| CustomRedisError::ParseError(e.to_string()))?;
        self.client
            .zadd(
                RECENT_POSTS_KEY.to_string(),
                post.created_at.timestamp() as f64,
                payload,
            )
            .await?;
        self.client
            .zremrangebyrank(RECENT_POSTS_KEY.to_string(), 0, -(RECENT_POSTS_LIMIT + 1))
            .await
    }

    /// Newest `count` posts, newest first. Members that fail to decode are
    /// skipped rather than failing the read.
    pub async fn recent_posts(&self, count: i64) -> Result<Vec<Post>, CustomRedisError> {
        let members = self
            .client
            .zrevrange(RECENT_POSTS_KEY.to_string(), 0, count - 1)
            .await?;
        let mut posts = Vec::with_capacity(members.len());
        for member in members {
            match serde_json::from_str(&member) {
                Ok(post) => posts.push(post),
                Err(e) => warn!("skipping undecodable recent post: {e}"),
            }
        }
        Ok(posts)
    }

    pub async fn check_if_seen(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<bool, CustomRedisError> {
        self.client.exists(seen_key(namespace, key)).await
    }

    pub async fn mark_seen(
        &self,
        namespace: &str,
        key: &str,
        ttl_secs: u64,
    ) -> Result<(), CustomRedisError> {
        self.client
            .setex(seen_key(namespace, key), "1".to_string(), ttl_secs)
            .await
    }

    pub async fn set_last_crawl(
        &self,
        source: &str,
        at: DateTime<Utc>,
    ) -> Result<(), CustomRedisError> {
        self.client.set(last_crawl_key(source), at.to_rfc3339()).await
    }

    pub async fn last_crawl(&self, source: &str) -> Result<Option<DateTime<Utc>>, CustomRedisError> {
        match self.client.get(last_crawl_key(source)).await {
            Ok(v) => DateTime::parse_from_rfc3339(&v)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(|e| CustomRedisError::ParseError(e.to_string())),
            Err(CustomRedisError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// One MGET over every counter; missing counters read as 0.
    pub async fn stats(&self) -> Result<HashMap<String, i64>, CustomRedisError> {
        let keys = stat_keys();
        let values = self.client.mget(keys.clone()).await?;
        let mut stats = HashMap::with_capacity(keys.len());
        for (key, value) in keys.into_iter().zip(values) {
            let count = value.and_then(|v| v.parse().ok()).unwrap_or(0);
            stats.insert(key, count);
        }
        Ok(stats)
    }
}
