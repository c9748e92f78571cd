use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common_cache::{
    FeedCache, CONTENT_HASH_NAMESPACE, CONTENT_HASH_SEEN_TTL_SECS, SOURCE_SEEN_TTL_SECS,
};
use common_kafka::{PostProducer, ProduceError};
use common_types::Post;
use tracing::{debug, error, info, warn};

use crate::metrics_consts::{POSTS_REJECTED, POSTS_SENT, POSTS_SKIPPED};
use crate::validation::validate_post;

/// Where validated, deduplicated posts go. The real sink is the Kafka
/// producer; tests swap in an in-memory one.
#[async_trait]
pub trait PostSink: Send + Sync {
    async fn send_post(&self, post: &Post) -> Result<(), ProduceError>;
}

#[async_trait]
impl PostSink for PostProducer {
    async fn send_post(&self, post: &Post) -> Result<(), ProduceError> {
        PostProducer::send_post(self, post)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    pub sent: usize,
    pub skipped: usize,
}

/// The dedup + publish gate between an adapter's raw batch and the bus.
///
/// Two dedup levels, checked in order: the cross-source content hash (the
/// same article shows up under different ids on different platforms), then
/// the per-source id as a cheap second guard against re-fetching the same
/// upstream list. Publishing wins over bookkeeping: marker writes that fail
/// only log, because re-sending later is preferable to blocking the batch.
pub struct PostPipeline {
    sink: Arc<dyn PostSink>,
    cache: FeedCache,
    source: String,
}

impl PostPipeline {
    pub fn new(sink: Arc<dyn PostSink>, cache: FeedCache, source: impl Into<String>) -> Self {
        Self {
            sink,
            cache,
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Run a fetched batch through validate → dedup → publish → mark.
    /// The last-crawl stamp is written whether or not anything was sent.
    pub async fn process_batch(&self, posts: Vec<Post>) -> BatchOutcome {
        self.stamp_last_crawl().await;

        if posts.is_empty() {
            return BatchOutcome::default();
        }

        let mut outcome = BatchOutcome::default();
        for mut post in posts {
            if let Err(reasons) = validate_post(&mut post) {
                let reasons: Vec<String> = reasons.iter().map(|r| r.to_string()).collect();
                debug!("validation failed for {}: {}", post.id, reasons.join(", "));
                metrics::counter!(POSTS_REJECTED).increment(1);
                outcome.skipped += 1;
                continue;
            }

            let hash = post.content_hash();
            match self.cache.check_if_seen(CONTENT_HASH_NAMESPACE, &hash).await {
                Ok(true) => {
                    debug!("skipping duplicate by content hash [{hash}]");
                    outcome.skipped += 1;
                    continue;
                }
                Ok(false) => {}
                // Hash check unavailable: fall through to the id check
                Err(e) => error!("hash check error for {hash}: {e}"),
            }

            match self.cache.check_if_seen(&self.source, &post.id).await {
                Ok(true) => {
                    outcome.skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    error!("dedup check error for {}: {e}", post.id);
                    outcome.skipped += 1;
                    continue;
                }
            }

            if let Err(e) = self.sink.send_post(&post).await {
                // Not marked as seen, so the post stays eligible for a retry
                // on a later crawl
                error!("publish error for {}: {e}", post.id);
                outcome.skipped += 1;
                continue;
            }

            if let Err(e) = self
                .cache
                .mark_seen(&self.source, &post.id, SOURCE_SEEN_TTL_SECS)
                .await
            {
                warn!("mark error for {}: {e}", post.id);
            }
            if let Err(e) = self
                .cache
                .mark_seen(CONTENT_HASH_NAMESPACE, &hash, CONTENT_HASH_SEEN_TTL_SECS)
                .await
            {
                warn!("mark error for content hash {hash}: {e}");
            }

            outcome.sent += 1;
            debug!("[{}] sent post {} (hash={hash})", self.source, post.id);
        }

        self.stamp_last_crawl().await;

        let labels = [("source".to_string(), self.source.clone())];
        common_metrics::inc(POSTS_SENT, &labels, outcome.sent as u64);
        common_metrics::inc(POSTS_SKIPPED, &labels, outcome.skipped as u64);
        info!(
            "[{}] batch done: {} sent, {} skipped",
            self.source, outcome.sent, outcome.skipped
        );

        outcome
    }

    async fn stamp_last_crawl(&self) {
        if let Err(e) = self.cache.set_last_crawl(&self.source, Utc::now()).await {
            warn!("failed to stamp last_crawl for {}: {e}", self.source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common_redis::MockRedisClient;
    use common_types::{Sentiment, Topic};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySink {
        posts: Mutex<Vec<Post>>,
        fail: AtomicBool,
    }

    impl MemorySink {
        fn sent_ids(&self) -> Vec<String> {
            self.posts.lock().unwrap().iter().map(|p| p.id.clone()).collect()
        }
    }

    #[async_trait]
    impl PostSink for MemorySink {
        async fn send_post(&self, post: &Post) -> Result<(), ProduceError> {
            if self.fail.load(Ordering::SeqCst) {
                use serde::de::Error as _;
                return Err(ProduceError::Serialization(serde_json::Error::custom(
                    "sink unavailable",
                )));
            }
            self.posts.lock().unwrap().push(post.clone());
            Ok(())
        }
    }

    fn post(id: &str, author: &str, content: &str) -> Post {
        Post {
            id: id.to_string(),
            author: author.to_string(),
            content: content.to_string(),
            topic: Topic::Programming,
            sentiment: Sentiment::Neutral,
            likes: 0,
            comments: 0,
            shares: 0,
            platform: "hackernews".to_string(),
            url: None,
            source: None,
            created_at: Utc::now(),
        }
    }

    fn pipeline(source: &str) -> (PostPipeline, Arc<MemorySink>, MockRedisClient) {
        let mock = MockRedisClient::new();
        let sink = Arc::new(MemorySink::default());
        let cache = FeedCache::new(Arc::new(mock.clone()));
        (
            PostPipeline::new(sink.clone(), cache, source),
            sink,
            mock,
        )
    }

    #[tokio::test]
    async fn same_batch_twice_publishes_once() {
        let (pipeline, sink, _mock) = pipeline("hn");
        let batch = vec![post("1", "a", "one"), post("2", "b", "two")];

        let first = pipeline.process_batch(batch.clone()).await;
        assert_eq!(first, BatchOutcome { sent: 2, skipped: 0 });

        let second = pipeline.process_batch(batch).await;
        assert_eq!(second, BatchOutcome { sent: 0, skipped: 2 });
        assert_eq!(sink.sent_ids(), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn content_hash_dedups_across_sources() {
        let mock = MockRedisClient::new();
        let cache = FeedCache::new(Arc::new(mock.clone()));
        let sink_a = Arc::new(MemorySink::default());
        let sink_b = Arc::new(MemorySink::default());
        let a = PostPipeline::new(sink_a.clone(), cache.clone(), "hn");
        let b = PostPipeline::new(sink_b.clone(), cache, "medium");

        let first = a.process_batch(vec![post("a1", "X", "Hello")]).await;
        assert_eq!(first, BatchOutcome { sent: 1, skipped: 0 });

        // Different id, different source, same content+author: skipped
        let second = b.process_batch(vec![post("b9", "X", "Hello")]).await;
        assert_eq!(second, BatchOutcome { sent: 0, skipped: 1 });
        assert!(sink_b.sent_ids().is_empty());
    }

    #[tokio::test]
    async fn empty_batch_still_stamps_last_crawl() {
        let (pipeline, _sink, _mock) = pipeline("hn");
        let outcome = pipeline.process_batch(Vec::new()).await;
        assert_eq!(outcome, BatchOutcome::default());

        let cache = FeedCache::new(Arc::new(_mock.clone()));
        assert!(cache.last_crawl("hn").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn validation_reject_counts_as_skipped() {
        let (pipeline, sink, _mock) = pipeline("hn");
        let outcome = pipeline
            .process_batch(vec![post("1", "a", "   "), post("2", "b", "fine")])
            .await;
        assert_eq!(outcome, BatchOutcome { sent: 1, skipped: 1 });
        assert_eq!(sink.sent_ids(), vec!["2"]);
    }

    #[tokio::test]
    async fn publish_failure_leaves_post_unmarked() {
        let (pipeline, sink, mock) = pipeline("hn");
        sink.fail.store(true, Ordering::SeqCst);

        let outcome = pipeline.process_batch(vec![post("1", "a", "one")]).await;
        assert_eq!(outcome, BatchOutcome { sent: 0, skipped: 1 });
        assert!(mock.value("seen:hn:1").is_none());

        // Next crawl may retry the same post successfully
        sink.fail.store(false, Ordering::SeqCst);
        let retry = pipeline.process_batch(vec![post("1", "a", "one")]).await;
        assert_eq!(retry, BatchOutcome { sent: 1, skipped: 0 });
    }
}
