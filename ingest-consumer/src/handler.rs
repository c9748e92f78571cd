use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use common_cache::{sentiment_counter_key, topic_counter_key, FeedCache, TOTAL_COUNTER_KEY};
use common_types::Post;
use tracing::{error, info, warn};

use crate::metrics_consts::{
    BATCH_FLUSH_TIME, BATCH_POSTS_DROPPED, BUFFER_DEPTH, CACHE_WRITE_ERROR, POSTS_PROCESSED,
};
use crate::sink::StoreError;

/// Destination of a flushed batch. The real implementation is the Postgres
/// store; tests use an in-memory sink.
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Returns the number of rows actually written (conflicts excluded).
    async fn insert_posts(&self, posts: &[Post]) -> Result<u64, StoreError>;
}

/// Per-message fanout: cache entry, counters, recent set, then the batch
/// buffer. The buffer is drained either here (size trigger) or by the flush
/// ticker; both paths take the whole buffer under one lock and release it
/// before touching the store.
pub struct PostHandler<S> {
    cache: FeedCache,
    sink: S,
    batch_size: usize,
    buffer: Mutex<Vec<Post>>,
    processed: AtomicU64,
}

impl<S: BatchSink> PostHandler<S> {
    pub fn new(cache: FeedCache, sink: S, batch_size: usize) -> Self {
        Self {
            cache,
            sink,
            batch_size,
            buffer: Mutex::new(Vec::with_capacity(batch_size)),
            processed: AtomicU64::new(0),
        }
    }

    /// Handle one consumed post. Cache-side failures are logged and
    /// swallowed: the store is the authoritative copy and gets the post via
    /// the buffer regardless.
    pub async fn handle_post(&self, post: Post) {
        if let Err(e) = self.cache.cache_post(&post).await {
            metrics::counter!(CACHE_WRITE_ERROR).increment(1);
            warn!("cache write error for {}: {e}", post.id);
        }

        for key in [
            TOTAL_COUNTER_KEY.to_string(),
            topic_counter_key(post.topic),
            sentiment_counter_key(post.sentiment),
        ] {
            if let Err(e) = self.cache.increment_counter(key.clone()).await {
                metrics::counter!(CACHE_WRITE_ERROR).increment(1);
                warn!("counter increment error for {key}: {e}");
            }
        }

        if let Err(e) = self.cache.add_to_recent(&post).await {
            metrics::counter!(CACHE_WRITE_ERROR).increment(1);
            warn!("recent set error for {}: {e}", post.id);
        }

        let should_flush = {
            let mut buffer = self.buffer.lock().expect("buffer lock poisoned");
            buffer.push(post);
            metrics::gauge!(BUFFER_DEPTH).set(buffer.len() as f64);
            buffer.len() >= self.batch_size
        };

        if should_flush {
            self.flush().await;
        }

        self.processed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(POSTS_PROCESSED).increment(1);
    }

    /// Drain the buffer into the store. A batch that exhausts the sink's
    /// retries is dropped — the dedup keys were already written upstream, so
    /// at-least-once still holds overall.
    pub async fn flush(&self) {
        let batch = {
            let mut buffer = self.buffer.lock().expect("buffer lock poisoned");
            if buffer.is_empty() {
                return;
            }
            metrics::gauge!(BUFFER_DEPTH).set(0.0);
            std::mem::take(&mut *buffer)
        };

        let flush_time = common_metrics::timing_guard(BATCH_FLUSH_TIME, &[]);
        match self.sink.insert_posts(&batch).await {
            Ok(rows) => {
                info!("saved {} posts to the store ({rows} new rows)", batch.len());
            }
            Err(e) => {
                metrics::counter!(BATCH_POSTS_DROPPED).increment(batch.len() as u64);
                error!("batch insert failed, dropping {} posts: {e}", batch.len());
            }
        }
        flush_time.fin();
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn buffered(&self) -> usize {
        self.buffer.lock().expect("buffer lock poisoned").len()
    }
}
