use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use health::HealthHandle;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::breaker::CircuitBreaker;
use crate::metrics_consts::{BREAKER_OPEN, CRAWL_DURATION, CRAWL_FAILURES, CRAWL_RUNS};
use crate::publish::PostPipeline;
use crate::sources::SourceAdapter;

/// Everything one source needs for a crawl run: its adapter, the gate it
/// publishes through, the breaker guarding its upstream, and its schedule.
pub struct SourceRunner {
    pub adapter: Arc<dyn SourceAdapter>,
    pub pipeline: PostPipeline,
    pub breaker: Arc<CircuitBreaker>,
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct CrawlResult {
    pub source: String,
    pub post_count: usize,
    pub sent: usize,
    pub skipped: usize,
    pub error: Option<String>,
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorMetrics {
    pub total_runs: u64,
    pub failures: HashMap<String, u64>,
    pub last_run: Option<DateTime<Utc>>,
}

/// Registry of source runners plus run/failure accounting. Each source is
/// driven by its own interval loop, so one slow upstream never stalls the
/// others; a run that overruns its interval simply delays its own next tick
/// (single-flight per source).
#[derive(Default)]
pub struct Orchestrator {
    runners: RwLock<HashMap<String, Arc<SourceRunner>>>,
    failures: RwLock<HashMap<String, u64>>,
    runs: AtomicU64,
    last_run: RwLock<Option<DateTime<Utc>>>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, runner: SourceRunner) {
        let name = name.into();
        self.runners
            .write()
            .expect("orchestrator lock poisoned")
            .insert(name.clone(), Arc::new(runner));
        self.failures
            .write()
            .expect("orchestrator lock poisoned")
            .entry(name)
            .or_insert(0);
    }

    pub fn sources(&self) -> Vec<String> {
        self.runners
            .read()
            .expect("orchestrator lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    fn runner(&self, name: &str) -> Option<Arc<SourceRunner>> {
        self.runners
            .read()
            .expect("orchestrator lock poisoned")
            .get(name)
            .cloned()
    }

    /// One crawl run for one source: breaker gate → fetch → pipeline.
    /// Returns None for an unknown source.
    pub async fn run_source(&self, name: &str) -> Option<CrawlResult> {
        let runner = self.runner(name)?;
        let started = Instant::now();

        let mut result = CrawlResult {
            source: name.to_string(),
            post_count: 0,
            sent: 0,
            skipped: 0,
            error: None,
            duration: Duration::ZERO,
            timestamp: Utc::now(),
        };

        if !runner.breaker.can_execute() {
            metrics::counter!(BREAKER_OPEN, &[("source".to_string(), name.to_string())])
                .increment(1);
            result.error = Some("circuit breaker is open".to_string());
        } else {
            match runner.adapter.fetch().await {
                Ok(posts) => {
                    runner.breaker.record_success();
                    result.post_count = posts.len();
                    let outcome = runner.pipeline.process_batch(posts).await;
                    result.sent = outcome.sent;
                    result.skipped = outcome.skipped;
                }
                Err(e) => {
                    runner.breaker.record_failure();
                    result.error = Some(e.to_string());
                }
            }
        }

        result.duration = started.elapsed();
        self.record(&result);
        Some(result)
    }

    /// Run every registered source concurrently and gather the results.
    pub async fn run_parallel(&self) -> HashMap<String, CrawlResult> {
        let names = self.sources();
        let runs = names.into_iter().map(|name| async move {
            let result = self.run_source(&name).await;
            (name, result)
        });

        let mut results = HashMap::new();
        for (name, result) in futures::future::join_all(runs).await {
            if let Some(result) = result {
                results.insert(name, result);
            }
        }
        results
    }

    /// Periodic driver for one source, cancelled via the token. The tick
    /// awaits the previous run, so a source never overlaps with itself.
    pub async fn run_scheduler_loop(
        self: Arc<Self>,
        name: String,
        liveness: HealthHandle,
        shutdown: CancellationToken,
    ) {
        let Some(runner) = self.runner(&name) else {
            error!("no runner registered for source {name}");
            return;
        };

        let mut ticker = tokio::time::interval(runner.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("scheduler for {name} shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    liveness.report_healthy().await;
                    self.run_source(&name).await;
                }
            }
        }
    }

    pub fn metrics(&self) -> OrchestratorMetrics {
        OrchestratorMetrics {
            total_runs: self.runs.load(Ordering::Relaxed),
            failures: self
                .failures
                .read()
                .expect("orchestrator lock poisoned")
                .clone(),
            last_run: *self.last_run.read().expect("orchestrator lock poisoned"),
        }
    }

    fn record(&self, result: &CrawlResult) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        *self.last_run.write().expect("orchestrator lock poisoned") = Some(result.timestamp);

        let labels = [("source".to_string(), result.source.clone())];
        common_metrics::inc(CRAWL_RUNS, &labels, 1);
        common_metrics::histogram(CRAWL_DURATION, &labels, result.duration.as_millis() as f64);

        match &result.error {
            Some(error) => {
                let mut failures = self.failures.write().expect("orchestrator lock poisoned");
                *failures.entry(result.source.clone()).or_insert(0) += 1;
                common_metrics::inc(CRAWL_FAILURES, &labels, 1);
                error!(
                    "[{}] crawl failed: {error} (took {:?})",
                    result.source, result.duration
                );
            }
            None => {
                info!(
                    "[{}] fetched {} posts, {} sent, {} skipped (took {:?})",
                    result.source, result.post_count, result.sent, result.skipped, result.duration
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerConfig;
    use crate::fetch::FetchError;
    use crate::publish::PostSink;
    use async_trait::async_trait;
    use common_cache::FeedCache;
    use common_kafka::ProduceError;
    use common_redis::MockRedisClient;
    use common_types::{Post, Sentiment, Topic};
    use std::sync::Mutex;

    struct StaticAdapter {
        name: &'static str,
        posts: Mutex<Option<Vec<Post>>>,
        fail: bool,
    }

    #[async_trait]
    impl SourceAdapter for StaticAdapter {
        async fn fetch(&self) -> Result<Vec<Post>, FetchError> {
            if self.fail {
                return Err(FetchError::Exhausted {
                    attempts: 3,
                    last: "connection refused".to_string(),
                });
            }
            Ok(self.posts.lock().unwrap().take().unwrap_or_default())
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    #[derive(Default)]
    struct NullSink;

    #[async_trait]
    impl PostSink for NullSink {
        async fn send_post(&self, _post: &Post) -> Result<(), ProduceError> {
            Ok(())
        }
    }

    fn sample_post(id: &str) -> Post {
        Post {
            id: id.to_string(),
            author: "a".to_string(),
            content: format!("content {id}"),
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

    fn runner(
        name: &'static str,
        posts: Vec<Post>,
        fail: bool,
        breaker_config: BreakerConfig,
    ) -> SourceRunner {
        let cache = FeedCache::new(Arc::new(MockRedisClient::new()));
        SourceRunner {
            adapter: Arc::new(StaticAdapter {
                name,
                posts: Mutex::new(Some(posts)),
                fail,
            }),
            pipeline: PostPipeline::new(Arc::new(NullSink), cache, name),
            breaker: Arc::new(CircuitBreaker::new(name, breaker_config)),
            interval: Duration::from_secs(300),
        }
    }

    #[tokio::test]
    async fn run_parallel_collects_results_per_source() {
        let orchestrator = Arc::new(Orchestrator::new());
        orchestrator.register(
            "hn",
            runner(
                "hn",
                vec![sample_post("1"), sample_post("2")],
                false,
                BreakerConfig::default(),
            ),
        );
        orchestrator.register(
            "medium",
            runner("medium", vec![], true, BreakerConfig::default()),
        );

        let results = orchestrator.run_parallel().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results["hn"].post_count, 2);
        assert_eq!(results["hn"].sent, 2);
        assert!(results["hn"].error.is_none());
        assert!(results["medium"].error.is_some());

        let metrics = orchestrator.metrics();
        assert_eq!(metrics.total_runs, 2);
        assert_eq!(metrics.failures["medium"], 1);
        assert_eq!(metrics.failures["hn"], 0);
        assert!(metrics.last_run.is_some());
    }

    #[tokio::test]
    async fn repeated_failures_trip_the_breaker() {
        let orchestrator = Arc::new(Orchestrator::new());
        orchestrator.register(
            "hn",
            runner(
                "hn",
                vec![],
                true,
                BreakerConfig {
                    max_failures: 2,
                    reset_timeout: Duration::from_secs(300),
                    success_threshold: 2,
                },
            ),
        );

        orchestrator.run_source("hn").await.unwrap();
        orchestrator.run_source("hn").await.unwrap();

        // Breaker open: the next run is refused without touching upstream
        let refused = orchestrator.run_source("hn").await.unwrap();
        assert_eq!(
            refused.error.as_deref(),
            Some("circuit breaker is open")
        );
        assert_eq!(orchestrator.metrics().failures["hn"], 3);
    }

    #[tokio::test]
    async fn unknown_source_returns_none() {
        let orchestrator = Orchestrator::new();
        assert!(orchestrator.run_source("nope").await.is_none());
    }
}
