pub const POSTS_SENT: &str = "crawler_posts_sent";
pub const POSTS_SKIPPED: &str = "crawler_posts_skipped";
pub const POSTS_REJECTED: &str = "crawler_posts_rejected";
pub const CRAWL_RUNS: &str = "crawler_runs_total";
pub const CRAWL_FAILURES: &str = "crawler_failures_total";
pub const CRAWL_DURATION: &str = "crawler_run_duration_ms";
pub const FETCH_RETRIES: &str = "crawler_fetch_retries";
pub const BREAKER_OPEN: &str = "crawler_breaker_open";
pub const BREAKER_TRANSITIONS: &str = "crawler_breaker_transitions";
