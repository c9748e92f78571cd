use async_trait::async_trait;
use redis::RedisError;
use thiserror::Error;

mod client;
pub mod mock;

pub use client::RedisClient;
pub use mock::MockRedisClient;

const DEFAULT_REDIS_TIMEOUT_MILLISECS: u64 = 1000;

pub(crate) fn get_redis_timeout_ms() -> u64 {
    std::env::var("REDIS_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_REDIS_TIMEOUT_MILLISECS)
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CustomRedisError {
    #[error("Not found in redis")]
    NotFound,
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Redis error: {0}")]
    Other(String),
    #[error("Timeout error")]
    Timeout,
}

impl From<RedisError> for CustomRedisError {
    fn from(err: RedisError) -> Self {
        CustomRedisError::Other(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for CustomRedisError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        CustomRedisError::Timeout
    }
}

/// The cache operations the pipeline relies on. Concrete impls: the real
/// multiplexed client and an in-memory mock for tests. Every value is a
/// UTF-8 string; callers own (de)serialisation.
#[async_trait]
pub trait Client {
    /// Returns `CustomRedisError::NotFound` for a missing key.
    async fn get(&self, k: String) -> Result<String, CustomRedisError>;
    async fn set(&self, k: String, v: String) -> Result<(), CustomRedisError>;
    async fn setex(&self, k: String, v: String, seconds: u64) -> Result<(), CustomRedisError>;
    async fn exists(&self, k: String) -> Result<bool, CustomRedisError>;
    async fn incr(&self, k: String) -> Result<i64, CustomRedisError>;
    async fn del(&self, k: String) -> Result<(), CustomRedisError>;
    async fn zadd(&self, k: String, score: f64, member: String) -> Result<(), CustomRedisError>;
    async fn zremrangebyrank(
        &self,
        k: String,
        start: i64,
        stop: i64,
    ) -> Result<(), CustomRedisError>;
    /// Members ordered by score descending, `start..=stop` rank slice.
    async fn zrevrange(
        &self,
        k: String,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, CustomRedisError>;
    async fn mget(&self, ks: Vec<String>) -> Result<Vec<Option<String>>, CustomRedisError>;
}
