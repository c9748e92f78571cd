use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;

/// Pool sizing for the batch sink: the store sees bursts of multi-row
/// upserts, so keep a warm floor of idle connections and recycle them
/// regularly.
pub const DEFAULT_POOL: PoolSettings = PoolSettings {
    max_connections: 50,
    min_connections: 10,
    max_lifetime: Duration::from_secs(5 * 60),
    acquire_timeout: Duration::from_secs(5),
};

#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime: Duration,
    pub acquire_timeout: Duration,
}

#[derive(Error, Debug)]
pub enum CustomDatabaseError {
    #[error("Pg error: {0}")]
    Other(#[from] sqlx::Error),

    #[error("Client timeout error")]
    Timeout(#[from] tokio::time::error::Elapsed),
}

pub async fn get_pool(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let settings = PoolSettings {
        max_connections,
        ..DEFAULT_POOL
    };
    get_pool_with_settings(url, settings).await
}

pub async fn get_pool_with_settings(
    url: &str,
    settings: PoolSettings,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .max_lifetime(settings.max_lifetime)
        .acquire_timeout(settings.acquire_timeout)
        .test_before_acquire(true)
        .connect(url)
        .await
}
