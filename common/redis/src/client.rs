use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::time::timeout;

use crate::{get_redis_timeout_ms, Client, CustomRedisError};

#[derive(Clone)]
pub struct RedisClient {
    connection: MultiplexedConnection,
}

impl RedisClient {
    /// Connect with a multiplexed async connection. Per-command timeouts are
    /// applied at call time and can be overridden with `REDIS_TIMEOUT_MS`.
    pub async fn new(addr: String) -> Result<RedisClient, CustomRedisError> {
        let client = redis::Client::open(addr)?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(RedisClient { connection })
    }

    fn op_timeout(&self) -> Duration {
        Duration::from_millis(get_redis_timeout_ms())
    }
}

#[async_trait]
impl Client for RedisClient {
    async fn get(&self, k: String) -> Result<String, CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.get::<_, Option<String>>(k);
        let fut = timeout(self.op_timeout(), results).await?;
        fut?.ok_or(CustomRedisError::NotFound)
    }

    async fn set(&self, k: String, v: String) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.set::<_, _, ()>(k, v);
        let fut = timeout(self.op_timeout(), results).await?;
        Ok(fut?)
    }

    async fn setex(&self, k: String, v: String, seconds: u64) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.set_ex::<_, _, ()>(k, v, seconds);
        let fut = timeout(self.op_timeout(), results).await?;
        Ok(fut?)
    }

    async fn exists(&self, k: String) -> Result<bool, CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.exists::<_, bool>(k);
        let fut = timeout(self.op_timeout(), results).await?;
        Ok(fut?)
    }

    async fn incr(&self, k: String) -> Result<i64, CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.incr::<_, _, i64>(k, 1);
        let fut = timeout(self.op_timeout(), results).await?;
        Ok(fut?)
    }

    async fn del(&self, k: String) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.del::<_, ()>(k);
        let fut = timeout(self.op_timeout(), results).await?;
        Ok(fut?)
    }

    async fn zadd(&self, k: String, score: f64, member: String) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.zadd::<_, _, _, ()>(k, member, score);
        let fut = timeout(self.op_timeout(), results).await?;
        Ok(fut?)
    }

    async fn zremrangebyrank(
        &self,
        k: String,
        start: i64,
        stop: i64,
    ) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.zremrangebyrank::<_, ()>(k, start as isize, stop as isize);
        let fut = timeout(self.op_timeout(), results).await?;
        Ok(fut?)
    }

    async fn zrevrange(
        &self,
        k: String,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.zrevrange::<_, Vec<String>>(k, start as isize, stop as isize);
        let fut = timeout(self.op_timeout(), results).await?;
        Ok(fut?)
    }

    async fn mget(&self, ks: Vec<String>) -> Result<Vec<Option<String>>, CustomRedisError> {
        if ks.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection.clone();
        // redis flattens a single-key MGET response; keep the shape stable
        let results = conn.mget::<_, Vec<Option<String>>>(&ks);
        let fut = timeout(self.op_timeout(), results).await?;
        Ok(fut?)
    }
}
