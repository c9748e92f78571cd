use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::{Client, CustomRedisError};

/// In-memory stand-in for the real client. Unlike a canned-response mock,
/// this one keeps actual key and sorted-set state so tests can replay a
/// batch and observe dedup/counter behaviour. Every call is recorded for
/// assertion; TTLs are recorded but never expire.
#[derive(Clone, Default)]
pub struct MockRedisClient {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    kv: HashMap<String, String>,
    ttls: HashMap<String, u64>,
    zsets: HashMap<String, Vec<(f64, String)>>,
    // op name -> error to return on every call of that op
    errors: HashMap<String, CustomRedisError>,
    calls: Vec<MockRedisCall>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockRedisCall {
    pub op: String,
    pub key: String,
}

impl MockRedisClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Force every call of `op` ("get", "setex", "zadd", ...) to fail.
    pub fn error_on(&self, op: &str, err: CustomRedisError) {
        self.lock().errors.insert(op.to_string(), err);
    }

    pub fn clear_error(&self, op: &str) {
        self.lock().errors.remove(op);
    }

    /// Seed a plain key.
    pub fn preset(&self, k: &str, v: &str) {
        self.lock().kv.insert(k.to_string(), v.to_string());
    }

    pub fn value(&self, k: &str) -> Option<String> {
        self.lock().kv.get(k).cloned()
    }

    pub fn ttl(&self, k: &str) -> Option<u64> {
        self.lock().ttls.get(k).copied()
    }

    pub fn zset_len(&self, k: &str) -> usize {
        self.lock().zsets.get(k).map(|z| z.len()).unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<MockRedisCall> {
        self.lock().calls.clone()
    }

    pub fn calls_for(&self, op: &str) -> Vec<MockRedisCall> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }

    fn enter(
        state: &mut MutexGuard<'_, MockState>,
        op: &str,
        key: &str,
    ) -> Result<(), CustomRedisError> {
        state.calls.push(MockRedisCall {
            op: op.to_string(),
            key: key.to_string(),
        });
        match state.errors.get(op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Client for MockRedisClient {
    async fn get(&self, k: String) -> Result<String, CustomRedisError> {
        let mut state = self.lock();
        Self::enter(&mut state, "get", &k)?;
        state.kv.get(&k).cloned().ok_or(CustomRedisError::NotFound)
    }

    async fn set(&self, k: String, v: String) -> Result<(), CustomRedisError> {
        let mut state = self.lock();
        Self::enter(&mut state, "set", &k)?;
        state.kv.insert(k, v);
        Ok(())
    }

    async fn setex(&self, k: String, v: String, seconds: u64) -> Result<(), CustomRedisError> {
        let mut state = self.lock();
        Self::enter(&mut state, "setex", &k)?;
        state.kv.insert(k.clone(), v);
        state.ttls.insert(k, seconds);
        Ok(())
    }

    async fn exists(&self, k: String) -> Result<bool, CustomRedisError> {
        let mut state = self.lock();
        Self::enter(&mut state, "exists", &k)?;
        Ok(state.kv.contains_key(&k))
    }

    async fn incr(&self, k: String) -> Result<i64, CustomRedisError> {
        let mut state = self.lock();
        Self::enter(&mut state, "incr", &k)?;
        let current: i64 = state
            .kv
            .get(&k)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let next = current + 1;
        state.kv.insert(k, next.to_string());
        Ok(next)
    }

    async fn del(&self, k: String) -> Result<(), CustomRedisError> {
        let mut state = self.lock();
        Self::enter(&mut state, "del", &k)?;
        state.kv.remove(&k);
        state.zsets.remove(&k);
        Ok(())
    }

    async fn zadd(&self, k: String, score: f64, member: String) -> Result<(), CustomRedisError> {
        let mut state = self.lock();
        Self::enter(&mut state, "zadd", &k)?;
        let zset = state.zsets.entry(k).or_default();
        zset.retain(|(_, m)| *m != member);
        zset.push((score, member));
        zset.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(())
    }

    async fn zremrangebyrank(
        &self,
        k: String,
        start: i64,
        stop: i64,
    ) -> Result<(), CustomRedisError> {
        let mut state = self.lock();
        Self::enter(&mut state, "zremrangebyrank", &k)?;
        if let Some(zset) = state.zsets.get_mut(&k) {
            let len = zset.len() as i64;
            let resolve = |idx: i64| -> i64 {
                if idx < 0 {
                    len + idx
                } else {
                    idx
                }
            };
            let start = resolve(start).max(0);
            let stop = resolve(stop).min(len - 1);
            if start <= stop && len > 0 {
                zset.drain(start as usize..=(stop as usize));
            }
        }
        Ok(())
    }

    async fn zrevrange(
        &self,
        k: String,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, CustomRedisError> {
        let mut state = self.lock();
        Self::enter(&mut state, "zrevrange", &k)?;
        let Some(zset) = state.zsets.get(&k) else {
            return Ok(Vec::new());
        };
        let len = zset.len() as i64;
        let resolve = |idx: i64| -> i64 {
            if idx < 0 {
                len + idx
            } else {
                idx
            }
        };
        let start = resolve(start).max(0);
        let stop = resolve(stop).min(len - 1);
        if start > stop || len == 0 {
            return Ok(Vec::new());
        }
        let mut members: Vec<String> = zset.iter().rev().map(|(_, m)| m.clone()).collect();
        Ok(members
            .drain(start as usize..=(stop as usize))
            .collect())
    }

    async fn mget(&self, ks: Vec<String>) -> Result<Vec<Option<String>>, CustomRedisError> {
        let mut state = self.lock();
        Self::enter(&mut state, "mget", &ks.join(","))?;
        Ok(ks.iter().map(|k| state.kv.get(k).cloned()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn incr_counts_from_zero() {
        let client = MockRedisClient::new();
        assert_eq!(client.incr("c".to_string()).await.unwrap(), 1);
        assert_eq!(client.incr("c".to_string()).await.unwrap(), 2);
        assert_eq!(client.get("c".to_string()).await.unwrap(), "2");
    }

    #[tokio::test]
    async fn setex_records_ttl_and_exists() {
        let client = MockRedisClient::new();
        assert!(!client.exists("k".to_string()).await.unwrap());
        client
            .setex("k".to_string(), "v".to_string(), 60)
            .await
            .unwrap();
        assert!(client.exists("k".to_string()).await.unwrap());
        assert_eq!(client.ttl("k"), Some(60));
    }

    #[tokio::test]
    async fn zset_trim_keeps_highest_ranks() {
        let client = MockRedisClient::new();
        for i in 0..5 {
            client
                .zadd("z".to_string(), i as f64, format!("m{i}"))
                .await
                .unwrap();
        }
        // Drop everything below the top 3
        client
            .zremrangebyrank("z".to_string(), 0, -4)
            .await
            .unwrap();
        let members = client.zrevrange("z".to_string(), 0, -1).await.unwrap();
        assert_eq!(members, vec!["m4", "m3", "m2"]);
    }

    #[tokio::test]
    async fn injected_errors_surface() {
        let client = MockRedisClient::new();
        client.error_on("setex", CustomRedisError::Timeout);
        let err = client
            .setex("k".to_string(), "v".to_string(), 1)
            .await
            .unwrap_err();
        assert_eq!(err, CustomRedisError::Timeout);
        assert_eq!(client.calls_for("setex").len(), 1);
    }
}
