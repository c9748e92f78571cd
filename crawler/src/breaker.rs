use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::metrics_consts::BREAKER_TRANSITIONS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub max_failures: u32,
    /// How long the circuit stays open before probing.
    pub reset_timeout: Duration,
    /// Consecutive half-open successes required to close again.
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            reset_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Error, Debug)]
pub enum BreakerError<E> {
    #[error("circuit breaker '{0}' is open")]
    Open(String),
    #[error(transparent)]
    Inner(E),
}

type StateChangeFn = Box<dyn Fn(BreakerState, BreakerState) + Send + Sync>;

struct Inner {
    state: BreakerState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
}

/// Three-state breaker guarding an outbound call. All transitions run under
/// one lock, so observers never see a torn state. The optional callback
/// fires on every transition while the lock is held; keep it cheap and
/// never call back into the breaker from it.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
    on_state_change: Option<StateChangeFn>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
            }),
            on_state_change: None,
        }
    }

    pub fn with_state_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(BreakerState, BreakerState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Box::new(callback));
        self
    }

    /// Gate check. An open circuit flips to half-open once `reset_timeout`
    /// has elapsed since the last failure; until then calls are refused.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let waited_out = inner
                    .last_failure
                    .map(|at| at.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);
                if waited_out {
                    inner.success_count = 0;
                    self.transition(&mut inner, BreakerState::HalfOpen);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::Closed => {
                inner.failure_count = 0;
            }
            BreakerState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    self.transition(&mut inner, BreakerState::Closed);
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.last_failure = Some(Instant::now());
        inner.success_count = 0;
        match inner.state {
            BreakerState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.max_failures {
                    self.transition(&mut inner, BreakerState::Open);
                }
            }
            BreakerState::HalfOpen => {
                // Any half-open failure reopens immediately
                inner.failure_count += 1;
                self.transition(&mut inner, BreakerState::Open);
            }
            BreakerState::Open => {
                inner.failure_count += 1;
            }
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    /// Run `f` through the breaker: refused while open, otherwise recorded.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if !self.can_execute() {
            return Err(BreakerError::Open(self.name.clone()));
        }
        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;

        match to {
            BreakerState::Open => warn!(
                "circuit breaker '{}': {} -> {} after {} failures",
                self.name,
                from.as_str(),
                to.as_str(),
                inner.failure_count
            ),
            _ => info!(
                "circuit breaker '{}': {} -> {}",
                self.name,
                from.as_str(),
                to.as_str()
            ),
        }
        metrics::counter!(
            BREAKER_TRANSITIONS,
            &[
                ("name".to_string(), self.name.clone()),
                ("to".to_string(), to.as_str().to_string()),
            ]
        )
        .increment(1);

        if let Some(callback) = &self.on_state_change {
            callback(from, to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn breaker(reset_timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            BreakerConfig {
                max_failures: 3,
                reset_timeout,
                success_threshold: 2,
            },
        )
    }

    #[test]
    fn stays_closed_below_threshold() {
        let cb = breaker(Duration::from_secs(30));
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(cb.can_execute());
    }

    #[test]
    fn opens_at_threshold_and_refuses_calls() {
        let cb = breaker(Duration::from_secs(30));
        for _ in 0..3 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.can_execute());
    }

    #[test]
    fn success_resets_the_failure_count() {
        let cb = breaker(Duration::from_secs(30));
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_after_reset_timeout_then_closes_on_two_successes() {
        let cb = breaker(Duration::from_millis(20));
        for _ in 0..3 {
            cb.record_failure();
        }
        assert!(!cb.can_execute());

        std::thread::sleep(Duration::from_millis(30));
        assert!(cb.can_execute());
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = breaker(Duration::from_millis(20));
        for _ in 0..3 {
            cb.record_failure();
        }
        std::thread::sleep(Duration::from_millis(30));
        assert!(cb.can_execute());
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.can_execute());
    }

    #[test]
    fn state_change_callback_sees_every_transition() {
        let transitions = Arc::new(AtomicUsize::new(0));
        let seen = transitions.clone();
        let cb = CircuitBreaker::new(
            "cb",
            BreakerConfig {
                max_failures: 1,
                reset_timeout: Duration::from_millis(10),
                success_threshold: 2,
            },
        )
        .with_state_change(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        cb.record_failure(); // closed -> open
        std::thread::sleep(Duration::from_millis(15));
        assert!(cb.can_execute()); // open -> half-open
        cb.record_success();
        cb.record_success(); // half-open -> closed
        assert_eq!(transitions.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn call_wraps_the_closure() {
        let cb = CircuitBreaker::new(
            "wrapped",
            BreakerConfig {
                max_failures: 1,
                reset_timeout: Duration::from_secs(30),
                success_threshold: 2,
            },
        );

        let ok: Result<u32, BreakerError<&str>> = cb.call(|| async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err: Result<u32, BreakerError<&str>> = cb.call(|| async { Err("boom") }).await;
        assert!(matches!(err, Err(BreakerError::Inner("boom"))));

        // Breaker opened on that failure; further calls are refused
        let refused: Result<u32, BreakerError<&str>> = cb.call(|| async { Ok(7) }).await;
        assert!(matches!(refused, Err(BreakerError::Open(_))));
    }
}
