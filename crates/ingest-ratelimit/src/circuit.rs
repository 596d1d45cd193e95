//! C2: circuit breaker gating a risky operation (outbound REST/connect calls).

use crate::error::RateLimitError;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

/// Configuration for a circuit breaker.
#[derive(Debug, Clone, Copy)]
pub struct CircuitConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

/// A single named circuit breaker.
pub struct CircuitBreaker {
    name: String,
    config: CircuitConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.maybe_transition_to_half_open();
        self.inner.lock().state
    }

    fn maybe_transition_to_half_open(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::Open {
            if let Some(last_failure) = inner.last_failure {
                if last_failure.elapsed() >= self.config.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                }
            }
        }
    }

    /// Run `op` through the circuit. Short-circuits with `CircuitOpen` while
    /// the breaker is open. The wrapped operation's own error is re-raised
    /// unchanged.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, CircuitOutcome<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.maybe_transition_to_half_open();
        {
            let inner = self.inner.lock();
            if inner.state == CircuitState::Open {
                return Err(CircuitOutcome::Open(RateLimitError::CircuitOpen(
                    self.name.clone(),
                )));
            }
        }

        match op().await {
            Ok(v) => {
                self.on_success();
                Ok(v)
            }
            Err(e) => {
                self.on_failure();
                Err(CircuitOutcome::Inner(e))
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.state = CircuitState::Closed;
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        inner.last_failure = Some(Instant::now());
        match inner.state {
            CircuitState::HalfOpen => inner.state = CircuitState::Open,
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                }
            }
            CircuitState::Open => {}
        }
    }
}

/// Outcome of a circuit-guarded call: either the circuit rejected the call
/// outright, or the wrapped operation ran and failed with its own error.
#[derive(Debug)]
pub enum CircuitOutcome<E> {
    Open(RateLimitError),
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for CircuitOutcome<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open(e) => write!(f, "{e}"),
            Self::Inner(e) => write!(f, "{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitConfig {
        CircuitConfig {
            failure_threshold: 5,
            reset_timeout: Duration::from_millis(50),
        }
    }

    async fn fail() -> Result<(), &'static str> {
        Err("boom")
    }

    async fn ok() -> Result<(), &'static str> {
        Ok(())
    }

    #[tokio::test]
    async fn opens_after_failure_threshold() {
        let cb = CircuitBreaker::new("test", config());
        for _ in 0..5 {
            let _ = cb.execute(fail).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn open_rejects_without_running_operation() {
        let cb = CircuitBreaker::new("test", config());
        for _ in 0..5 {
            let _ = cb.execute(fail).await;
        }
        let result = cb.execute(ok).await;
        assert!(matches!(result, Err(CircuitOutcome::Open(_))));
    }

    #[tokio::test]
    async fn half_open_after_reset_timeout_then_closes_on_success() {
        let cb = CircuitBreaker::new("test", config());
        for _ in 0..5 {
            let _ = cb.execute(fail).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        let result = cb.execute(ok).await;
        assert!(result.is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_reopens_on_failure() {
        let cb = CircuitBreaker::new("test", config());
        for _ in 0..5 {
            let _ = cb.execute(fail).await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        let _ = cb.execute(fail).await;
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn inner_error_is_preserved() {
        let cb = CircuitBreaker::new("test", config());
        let result = cb.execute(fail).await;
        match result {
            Err(CircuitOutcome::Inner(e)) => assert_eq!(e, "boom"),
            other => panic!("expected inner error, got {other:?}"),
        }
    }
}
