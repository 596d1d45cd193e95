//! C1: adaptive token-bucket rate/burst controller.
//!
//! A continuous-refill token bucket whose target rate and back-off factor
//! adapt to observed success/failure feedback. `acquire` never fails; a
//! caller that cannot get a token waits cooperatively until one refills.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const MAX_WAIT: Duration = Duration::from_secs(5);
const THROTTLE_FACTOR_CAP: f64 = 4.0;
const ERROR_FACTOR_CAP: f64 = 2.0;
const RATE_FLOOR: f64 = 1.0;
const MIN_CONSECUTIVE_ERRORS_FOR_BACKOFF: u64 = 5;
const MIN_CONSECUTIVE_SUCCESSES_FOR_FACTOR_DECAY: u64 = 20;
const MIN_CONSECUTIVE_SUCCESSES_FOR_RATE_RECOVERY: u64 = 50;

/// Read-only snapshot of a token bucket's state, suitable for health
/// aggregation (C8) and metrics export.
#[derive(Debug, Clone, Copy)]
pub struct BucketStats {
    pub rate: f64,
    pub burst: f64,
    pub tokens: f64,
    pub factor: f64,
    pub successes: u64,
    pub failures: u64,
    pub throttled: u64,
    pub total: u64,
}

impl BucketStats {
    /// Fraction of calls that succeeded out of all calls observed.
    pub fn throughput(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.successes as f64 / self.total as f64
        }
    }
}

struct Inner {
    r_base: f64,
    r: f64,
    burst: f64,
    tokens: f64,
    factor: f64,
    last_refill: Instant,
    consecutive_successes: u64,
    consecutive_errors: u64,
    successes: u64,
    failures: u64,
    throttled: u64,
    total: u64,
}

impl Inner {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed * self.r).min(self.burst);
    }
}

/// A single named token bucket.
pub struct TokenBucket {
    name: String,
    inner: Mutex<Inner>,
}

impl TokenBucket {
    /// Create a bucket with target rate `r_base` (req/s) and burst capacity `burst`.
    pub fn new(name: impl Into<String>, r_base: f64, burst: f64) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                r_base,
                r: r_base,
                burst,
                tokens: burst,
                factor: 1.0,
                last_refill: Instant::now(),
                consecutive_successes: 0,
                consecutive_errors: 0,
                successes: 0,
                failures: 0,
                throttled: 0,
                total: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block cooperatively until a token is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut inner = self.inner.lock();
                let now = Instant::now();
                inner.refill(now);
                if inner.tokens >= 1.0 {
                    inner.tokens -= 1.0;
                    inner.total += 1;
                    None
                } else {
                    let deficit = 1.0 - inner.tokens;
                    let refill_wait = deficit / inner.r.max(RATE_FLOOR);
                    let backoff_floor = (1.0 / inner.r.max(RATE_FLOOR)) * inner.factor;
                    let wait_secs = refill_wait.max(backoff_floor).min(MAX_WAIT.as_secs_f64());
                    inner.throttled += 1;
                    Some(Duration::from_secs_f64(wait_secs.max(0.0)))
                }
            };
            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }

    /// Record a successful call, driving the adaptation policy forward.
    pub fn report_success(&self) {
        let mut inner = self.inner.lock();
        inner.successes += 1;
        inner.consecutive_errors = 0;
        inner.consecutive_successes += 1;

        if inner.factor > 1.0
            && inner.consecutive_successes >= MIN_CONSECUTIVE_SUCCESSES_FOR_FACTOR_DECAY
        {
            inner.factor = (inner.factor * 0.9).max(1.0);
        }
        if inner.r < 1.5 * inner.r_base
            && inner.consecutive_successes >= MIN_CONSECUTIVE_SUCCESSES_FOR_RATE_RECOVERY
        {
            inner.r = (inner.r * 1.05).min(1.5 * inner.r_base);
        }
    }

    /// Record a failed call. `message` is matched against known throttle
    /// signals (HTTP 429, "rate limit", "too many requests", "throttle").
    pub fn report_error(&self, message: &str) {
        let is_throttle = is_throttle_signal(message);
        let mut inner = self.inner.lock();
        inner.failures += 1;
        inner.consecutive_successes = 0;

        if is_throttle {
            inner.factor = (inner.factor * 2.0).min(THROTTLE_FACTOR_CAP);
            inner.r = (inner.r * 0.5).max(RATE_FLOOR);
            inner.consecutive_errors = 0;
            warn!(bucket = %self.name, factor = inner.factor, rate = inner.r, "throttle signal, backing off");
        } else {
            inner.consecutive_errors += 1;
            if inner.consecutive_errors >= MIN_CONSECUTIVE_ERRORS_FOR_BACKOFF {
                inner.factor = (inner.factor * 1.5).min(ERROR_FACTOR_CAP);
                debug!(bucket = %self.name, factor = inner.factor, "sustained errors, raising back-off factor");
            }
        }
    }

    /// Hot-replace the target rate; tokens are clamped to the new burst cap.
    pub fn update_base_rate(&self, new_r: f64) {
        let mut inner = self.inner.lock();
        inner.r_base = new_r;
        inner.r = new_r;
        inner.tokens = inner.tokens.min(inner.burst);
    }

    /// Hot-replace the burst cap, clamping current tokens to the new cap.
    pub fn update_burst(&self, new_burst: f64) {
        let mut inner = self.inner.lock();
        inner.burst = new_burst;
        inner.tokens = inner.tokens.min(inner.burst);
    }

    pub fn stats(&self) -> BucketStats {
        let inner = self.inner.lock();
        BucketStats {
            rate: inner.r,
            burst: inner.burst,
            tokens: inner.tokens,
            factor: inner.factor,
            successes: inner.successes,
            failures: inner.failures,
            throttled: inner.throttled,
            total: inner.total,
        }
    }
}

fn is_throttle_signal(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("429")
        || lower.contains("rate limit")
        || lower.contains("too many requests")
        || lower.contains("throttle")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_never_blocks_when_tokens_available() {
        let bucket = TokenBucket::new("test", 8.0, 8.0);
        let start = Instant::now();
        bucket.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn tokens_never_negative_or_over_burst() {
        let bucket = TokenBucket::new("test", 8.0, 8.0);
        for _ in 0..100 {
            let stats = bucket.stats();
            assert!(stats.tokens >= 0.0);
            assert!(stats.tokens <= stats.burst);
            let _ = bucket.inner.lock();
        }
    }

    #[test]
    fn throttle_error_halves_rate_and_doubles_factor() {
        let bucket = TokenBucket::new("test", 8.0, 8.0);
        bucket.report_error("429 Too Many Requests");
        let stats = bucket.stats();
        assert_eq!(stats.rate, 4.0);
        assert_eq!(stats.factor, 2.0);
    }

    #[test]
    fn factor_decays_after_20_successes() {
        let bucket = TokenBucket::new("test", 8.0, 8.0);
        bucket.report_error("429 rate limit");
        assert_eq!(bucket.stats().factor, 2.0);
        for _ in 0..20 {
            bucket.report_success();
        }
        assert!(bucket.stats().factor <= 1.8);
    }

    #[test]
    fn rate_recovers_after_50_successes() {
        let bucket = TokenBucket::new("test", 8.0, 8.0);
        bucket.report_error("429 rate limit");
        assert_eq!(bucket.stats().rate, 4.0);
        for _ in 0..50 {
            bucket.report_success();
        }
        let stats = bucket.stats();
        assert!(stats.rate >= 4.2, "rate={}", stats.rate);
        assert!(stats.rate <= 12.0, "rate={}", stats.rate);
    }

    #[test]
    fn rate_is_bounded_by_1_5x_base() {
        let bucket = TokenBucket::new("test", 8.0, 8.0);
        for _ in 0..10_000 {
            bucket.report_success();
        }
        assert!(bucket.stats().rate <= 12.0);
    }

    #[test]
    fn non_throttle_errors_raise_factor_slower() {
        let bucket = TokenBucket::new("test", 8.0, 8.0);
        for _ in 0..5 {
            bucket.report_error("connection reset");
        }
        let stats = bucket.stats();
        assert_eq!(stats.factor, 1.5);
        assert_eq!(stats.rate, 8.0, "non-throttle errors do not touch rate");
    }

    #[test]
    fn update_base_rate_clamps_tokens_to_burst() {
        let bucket = TokenBucket::new("test", 8.0, 8.0);
        bucket.update_burst(2.0);
        assert!(bucket.stats().tokens <= 2.0);
    }
}
