//! Prometheus metrics for the ingestion pipeline.
//!
//! Covers every component on the data path:
//! - C1/C2: rate bucket and circuit breaker state
//! - C3: published/deduplicated trade and book counts
//! - C6: upstream session state per subscription group
//! - C7: fan-out broker delivery counters
//! - C8: failover latch state
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent
//! failure. These panics only occur during static initialization, never at
//! runtime.

use once_cell::sync::Lazy;
use prometheus::{
    gather, register_counter_vec, register_gauge, register_gauge_vec, register_int_counter_vec,
    register_int_gauge, register_int_gauge_vec, CounterVec, Encoder, Gauge, GaugeVec,
    IntCounterVec, IntGauge, IntGaugeVec, TextEncoder,
};

/// Trades accepted into the cache sink, per market.
pub static TRADES_PUBLISHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ingest_trades_published_total",
        "Trades successfully published to the cache sink",
        &["market"]
    )
    .unwrap()
});

/// Trades rejected by the dedup check, per market.
pub static TRADES_DEDUPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ingest_trades_deduped_total",
        "Trades rejected as duplicates before publish",
        &["market"]
    )
    .unwrap()
});

/// Order book snapshots written to the cache sink, per market.
pub static BOOK_UPDATES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ingest_book_updates_total",
        "Order book updates written to the cache sink",
        &["market"]
    )
    .unwrap()
});

/// Upstream session state machine, one gauge set per subscription group.
/// Labels: group, state. 1 = active state, 0 = inactive.
pub static UPSTREAM_SESSION_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "ingest_upstream_session_state",
        "Upstream session state machine current state (1=active, 0=inactive)",
        &["group", "state"]
    )
    .unwrap()
});

/// Total upstream reconnect attempts, per subscription group.
pub static UPSTREAM_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ingest_upstream_reconnect_total",
        "Total upstream reconnection attempts",
        &["group", "reason"]
    )
    .unwrap()
});

/// Current token-bucket rate, per bucket name.
pub static RATELIMIT_RATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "ingest_ratelimit_rate",
        "Current effective rate of a token bucket (tokens/sec)",
        &["bucket"]
    )
    .unwrap()
});

/// Current back-off factor applied to a token bucket, per bucket name.
pub static RATELIMIT_FACTOR: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "ingest_ratelimit_factor",
        "Current back-off factor applied to a token bucket's rate",
        &["bucket"]
    )
    .unwrap()
});

/// Current token count held by a bucket, per bucket name.
pub static RATELIMIT_TOKENS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "ingest_ratelimit_tokens",
        "Current token count held by a bucket",
        &["bucket"]
    )
    .unwrap()
});

/// Circuit breaker state, per breaker name. 0 = closed, 1 = half-open,
/// 2 = open.
pub static CIRCUIT_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "ingest_circuit_state",
        "Circuit breaker state (0=closed, 1=half-open, 2=open)",
        &["breaker"]
    )
    .unwrap()
});

/// Fan-out broker messages sent to dashboard sessions.
pub static BROKER_MESSAGES_SENT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ingest_broker_messages_sent_total",
        "Fan-out broker messages delivered to sessions",
        &["symbol"]
    )
    .unwrap()
});

/// Fan-out broker messages enqueued before coalescing/flush.
pub static BROKER_MESSAGES_QUEUED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ingest_broker_messages_queued_total",
        "Fan-out broker messages enqueued by broadcast()",
        &["symbol"]
    )
    .unwrap()
});

/// Fan-out broker active sessions, broker-wide.
pub static BROKER_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "ingest_broker_connections",
        "Currently attached fan-out broker sessions"
    )
    .unwrap()
});

/// Fan-out broker send/connection errors.
pub static BROKER_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ingest_broker_errors_total",
        "Fan-out broker send or connection errors",
        &["kind"]
    )
    .unwrap()
});

/// Failover latch state (1 = active, 0 = cleared).
pub static FAILOVER_ACTIVE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "ingest_failover_active",
        "Whether the upstream failover latch is currently set"
    )
    .unwrap()
});

/// Health supervisor status (0=healthy, 1=degraded, 2=critical).
pub static HEALTH_STATUS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "ingest_health_status",
        "Health supervisor status (0=healthy, 1=degraded, 2=critical)"
    )
    .unwrap()
});

/// Catalog oracle symbols currently in the working set, per market.
pub static WORKING_SET_SIZE: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "ingest_working_set_size",
        "Symbols currently selected into the working set",
        &["market"]
    )
    .unwrap()
});

const SESSION_STATES: [&str; 6] = [
    "idle",
    "connecting",
    "subscribing",
    "streaming",
    "draining",
    "reconnecting",
];

/// Facade over the static metric handles above; callers never touch
/// `prometheus` types directly.
pub struct Metrics;

impl Metrics {
    pub fn trade_published(market: &str) {
        TRADES_PUBLISHED_TOTAL.with_label_values(&[market]).inc();
    }

    pub fn trade_deduped(market: &str) {
        TRADES_DEDUPED_TOTAL.with_label_values(&[market]).inc();
    }

    pub fn book_update(market: &str) {
        BOOK_UPDATES_TOTAL.with_label_values(&[market]).inc();
    }

    /// Sets the active upstream session state for `group`, zeroing every
    /// other known state so exactly one gauge reads 1 at a time.
    pub fn upstream_session_state(group: &str, state: &str) {
        for s in SESSION_STATES {
            UPSTREAM_SESSION_STATE.with_label_values(&[group, s]).set(0.0);
        }
        UPSTREAM_SESSION_STATE.with_label_values(&[group, state]).set(1.0);
    }

    pub fn upstream_reconnect(group: &str, reason: &str) {
        UPSTREAM_RECONNECT_TOTAL.with_label_values(&[group, reason]).inc();
    }

    pub fn ratelimit_snapshot(bucket: &str, rate: f64, factor: f64, tokens: f64) {
        RATELIMIT_RATE.with_label_values(&[bucket]).set(rate);
        RATELIMIT_FACTOR.with_label_values(&[bucket]).set(factor);
        RATELIMIT_TOKENS.with_label_values(&[bucket]).set(tokens);
    }

    pub fn circuit_state(breaker: &str, state_ordinal: i64) {
        CIRCUIT_STATE.with_label_values(&[breaker]).set(state_ordinal);
    }

    pub fn broker_message_sent(symbol: &str) {
        BROKER_MESSAGES_SENT_TOTAL.with_label_values(&[symbol]).inc();
    }

    pub fn broker_message_queued(symbol: &str) {
        BROKER_MESSAGES_QUEUED_TOTAL.with_label_values(&[symbol]).inc();
    }

    pub fn broker_connections_set(count: i64) {
        BROKER_CONNECTIONS.set(count);
    }

    pub fn broker_error(kind: &str) {
        BROKER_ERRORS_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn failover_active(active: bool) {
        FAILOVER_ACTIVE.set(if active { 1.0 } else { 0.0 });
    }

    /// Status ordinal matching `ingest_health::HealthStatus`'s natural
    /// severity order (0=healthy, 1=degraded, 2=critical).
    pub fn health_status(ordinal: i64) {
        HEALTH_STATUS.set(ordinal);
    }

    pub fn working_set_size(market: &str, size: i64) {
        WORKING_SET_SIZE.with_label_values(&[market]).set(size);
    }
}

/// Render the process registry in Prometheus text exposition format, for
/// the control plane's `/metrics` endpoint.
pub fn render() -> String {
    let families = gather();
    let mut buf = Vec::new();
    TextEncoder::new()
        .encode(&families, &mut buf)
        .expect("prometheus text encoding is infallible for well-formed metric families");
    String::from_utf8(buf).expect("prometheus text encoder always emits valid utf-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_without_panicking() {
        Metrics::trade_published("spot");
        Metrics::trade_deduped("spot");
        Metrics::book_update("usdtm");
        Metrics::broker_message_sent("BTCUSDT");
        Metrics::broker_error("send_failed");
    }

    #[test]
    fn render_includes_registered_families() {
        Metrics::trade_published("spot");
        let text = render();
        assert!(text.contains("ingest_trades_published_total"));
    }

    #[test]
    fn session_state_transition_leaves_exactly_one_active() {
        Metrics::upstream_session_state("spot-0", "connecting");
        Metrics::upstream_session_state("spot-0", "streaming");
        let streaming = UPSTREAM_SESSION_STATE
            .with_label_values(&["spot-0", "streaming"])
            .get();
        let connecting = UPSTREAM_SESSION_STATE
            .with_label_values(&["spot-0", "connecting"])
            .get();
        assert_eq!(streaming, 1.0);
        assert_eq!(connecting, 0.0);
    }
}
