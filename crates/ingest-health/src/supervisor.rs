//! C8: health and failover supervisor.
//!
//! Runs a periodic probe loop over the cache sink, the catalog oracle, the
//! analytical store's liveness, and the aggregate rate-limiter stats. Sets
//! or clears the shared `FailoverLatch` and exposes a `healthy | degraded |
//! critical` status snapshot for the control plane.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use ingest_cache::StreamSink;
use ingest_core::FailoverLatch;
use ingest_ratelimit::TokenBucket;
use ingest_registry::CatalogClient;
use ingest_telemetry::Metrics;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

/// Healthy interval; shortened to `FAST_INTERVAL` after a failed probe.
const HEALTHY_INTERVAL: Duration = Duration::from_secs(30);
const FAST_INTERVAL: Duration = Duration::from_secs(5);
const THROUGHPUT_FLOOR: f64 = 0.5;
const ERROR_RATE_CEILING: f64 = 0.25;

/// An async liveness check for the analytical store (e.g. ClickHouse).
/// Left pluggable because the store's health endpoint is an external,
/// opaque integration contract not owned by this pipeline. Absent a probe,
/// its liveness is reported as `unknown`, never silently folded into
/// `healthy`.
pub type LivenessProbe = Arc<dyn Fn() -> BoxFuture<'static, bool> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Healthy,
    Unhealthy,
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub reason: Option<String>,
    pub throughput: f64,
    pub error_rate: f64,
    pub analytical_store: Liveness,
    pub checked_at_ms: i64,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            status: HealthStatus::Healthy,
            reason: None,
            throughput: 1.0,
            error_rate: 0.0,
            analytical_store: Liveness::Unknown,
            checked_at_ms: 0,
        }
    }
}

pub struct HealthSupervisor {
    cache: Arc<StreamSink>,
    catalog: Arc<CatalogClient>,
    analytical_probe: Option<LivenessProbe>,
    latch: Arc<FailoverLatch>,
    buckets: Mutex<Vec<Arc<TokenBucket>>>,
    snapshot: RwLock<HealthSnapshot>,
    consecutive_failures: AtomicU32,
}

impl HealthSupervisor {
    pub fn new(
        cache: Arc<StreamSink>,
        catalog: Arc<CatalogClient>,
        latch: Arc<FailoverLatch>,
        analytical_probe: Option<LivenessProbe>,
    ) -> Self {
        Self {
            cache,
            catalog,
            analytical_probe,
            latch,
            buckets: Mutex::new(Vec::new()),
            snapshot: RwLock::new(HealthSnapshot::default()),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    /// Registers a C1 bucket whose stats feed the aggregate
    /// throughput/error-rate calculation. Called once per ingestion bucket
    /// at startup.
    pub fn register_bucket(&self, bucket: Arc<TokenBucket>) {
        self.buckets.lock().push(bucket);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        self.snapshot.read().clone()
    }

    /// Drives the probe loop until the shutdown signal fires.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let healthy = self.probe_once().await;
            let failures = if healthy {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                0
            } else {
                self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
            };
            let interval = if failures > 0 { FAST_INTERVAL } else { HEALTHY_INTERVAL };

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("health supervisor stopping");
                        return;
                    }
                }
            }
        }
    }

    /// Runs one probe cycle. Returns `true` if the system is not in
    /// failover (i.e. the latch was cleared or stayed clear).
    pub async fn probe_once(&self) -> bool {
        let cache_ok = self.cache.ping().await;
        let catalog_ok = self.catalog.list_spot_symbols().await.is_ok();
        let analytical = match &self.analytical_probe {
            Some(probe) => {
                if probe().await {
                    Liveness::Healthy
                } else {
                    Liveness::Unhealthy
                }
            }
            None => Liveness::Unknown,
        };

        let (throughput, error_rate) = self.aggregate_rate_stats();

        let mut reasons = Vec::new();
        if !cache_ok {
            reasons.push("cache sink ping failed".to_string());
        }
        if !catalog_ok {
            reasons.push("catalog oracle probe failed".to_string());
        }
        if throughput < THROUGHPUT_FLOOR {
            reasons.push(format!("throughput {throughput:.2} below floor"));
        }
        if error_rate > ERROR_RATE_CEILING {
            reasons.push(format!("error rate {error_rate:.2} above ceiling"));
        }
        let failover_needed = !reasons.is_empty();

        if failover_needed {
            warn!(reason = %reasons.join("; "), "health probe failing, latching failover");
            self.latch.set(true, reasons.join("; "));
        } else {
            self.latch.set(false, "");
        }

        let status = if failover_needed {
            HealthStatus::Critical
        } else if analytical == Liveness::Unhealthy {
            HealthStatus::Critical
        } else if analytical == Liveness::Unknown {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        *self.snapshot.write() = HealthSnapshot {
            status,
            reason: if reasons.is_empty() { None } else { Some(reasons.join("; ")) },
            throughput,
            error_rate,
            analytical_store: analytical,
            checked_at_ms: now_ms(),
        };

        Metrics::failover_active(failover_needed);
        Metrics::health_status(status_ordinal(status));
        let (breaker_name, breaker_state) = self.catalog.circuit_state();
        Metrics::circuit_state(breaker_name, circuit_state_ordinal(breaker_state));

        !failover_needed
    }

    fn aggregate_rate_stats(&self) -> (f64, f64) {
        let buckets = self.buckets.lock();
        let mut total = 0u64;
        let mut successes = 0u64;
        for bucket in buckets.iter() {
            let stats = bucket.stats();
            Metrics::ratelimit_snapshot(bucket.name(), stats.rate, stats.factor, stats.tokens);
            total += stats.total;
            successes += stats.successes;
        }
        let throughput = if total == 0 { 1.0 } else { successes as f64 / total as f64 };
        (throughput, 1.0 - throughput)
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn status_ordinal(status: HealthStatus) -> i64 {
    match status {
        HealthStatus::Healthy => 0,
        HealthStatus::Degraded => 1,
        HealthStatus::Critical => 2,
    }
}

fn circuit_state_ordinal(state: ingest_ratelimit::CircuitState) -> i64 {
    match state {
        ingest_ratelimit::CircuitState::Closed => 0,
        ingest_ratelimit::CircuitState::HalfOpen => 1,
        ingest_ratelimit::CircuitState::Open => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_is_healthy_with_unknown_analytical_store() {
        let snap = HealthSnapshot::default();
        assert_eq!(snap.status, HealthStatus::Healthy);
        assert_eq!(snap.analytical_store, Liveness::Unknown);
    }

    #[test]
    fn status_ordinal_matches_severity_order() {
        assert_eq!(status_ordinal(HealthStatus::Healthy), 0);
        assert_eq!(status_ordinal(HealthStatus::Degraded), 1);
        assert_eq!(status_ordinal(HealthStatus::Critical), 2);
    }

    #[test]
    fn circuit_state_ordinal_matches_closed_halfopen_open() {
        assert_eq!(circuit_state_ordinal(ingest_ratelimit::CircuitState::Closed), 0);
        assert_eq!(circuit_state_ordinal(ingest_ratelimit::CircuitState::HalfOpen), 1);
        assert_eq!(circuit_state_ordinal(ingest_ratelimit::CircuitState::Open), 2);
    }
}
