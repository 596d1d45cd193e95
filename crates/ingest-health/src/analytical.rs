//! Liveness contract for the analytical store (ClickHouse), kept as a pure
//! interface: this pipeline never writes to or queries the store, only
//! probes whether it is reachable (§1 declares bulk-insert/query out of
//! scope). Absent a probe, the supervisor reports `Liveness::Unknown`
//! rather than folding a missing check into `healthy`.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tracing::debug;

use crate::supervisor::LivenessProbe;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// An async liveness check for an external store. Implemented here rather
/// than inlined as a closure so the contract has a name callers can point
/// to instead of reconstructing an ad-hoc `Fn` signature per call site.
pub trait AnalyticalStoreProbe: Send + Sync {
    fn ping(&self) -> BoxFuture<'_, bool>;
}

/// HTTP-based liveness check against ClickHouse's `/ping` endpoint.
pub struct HttpAnalyticalProbe {
    http: reqwest::Client,
    url: String,
}

impl HttpAnalyticalProbe {
    /// Builds the probe URL from `CLICKHOUSE_HOST`/`CLICKHOUSE_PORT`
    /// (default 8123), matching the env vars in §6.
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("CLICKHOUSE_HOST").ok()?;
        let port = std::env::var("CLICKHOUSE_PORT").unwrap_or_else(|_| "8123".to_string());
        Some(Self::new(format!("http://{host}:{port}")))
    }

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: format!("{}/ping", base_url.into()),
        }
    }
}

impl AnalyticalStoreProbe for HttpAnalyticalProbe {
    fn ping(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            match self.http.get(&self.url).timeout(PROBE_TIMEOUT).send().await {
                Ok(resp) if resp.status().is_success() => true,
                Ok(resp) => {
                    debug!(status = %resp.status(), "clickhouse ping returned non-success");
                    false
                }
                Err(e) => {
                    debug!(error = %e, "clickhouse ping failed");
                    false
                }
            }
        })
    }
}

/// Adapts any [`AnalyticalStoreProbe`] into the closure shape
/// [`HealthSupervisor::new`] expects.
pub fn as_liveness_probe(probe: Arc<dyn AnalyticalStoreProbe>) -> LivenessProbe {
    Arc::new(move || {
        let probe = probe.clone();
        Box::pin(async move { probe.ping().await }) as BoxFuture<'static, bool>
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysUp;
    impl AnalyticalStoreProbe for AlwaysUp {
        fn ping(&self) -> BoxFuture<'_, bool> {
            Box::pin(async { true })
        }
    }

    #[tokio::test]
    async fn adapted_probe_reports_liveness() {
        let probe = as_liveness_probe(Arc::new(AlwaysUp));
        assert!(probe().await);
    }
}
