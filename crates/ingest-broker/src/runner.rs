//! Background tasks that drive a [`FanOutBroker`]: the batch flusher and the
//! client-session idle sweeper. Spawned once by the application context
//! alongside the broker itself; both stop on the shared shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::broker::FanOutBroker;

const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

pub async fn run_flusher(broker: Arc<FanOutBroker>, batch_interval_ms: u64, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(Duration::from_millis(batch_interval_ms));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                broker.flush_once().await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    debug!("fan-out flusher stopping");
                    return;
                }
            }
        }
    }
}

pub async fn run_idle_sweeper(broker: Arc<FanOutBroker>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                broker.sweep_idle().await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    debug!("fan-out idle sweeper stopping");
                    return;
                }
            }
        }
    }
}
