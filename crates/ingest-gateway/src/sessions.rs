//! Application-level C6 orchestration: keeps one running [`UpstreamSession`]
//! per desired [`SubscriptionGroup`], starting and stopping them as the
//! working set (C5) or the capability profile (C9) changes.

use std::collections::HashMap;
use std::sync::Arc;

use ingest_core::{CapabilityProfile, FailoverLatch, MarketCategory, SubscriptionGroup};
use ingest_feed::{SessionConfig, SessionEvent, UpstreamSession};
use ingest_ratelimit::TokenBucket;
use ingest_registry::SymbolManager;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::VenueConfig;

struct RunningSession {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns the set of live upstream sessions and reconciles it against a
/// desired group list on every capability change.
pub struct SessionManager {
    venue: VenueConfig,
    failover: Arc<FailoverLatch>,
    subscribe_bucket: Arc<TokenBucket>,
    events: mpsc::Sender<SessionEvent>,
    running: Mutex<HashMap<String, RunningSession>>,
}

impl SessionManager {
    pub fn new(
        venue: VenueConfig,
        failover: Arc<FailoverLatch>,
        subscribe_bucket: Arc<TokenBucket>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            venue,
            failover,
            subscribe_bucket,
            events,
            running: Mutex::new(HashMap::new()),
        }
    }

    fn ws_url_for(&self, category: MarketCategory) -> &str {
        match category {
            MarketCategory::Spot => &self.venue.url_spot,
            MarketCategory::UsdtM | MarketCategory::CoinM | MarketCategory::UsdcM => {
                &self.venue.url_mix
            }
        }
    }

    fn desired_groups(&self, symbol_manager: &SymbolManager, profile: &CapabilityProfile) -> Vec<SubscriptionGroup> {
        let mut groups = Vec::new();
        for &category in &profile.markets {
            let symbols = symbol_manager.symbols_for(category);
            groups.extend(ingest_core::partition_into_groups(
                category,
                "grp",
                &symbols,
                profile.max_symbols_per_group,
            ));
        }
        groups
    }

    /// Rebuilds the running session set to match `symbol_manager`'s current
    /// working set under `profile`. Starts sessions for new groups, leaves
    /// unchanged groups alone, and stops sessions for groups no longer
    /// desired. Never restarts a session whose group id is unchanged, so a
    /// routine working-set refresh does not interrupt steady symbols.
    pub async fn reconcile(&self, symbol_manager: &SymbolManager, profile: Arc<CapabilityProfile>) {
        let desired = self.desired_groups(symbol_manager, &profile);
        let desired_ids: std::collections::HashSet<&str> =
            desired.iter().map(|g| g.id.as_str()).collect();

        let stale: Vec<String> = {
            let running = self.running.lock();
            running
                .keys()
                .filter(|id| !desired_ids.contains(id.as_str()))
                .cloned()
                .collect()
        };
        for id in stale {
            self.stop_one(&id).await;
        }

        for group in desired {
            let already_running = self.running.lock().contains_key(&group.id);
            if already_running {
                continue;
            }
            self.start_one(group, profile.book_subscriptions_enabled);
        }
    }

    fn start_one(&self, group: SubscriptionGroup, privileged: bool) {
        let id = group.id.clone();
        let ws_url = self.ws_url_for(group.category).to_string();
        let (stop_tx, stop_rx) = watch::channel(false);
        let session = UpstreamSession::new(
            SessionConfig {
                ws_url,
                group,
                privileged,
            },
            self.failover.clone(),
            self.subscribe_bucket.clone(),
            self.events.clone(),
            stop_rx,
        );
        let handle = tokio::spawn(session.run());
        info!(group = %id, "upstream session started");
        self.running.lock().insert(
            id,
            RunningSession {
                stop: stop_tx,
                handle,
            },
        );
    }

    async fn stop_one(&self, id: &str) {
        let removed = self.running.lock().remove(id);
        if let Some(running) = removed {
            let _ = running.stop.send(true);
            info!(group = %id, "upstream session stopping");
            let _ = running.handle.await;
        }
    }

    /// Stops every running session. Called on application shutdown.
    pub async fn stop_all(&self) {
        let ids: Vec<String> = self.running.lock().keys().cloned().collect();
        for id in ids {
            self.stop_one(&id).await;
        }
    }

    pub fn active_group_count(&self) -> usize {
        self.running.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn venue() -> VenueConfig {
        VenueConfig {
            rest_base_url: "https://api.bitget.com".to_string(),
            url_spot: "wss://ws.bitget.com/spot/v1/stream".to_string(),
            url_mix: "wss://ws.bitget.com/mix/v1/stream".to_string(),
        }
    }

    #[test]
    fn ws_url_routes_by_category() {
        let (tx, _rx) = mpsc::channel(1);
        let mgr = SessionManager::new(
            venue(),
            Arc::new(FailoverLatch::new()),
            Arc::new(TokenBucket::new("subscribe", 10.0, 10.0)),
            tx,
        );
        assert_eq!(mgr.ws_url_for(MarketCategory::Spot), venue().url_spot);
        assert_eq!(mgr.ws_url_for(MarketCategory::UsdtM), venue().url_mix);
        assert_eq!(mgr.ws_url_for(MarketCategory::CoinM), venue().url_mix);
    }

    #[test]
    fn new_manager_starts_with_no_active_groups() {
        let (tx, _rx) = mpsc::channel(1);
        let mgr = SessionManager::new(
            venue(),
            Arc::new(FailoverLatch::new()),
            Arc::new(TokenBucket::new("subscribe", 10.0, 10.0)),
            tx,
        );
        assert_eq!(mgr.active_group_count(), 0);
    }
}
