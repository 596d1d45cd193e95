//! C5: selects the per-market working set and tracks it as an immutable
//! snapshot, swapped under a single writer lock on `reconcile`.

use ingest_core::{CapabilityProfile, MarketCategory, MarketKey, SymbolId, SymbolMeta};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::client::CatalogClient;
use crate::error::RegistryResult;

/// Default floor on 24h notional for a symbol to be selected.
pub const DEFAULT_MIN_VOLUME_24H: i64 = 1_000_000;

/// Emitted whenever a (symbol, market) pair enters or leaves the working
/// set. Consumed by the application context to spin up or tear down the
/// corresponding upstream session (C6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolEvent {
    Activated(MarketKey),
    Deactivated(MarketKey),
}

/// Per-market selection knobs.
#[derive(Debug, Clone, Copy)]
pub struct SymbolManagerConfig {
    pub max_symbols_per_market: usize,
    pub min_volume_24h: Decimal,
}

impl Default for SymbolManagerConfig {
    fn default() -> Self {
        Self {
            max_symbols_per_market: 200,
            min_volume_24h: Decimal::from(DEFAULT_MIN_VOLUME_24H),
        }
    }
}

type WorkingSet = HashMap<MarketCategory, Vec<SymbolMeta>>;

/// C5: the symbol manager.
pub struct SymbolManager {
    catalog: Arc<CatalogClient>,
    config: SymbolManagerConfig,
    working_set: RwLock<Arc<WorkingSet>>,
    events: mpsc::Sender<SymbolEvent>,
}

impl SymbolManager {
    pub fn new(
        catalog: Arc<CatalogClient>,
        config: SymbolManagerConfig,
        events: mpsc::Sender<SymbolEvent>,
    ) -> Self {
        Self {
            catalog,
            config,
            working_set: RwLock::new(Arc::new(HashMap::new())),
            events,
        }
    }

    /// Populate the working set for `markets` from the catalog oracle,
    /// emitting an activation event for every selected pair. Call once at
    /// startup; use `reconcile` afterwards.
    pub async fn initialize(&self, markets: &[MarketCategory]) -> RegistryResult<()> {
        let fresh = self.fetch_working_set(markets).await?;
        self.swap_and_emit(fresh).await;
        Ok(())
    }

    /// Re-derive the working set from a new capability profile: expands (or
    /// contracts) the active market set and the per-market selection cap,
    /// emitting add/remove events for the delta.
    pub async fn reconcile(&self, profile: &CapabilityProfile) -> RegistryResult<()> {
        let mut config = self.config;
        config.max_symbols_per_market = config.max_symbols_per_market.max(profile.max_symbols_per_group);
        let fresh = self.fetch_working_set_with(&profile.markets, config).await?;
        self.swap_and_emit(fresh).await;
        Ok(())
    }

    /// The ordered working set for one market category.
    pub fn symbols_for(&self, market: MarketCategory) -> Vec<SymbolId> {
        self.working_set
            .read()
            .get(&market)
            .map(|v| v.iter().map(|m| m.symbol.clone()).collect())
            .unwrap_or_default()
    }

    /// The full `SymbolMeta` working set for one market category.
    pub fn meta_for(&self, market: MarketCategory) -> Vec<SymbolMeta> {
        self.working_set.read().get(&market).cloned().unwrap_or_default()
    }

    async fn fetch_working_set(&self, markets: &[MarketCategory]) -> RegistryResult<WorkingSet> {
        self.fetch_working_set_with(markets, self.config).await
    }

    async fn fetch_working_set_with(
        &self,
        markets: &[MarketCategory],
        config: SymbolManagerConfig,
    ) -> RegistryResult<WorkingSet> {
        let mut result = WorkingSet::new();
        for &market in markets {
            let mut symbols = if market == MarketCategory::Spot {
                self.catalog.list_spot_symbols().await?
            } else {
                self.catalog.list_futures_symbols(market).await?
            };
            symbols.retain(|m| m.notional_24h >= config.min_volume_24h);
            symbols.sort_by(|a, b| {
                b.notional_24h
                    .cmp(&a.notional_24h)
                    .then_with(|| a.symbol.as_str().cmp(b.symbol.as_str()))
            });
            symbols.truncate(config.max_symbols_per_market);
            result.insert(market, symbols);
        }
        Ok(result)
    }

    async fn swap_and_emit(&self, fresh: WorkingSet) {
        let previous = self.working_set.read().clone();
        let previous_keys = flatten_keys(&previous);
        let fresh_keys = flatten_keys(&fresh);

        *self.working_set.write() = Arc::new(fresh);

        for key in fresh_keys.difference(&previous_keys) {
            let _ = self.events.send(SymbolEvent::Activated(key.clone())).await;
        }
        for key in previous_keys.difference(&fresh_keys) {
            let _ = self.events.send(SymbolEvent::Deactivated(key.clone())).await;
        }
        info!(
            activated = fresh_keys.difference(&previous_keys).count(),
            deactivated = previous_keys.difference(&fresh_keys).count(),
            "symbol working set reconciled"
        );
    }
}

fn flatten_keys(set: &WorkingSet) -> std::collections::HashSet<MarketKey> {
    set.iter()
        .flat_map(|(market, metas)| metas.iter().map(move |m| MarketKey::new(m.symbol.clone(), *market)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_core::{Price, Size, SymbolStatus};
    use rust_decimal_macros::dec;

    fn meta(symbol: &str, market: MarketCategory, notional: Decimal) -> SymbolMeta {
        SymbolMeta {
            symbol: SymbolId::new(symbol),
            market,
            base: "X".into(),
            quote: "USDT".into(),
            status: SymbolStatus::Online,
            min_size: Size::new(dec!(0.001)),
            max_size: Size::new(dec!(1000)),
            size_tick: Size::new(dec!(0.001)),
            price_tick: Price::new(dec!(0.01)),
            notional_24h: notional,
        }
    }

    #[test]
    fn flatten_keys_covers_all_markets() {
        let mut ws = WorkingSet::new();
        ws.insert(
            MarketCategory::Spot,
            vec![meta("BTCUSDT", MarketCategory::Spot, dec!(2_000_000))],
        );
        let keys = flatten_keys(&ws);
        assert_eq!(keys.len(), 1);
        assert!(keys.contains(&MarketKey::new(SymbolId::new("BTCUSDT"), MarketCategory::Spot)));
    }

    #[test]
    fn default_min_volume_matches_spec() {
        let config = SymbolManagerConfig::default();
        assert_eq!(config.min_volume_24h, Decimal::from(1_000_000));
    }
}
