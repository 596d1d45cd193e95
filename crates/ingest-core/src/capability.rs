//! Capability profile: the effective limits and markets derived from
//! whether privileged credentials are configured (C9).
//!
//! Lives in `ingest-core` rather than the health crate that derives it
//! (`ingest-health`) because the symbol manager (`ingest-registry`) also
//! needs to read it when reconciling its working set, and `ingest-health`
//! already depends on `ingest-registry` to probe the catalog oracle.

use crate::market::MarketCategory;
use serde::{Deserialize, Serialize};

/// Caller tier, derived from the currently configured credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Public,
    Privileged,
}

/// The effective limits and feature set for the current tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityProfile {
    pub tier: Tier,
    pub rate_cap: f64,
    pub max_symbols_per_group: usize,
    pub resolutions_secs: Vec<u32>,
    pub historical_window_days: u32,
    pub markets: Vec<MarketCategory>,
    pub book_subscriptions_enabled: bool,
}

impl CapabilityProfile {
    pub fn public() -> Self {
        Self {
            tier: Tier::Public,
            rate_cap: 8.0,
            max_symbols_per_group: 10,
            resolutions_secs: vec![60, 300, 900, 3600],
            historical_window_days: 30,
            markets: vec![MarketCategory::Spot, MarketCategory::UsdtM],
            book_subscriptions_enabled: false,
        }
    }

    pub fn privileged() -> Self {
        Self {
            tier: Tier::Privileged,
            rate_cap: 120.0,
            max_symbols_per_group: 100,
            resolutions_secs: vec![1, 5, 15, 60, 300, 900, 3600],
            historical_window_days: 365,
            markets: vec![
                MarketCategory::Spot,
                MarketCategory::UsdtM,
                MarketCategory::CoinM,
                MarketCategory::UsdcM,
            ],
            book_subscriptions_enabled: true,
        }
    }

    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Public => Self::public(),
            Tier::Privileged => Self::privileged(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_profile_excludes_coin_and_usdc_markets() {
        let p = CapabilityProfile::public();
        assert!(!p.markets.contains(&MarketCategory::CoinM));
        assert!(!p.book_subscriptions_enabled);
    }

    #[test]
    fn privileged_profile_enables_all_markets_and_books() {
        let p = CapabilityProfile::privileged();
        assert_eq!(p.markets.len(), 4);
        assert!(p.book_subscriptions_enabled);
        assert_eq!(p.max_symbols_per_group, 100);
    }
}
