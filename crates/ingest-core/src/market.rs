//! Market identification types.
//!
//! The venue serves several market categories over distinct streaming
//! endpoints and symbol-suffix conventions. `MarketKey` is the primary
//! key used throughout the pipeline to identify a (symbol, category) pair.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Market category served by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketCategory {
    Spot,
    /// USDT-margined futures.
    UsdtM,
    /// Coin-margined futures.
    CoinM,
    /// USDC-margined futures.
    UsdcM,
}

impl MarketCategory {
    /// All market categories, used when no capability profile restricts them.
    pub const ALL: [MarketCategory; 4] = [
        MarketCategory::Spot,
        MarketCategory::UsdtM,
        MarketCategory::CoinM,
        MarketCategory::UsdcM,
    ];

    /// Venue `instType` tag used in subscribe envelopes.
    pub fn inst_type(&self) -> &'static str {
        match self {
            Self::Spot => "SP",
            Self::UsdtM => "UMCBL",
            Self::CoinM => "DMCBL",
            Self::UsdcM => "CMCBL",
        }
    }

    /// Symbol suffix appended to the bare symbol to form the venue `instId`.
    pub fn inst_id_suffix(&self) -> &'static str {
        match self {
            Self::Spot => "_SPBL",
            Self::UsdtM => "_UMCBL",
            Self::CoinM => "_DMCBL",
            Self::UsdcM => "_CMCBL",
        }
    }

    /// Short slug used in cache-sink key namespaces and metric labels.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::UsdtM => "usdtm",
            Self::CoinM => "coinm",
            Self::UsdcM => "usdcm",
        }
    }
}

impl fmt::Display for MarketCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug())
    }
}

impl FromStr for MarketCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spot" => Ok(Self::Spot),
            "usdtm" | "umcbl" => Ok(Self::UsdtM),
            "coinm" | "dmcbl" => Ok(Self::CoinM),
            "usdcm" | "cmcbl" => Ok(Self::UsdcM),
            other => Err(CoreError::UnsupportedMarketCategory(other.to_string())),
        }
    }
}

/// A venue symbol, e.g. `BTCUSDT`. Stored without any market-specific suffix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolId(pub String);

impl SymbolId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Strip a market-specific suffix (e.g. `_UMCBL`) off an `instId`,
    /// returning the bare symbol. Falls back to the input unchanged if
    /// the suffix is absent.
    pub fn from_inst_id(inst_id: &str, category: MarketCategory) -> Self {
        let suffix = category.inst_id_suffix();
        match inst_id.strip_suffix(suffix) {
            Some(bare) => Self(bare.to_string()),
            None => Self(inst_id.to_string()),
        }
    }

    /// Build the venue `instId` for this symbol under the given category.
    pub fn to_inst_id(&self, category: MarketCategory) -> String {
        format!("{}{}", self.0, category.inst_id_suffix())
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SymbolId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SymbolId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Unique key for a (symbol, market category) pair.
///
/// This is the primary key used to address cache-sink streams, fan-out
/// channels, and subscription-group membership.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketKey {
    pub symbol: SymbolId,
    pub category: MarketCategory,
}

impl MarketKey {
    pub fn new(symbol: SymbolId, category: MarketCategory) -> Self {
        Self { symbol, category }
    }
}

impl fmt::Display for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.symbol, self.category)
    }
}

/// Fixed per-category venue routing, matching the venue's streaming
/// endpoints and subscribe-envelope conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketRoute {
    pub category: MarketCategory,
    pub url_field: &'static str,
}

/// Returns the venue connection URL field name for a market category.
///
/// Spot markets connect to `url_spot`; all futures categories share
/// `url_mix` and are distinguished only by `instType`.
pub fn route_for(category: MarketCategory) -> MarketRoute {
    MarketRoute {
        category,
        url_field: match category {
            MarketCategory::Spot => "url_spot",
            MarketCategory::UsdtM | MarketCategory::CoinM | MarketCategory::UsdcM => "url_mix",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inst_id_roundtrip() {
        let sym = SymbolId::new("BTCUSDT");
        let inst_id = sym.to_inst_id(MarketCategory::UsdtM);
        assert_eq!(inst_id, "BTCUSDT_UMCBL");
        let back = SymbolId::from_inst_id(&inst_id, MarketCategory::UsdtM);
        assert_eq!(back, sym);
    }

    #[test]
    fn category_from_str_accepts_inst_type_and_slug() {
        assert_eq!(
            "UMCBL".parse::<MarketCategory>().unwrap(),
            MarketCategory::UsdtM
        );
        assert_eq!(
            "usdtm".parse::<MarketCategory>().unwrap(),
            MarketCategory::UsdtM
        );
    }

    #[test]
    fn category_from_str_rejects_unknown() {
        assert!("dogecoinm".parse::<MarketCategory>().is_err());
    }

    #[test]
    fn market_key_display() {
        let key = MarketKey::new(SymbolId::new("ETHUSDT"), MarketCategory::Spot);
        assert_eq!(key.to_string(), "ETHUSDT:spot");
    }

    #[test]
    fn spot_and_mix_routes_differ() {
        assert_eq!(route_for(MarketCategory::Spot).url_field, "url_spot");
        assert_eq!(route_for(MarketCategory::CoinM).url_field, "url_mix");
    }
}
