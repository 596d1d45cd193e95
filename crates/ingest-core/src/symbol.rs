//! Symbol metadata, as returned by the catalog oracle (C4).

use crate::market::{MarketCategory, SymbolId};
use crate::{Price, Size};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a symbol on the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolStatus {
    Online,
    Paused,
    Delisted,
}

impl SymbolStatus {
    pub fn is_tradeable(&self) -> bool {
        matches!(self, Self::Online)
    }
}

/// Per-symbol metadata from the catalog oracle.
///
/// Treated as immutable for the lifetime of the current working set;
/// refreshed by C4 on demand (e.g. periodic catalog refresh, or when
/// C5 reconciles the working set after a tier change).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolMeta {
    pub symbol: SymbolId,
    pub market: MarketCategory,
    pub base: String,
    pub quote: String,
    pub status: SymbolStatus,
    pub min_size: Size,
    pub max_size: Size,
    pub size_tick: Size,
    pub price_tick: Price,
    /// 24h notional volume in quote units, used for ranking.
    pub notional_24h: Decimal,
}

impl SymbolMeta {
    pub fn is_tradeable(&self) -> bool {
        self.status.is_tradeable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn meta(notional: Decimal, symbol: &str) -> SymbolMeta {
        SymbolMeta {
            symbol: SymbolId::new(symbol),
            market: MarketCategory::Spot,
            base: "BTC".into(),
            quote: "USDT".into(),
            status: SymbolStatus::Online,
            min_size: Size::new(dec!(0.0001)),
            max_size: Size::new(dec!(1000)),
            size_tick: Size::new(dec!(0.0001)),
            price_tick: Price::new(dec!(0.01)),
            notional_24h: notional,
        }
    }

    #[test]
    fn ranking_tie_break_is_notional_desc_then_symbol_asc() {
        let mut symbols = vec![
            meta(dec!(1_000_000), "ETHUSDT"),
            meta(dec!(2_000_000), "BTCUSDT"),
            meta(dec!(1_000_000), "ADAUSDT"),
        ];
        symbols.sort_by(|a, b| {
            b.notional_24h
                .cmp(&a.notional_24h)
                .then_with(|| a.symbol.as_str().cmp(b.symbol.as_str()))
        });
        let ordered: Vec<&str> = symbols.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(ordered, vec!["BTCUSDT", "ADAUSDT", "ETHUSDT"]);
    }

    #[test]
    fn paused_symbol_is_not_tradeable() {
        let mut m = meta(dec!(1), "XUSDT");
        m.status = SymbolStatus::Paused;
        assert!(!m.is_tradeable());
    }
}
