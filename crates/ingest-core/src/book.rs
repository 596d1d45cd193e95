//! Order-book update type (privileged-tier only).

use crate::market::{MarketCategory, SymbolId};
use crate::{Price, Size};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum depth carried per side.
pub const BOOK_DEPTH: usize = 50;

/// A single price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub price: Price,
    pub size: Size,
}

impl Level {
    pub fn new(price: Price, size: Size) -> Self {
        Self { price, size }
    }
}

/// A snapshot or incremental order-book update.
///
/// Superseded by subsequent updates; the cache sink retains only the
/// latest value per (symbol, market) with a short TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookUpdate {
    pub symbol: SymbolId,
    pub market: MarketCategory,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    pub source_ts: DateTime<Utc>,
    pub snapshot: bool,
}

impl BookUpdate {
    pub fn new(
        symbol: SymbolId,
        market: MarketCategory,
        mut bids: Vec<Level>,
        mut asks: Vec<Level>,
        source_ts: DateTime<Utc>,
        snapshot: bool,
    ) -> Self {
        bids.truncate(BOOK_DEPTH);
        asks.truncate(BOOK_DEPTH);
        Self {
            symbol,
            market,
            bids,
            asks,
            source_ts,
            snapshot,
        }
    }

    /// Key used to address this book's latest-value cache entry.
    pub fn cache_key(&self) -> String {
        format!("orderbook:{}:{}", self.symbol, self.market)
    }

    pub fn best_bid(&self) -> Option<Level> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<Level> {
        self.asks.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn level(p: i64, s: i64) -> Level {
        Level::new(Price::new(dec!(1) * rust_decimal::Decimal::from(p)), Size::new(dec!(1) * rust_decimal::Decimal::from(s)))
    }

    #[test]
    fn truncates_to_book_depth() {
        let bids: Vec<Level> = (0..200).map(|i| level(i, 1)).collect();
        let update = BookUpdate::new(
            SymbolId::new("BTCUSDT"),
            MarketCategory::UsdtM,
            bids,
            vec![],
            Utc::now(),
            true,
        );
        assert_eq!(update.bids.len(), BOOK_DEPTH);
    }

    #[test]
    fn cache_key_uses_symbol_and_market() {
        let update = BookUpdate::new(
            SymbolId::new("ETHUSDT"),
            MarketCategory::CoinM,
            vec![],
            vec![],
            Utc::now(),
            false,
        );
        assert_eq!(update.cache_key(), "orderbook:ETHUSDT:coinm");
    }
}
