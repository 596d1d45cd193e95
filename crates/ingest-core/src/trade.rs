//! Trade event type.

use crate::error::CoreError;
use crate::market::{MarketCategory, SymbolId};
use crate::{Price, Size};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which side initiated the trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

impl FromStr for Side {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            other => Err(CoreError::InvalidSide(other.to_string())),
        }
    }
}

/// A single ingested trade.
///
/// Created by the upstream session from a parsed venue frame, passed by
/// value to the cache sink and the fan-out broker, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: SymbolId,
    pub market: MarketCategory,
    pub price: Price,
    pub size: Size,
    pub side: Side,
    /// Timestamp assigned by the venue, UTC, millisecond precision.
    pub source_ts: DateTime<Utc>,
    /// Timestamp taken at frame reception by this process.
    pub ingest_ts: DateTime<Utc>,
}

impl Trade {
    pub fn new(
        symbol: SymbolId,
        market: MarketCategory,
        price: Price,
        size: Size,
        side: Side,
        source_ts: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol,
            market,
            price,
            size,
            side,
            source_ts,
            ingest_ts: Utc::now(),
        }
    }

    pub fn source_ts_ms(&self) -> i64 {
        self.source_ts.timestamp_millis()
    }

    /// Key used to address this trade's append-only stream.
    pub fn stream_key(&self) -> String {
        format!("trades:{}:{}", self.symbol, self.market)
    }

    /// Stream entry id. Derived from the source timestamp alone, per the
    /// venue's `{ts_ms}-0` convention; this can collide across duplicate-
    /// timestamp trades with different price/size, which the dedup key
    /// below (not the entry id) is responsible for guarding against.
    pub fn entry_id(&self) -> String {
        format!("{}-0", self.source_ts_ms())
    }

    /// Hash over (symbol, market, source timestamp, price, size), used as
    /// the dedup key. A second trade observed with the same hash within the
    /// dedup window is dropped as a replay.
    pub fn dedup_hash(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        self.symbol.hash(&mut hasher);
        self.market.hash(&mut hasher);
        self.source_ts_ms().hash(&mut hasher);
        self.price.hash(&mut hasher);
        self.size.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[test]
    fn side_parses_case_insensitively() {
        assert_eq!("BUY".parse::<Side>().unwrap(), Side::Buy);
        assert_eq!("Sell".parse::<Side>().unwrap(), Side::Sell);
        assert!("hold".parse::<Side>().is_err());
    }

    #[test]
    fn stream_key_uses_symbol_and_market() {
        let t = Trade::new(
            SymbolId::new("BTCUSDT"),
            MarketCategory::Spot,
            Price::new(dec!(30000)),
            Size::new(dec!(0.1)),
            Side::Buy,
            Utc::now(),
        );
        assert_eq!(t.stream_key(), "trades:BTCUSDT:spot");
    }

    fn trade_at(ts_ms: i64, price: i64, size: i64) -> Trade {
        Trade::new(
            SymbolId::new("BTCUSDT"),
            MarketCategory::Spot,
            Price::new(Decimal::from(price)),
            Size::new(Decimal::from(size)),
            Side::Buy,
            Utc.timestamp_millis_opt(ts_ms).unwrap(),
        )
    }

    #[test]
    fn entry_id_uses_source_timestamp() {
        let t = trade_at(1700000000000, 30000, 1);
        assert_eq!(t.entry_id(), "1700000000000-0");
    }

    #[test]
    fn dedup_hash_is_stable_for_identical_trades() {
        let a = trade_at(1700000000000, 30000, 1);
        let b = trade_at(1700000000000, 30000, 1);
        assert_eq!(a.dedup_hash(), b.dedup_hash());
    }

    #[test]
    fn dedup_hash_differs_on_price() {
        let a = trade_at(1700000000000, 30000, 1);
        let b = trade_at(1700000000000, 30001, 1);
        assert_ne!(a.dedup_hash(), b.dedup_hash());
    }
}
