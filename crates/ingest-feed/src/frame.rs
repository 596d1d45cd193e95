//! Frame classification and parsing for the venue's streaming wire format.
//!
//! Envelopes observed on an upstream session:
//! - `{"event":"subscribe",...}` / `{"event":"error","msg":...}`
//! - `{"action":"update","arg":{instType,channel,instId},"data":[...]}`

use crate::error::FeedError;
use chrono::{DateTime, TimeZone, Utc};
use ingest_core::{BookUpdate, Level, MarketCategory, Price, Side, Size, SymbolId, Trade};
use serde::Deserialize;
use serde_json::Value;

pub const TRADE_CHANNEL: &str = "trade";
pub const BOOK_CHANNEL: &str = "books";

/// A classified, parsed upstream frame.
#[derive(Debug, Clone)]
pub enum FrameEvent {
    /// `{"event":"subscribe",...}` — subscription confirmed.
    SubscribeAck,
    /// `{"event":"error","msg":...}` — non-fatal; reported to C1, doesn't
    /// disconnect unless repeated.
    Error { message: String },
    /// One or more trades parsed from a `trade` channel update.
    Trades(Vec<Trade>),
    /// An order-book update parsed from a `books` channel update (privileged only).
    Book(BookUpdate),
    /// A frame whose channel/instId this session doesn't recognize.
    Unknown,
}

#[derive(Deserialize)]
struct Envelope {
    event: Option<String>,
    msg: Option<String>,
    action: Option<String>,
    arg: Option<ArgField>,
    data: Option<Value>,
}

#[derive(Deserialize)]
struct ArgField {
    #[serde(rename = "instType")]
    #[allow(dead_code)]
    inst_type: Option<String>,
    channel: Option<String>,
    #[serde(rename = "instId")]
    inst_id: Option<String>,
}

/// Parse and classify a single text frame, given the category of this
/// session (needed to strip the venue symbol suffix) and the set of
/// symbols this session's group subscribes to.
pub fn parse_frame(
    text: &str,
    category: MarketCategory,
    known_symbols: &[SymbolId],
) -> Result<FrameEvent, FeedError> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| FeedError::ParseError(e.to_string()))?;

    if let Some(event) = envelope.event.as_deref() {
        return match event {
            "subscribe" => Ok(FrameEvent::SubscribeAck),
            "error" => Ok(FrameEvent::Error {
                message: envelope.msg.unwrap_or_default(),
            }),
            _ => Ok(FrameEvent::Unknown),
        };
    }

    if envelope.action.as_deref() != Some("update") {
        return Ok(FrameEvent::Unknown);
    }

    let arg = envelope
        .arg
        .ok_or_else(|| FeedError::InvalidData("update frame missing arg".into()))?;
    let channel = arg
        .channel
        .ok_or_else(|| FeedError::InvalidData("update frame missing channel".into()))?;
    let inst_id = arg
        .inst_id
        .ok_or_else(|| FeedError::InvalidData("update frame missing instId".into()))?;
    let symbol = SymbolId::from_inst_id(&inst_id, category);

    if !known_symbols.contains(&symbol) {
        return Ok(FrameEvent::Unknown);
    }

    let data = envelope
        .data
        .ok_or_else(|| FeedError::InvalidData("update frame missing data".into()))?;

    match channel.as_str() {
        TRADE_CHANNEL => parse_trades(&data, symbol, category).map(FrameEvent::Trades),
        BOOK_CHANNEL => parse_book(&data, symbol, category).map(FrameEvent::Book),
        _ => Ok(FrameEvent::Unknown),
    }
}

fn parse_trades(
    data: &Value,
    symbol: SymbolId,
    category: MarketCategory,
) -> Result<Vec<Trade>, FeedError> {
    let array = data
        .as_array()
        .ok_or_else(|| FeedError::InvalidData("trade data is not an array".into()))?;

    let mut trades = Vec::with_capacity(array.len());
    for element in array {
        trades.push(parse_trade_tuple(element, symbol.clone(), category)?);
    }
    Ok(trades)
}

fn parse_trade_tuple(
    element: &Value,
    symbol: SymbolId,
    category: MarketCategory,
) -> Result<Trade, FeedError> {
    let tuple = element
        .as_array()
        .ok_or_else(|| FeedError::InvalidData("trade tuple is not an array".into()))?;
    if tuple.len() < 4 {
        return Err(FeedError::InvalidData(format!(
            "trade tuple has {} elements, expected 4",
            tuple.len()
        )));
    }

    let ts_ms = parse_i64(&tuple[0])?;
    let price = parse_decimal_field(&tuple[1])?;
    let size = parse_decimal_field(&tuple[2])?;
    let side_str = tuple[3]
        .as_str()
        .ok_or_else(|| FeedError::InvalidData("trade side is not a string".into()))?;
    let side: Side = side_str
        .parse()
        .map_err(|_| FeedError::InvalidData(format!("unrecognized trade side: {side_str}")))?;

    let source_ts = ms_to_datetime(ts_ms)?;

    Ok(Trade::new(
        symbol,
        category,
        Price::new(price),
        Size::new(size),
        side,
        source_ts,
    ))
}

fn parse_book(
    data: &Value,
    symbol: SymbolId,
    category: MarketCategory,
) -> Result<BookUpdate, FeedError> {
    let entry = data
        .as_array()
        .and_then(|a| a.first())
        .ok_or_else(|| FeedError::InvalidData("book data is empty".into()))?;

    let bids = parse_levels(entry.get("bids"))?;
    let asks = parse_levels(entry.get("asks"))?;
    let snapshot = entry
        .get("snapshot")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let ts_ms = entry
        .get("ts")
        .and_then(|v| v.as_str().and_then(|s| s.parse::<i64>().ok()).or(v.as_i64()))
        .ok_or_else(|| FeedError::InvalidData("book data missing ts".into()))?;

    Ok(BookUpdate::new(
        symbol,
        category,
        bids,
        asks,
        ms_to_datetime(ts_ms)?,
        snapshot,
    ))
}

fn parse_levels(value: Option<&Value>) -> Result<Vec<Level>, FeedError> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let array = value
        .as_array()
        .ok_or_else(|| FeedError::InvalidData("book levels are not an array".into()))?;

    let mut levels = Vec::with_capacity(array.len());
    for element in array {
        let pair = element
            .as_array()
            .ok_or_else(|| FeedError::InvalidData("book level is not an array".into()))?;
        if pair.len() < 2 {
            return Err(FeedError::InvalidData("book level has fewer than 2 fields".into()));
        }
        let price = parse_decimal_field(&pair[0])?;
        let size = parse_decimal_field(&pair[1])?;
        levels.push(Level::new(Price::new(price), Size::new(size)));
    }
    Ok(levels)
}

fn parse_decimal_field(value: &Value) -> Result<rust_decimal::Decimal, FeedError> {
    use std::str::FromStr;
    match value {
        Value::String(s) => rust_decimal::Decimal::from_str(s)
            .map_err(|e| FeedError::InvalidData(format!("bad decimal {s}: {e}"))),
        Value::Number(n) => n
            .as_f64()
            .and_then(|f| rust_decimal::Decimal::try_from(f).ok())
            .ok_or_else(|| FeedError::InvalidData(format!("bad numeric decimal: {n}"))),
        other => Err(FeedError::InvalidData(format!(
            "expected decimal field, got {other}"
        ))),
    }
}

fn parse_i64(value: &Value) -> Result<i64, FeedError> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| FeedError::InvalidData(format!("expected integer timestamp, got {value}")))
}

fn ms_to_datetime(ts_ms: i64) -> Result<DateTime<Utc>, FeedError> {
    Utc.timestamp_millis_opt(ts_ms)
        .single()
        .ok_or_else(|| FeedError::InvalidData(format!("invalid timestamp_ms: {ts_ms}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols() -> Vec<SymbolId> {
        vec![SymbolId::new("BTCUSDT")]
    }

    #[test]
    fn parses_subscribe_ack() {
        let frame = r#"{"event":"subscribe","arg":{}}"#;
        let event = parse_frame(frame, MarketCategory::Spot, &symbols()).unwrap();
        assert!(matches!(event, FrameEvent::SubscribeAck));
    }

    #[test]
    fn parses_error_event_without_tearing_down() {
        let frame = r#"{"event":"error","msg":"invalid channel"}"#;
        let event = parse_frame(frame, MarketCategory::Spot, &symbols()).unwrap();
        match event {
            FrameEvent::Error { message } => assert_eq!(message, "invalid channel"),
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn parses_trade_tuple() {
        let frame = r#"{"action":"update","arg":{"instType":"SP","channel":"trade","instId":"BTCUSDT_SPBL"},"data":[[1700000000000,"30000.0","0.1","buy"]]}"#;
        let event = parse_frame(frame, MarketCategory::Spot, &symbols()).unwrap();
        match event {
            FrameEvent::Trades(trades) => {
                assert_eq!(trades.len(), 1);
                assert_eq!(trades[0].symbol.as_str(), "BTCUSDT");
                assert_eq!(trades[0].source_ts_ms(), 1700000000000);
                assert_eq!(trades[0].side, Side::Buy);
            }
            other => panic!("expected Trades, got {other:?}"),
        }
    }

    #[test]
    fn trade_side_is_case_insensitive() {
        let frame = r#"{"action":"update","arg":{"instType":"SP","channel":"trade","instId":"BTCUSDT_SPBL"},"data":[[1700000000000,"30000.0","0.1","SELL"]]}"#;
        let event = parse_frame(frame, MarketCategory::Spot, &symbols()).unwrap();
        match event {
            FrameEvent::Trades(trades) => assert_eq!(trades[0].side, Side::Sell),
            other => panic!("expected Trades, got {other:?}"),
        }
    }

    #[test]
    fn unknown_symbol_is_dropped_not_errored() {
        let frame = r#"{"action":"update","arg":{"instType":"SP","channel":"trade","instId":"DOGEUSDT_SPBL"},"data":[[1700000000000,"0.1","1","buy"]]}"#;
        let event = parse_frame(frame, MarketCategory::Spot, &symbols()).unwrap();
        assert!(matches!(event, FrameEvent::Unknown));
    }

    #[test]
    fn parses_book_update() {
        let frame = r#"{"action":"update","arg":{"instType":"SP","channel":"books","instId":"BTCUSDT_SPBL"},"data":[{"bids":[["100","1"]],"asks":[["101","2"]],"snapshot":true,"ts":"1700000000000"}]}"#;
        let event = parse_frame(frame, MarketCategory::Spot, &symbols()).unwrap();
        match event {
            FrameEvent::Book(book) => {
                assert!(book.snapshot);
                assert_eq!(book.bids.len(), 1);
                assert_eq!(book.asks.len(), 1);
            }
            other => panic!("expected Book, got {other:?}"),
        }
    }

    #[test]
    fn malformed_trade_tuple_is_rejected() {
        let frame = r#"{"action":"update","arg":{"instType":"SP","channel":"trade","instId":"BTCUSDT_SPBL"},"data":[[1700000000000,"30000.0"]]}"#;
        let result = parse_frame(frame, MarketCategory::Spot, &symbols());
        assert!(result.is_err());
    }
}
