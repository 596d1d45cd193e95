//! Subscribe-envelope construction for a SubscriptionGroup.
//!
//! One batched envelope is sent once per session, after the socket opens,
//! and resent verbatim on reconnect.

use ingest_core::SubscriptionGroup;
use serde_json::{json, Value};

pub const TRADE_CHANNEL: &str = "trade";
pub const BOOK_CHANNEL: &str = "books";

/// Build the `{"op":"subscribe","args":[...]}` envelope for `group`.
///
/// When `include_book` is set (privileged tier), a 50-level book channel
/// subscription is added alongside the trade channel for every symbol.
pub fn build_subscribe_envelope(group: &SubscriptionGroup, include_book: bool) -> Value {
    build_envelope("subscribe", group, include_book)
}

/// Build the matching `unsubscribe` envelope, used when a group is torn
/// down without killing the whole session (not currently exercised by the
/// session state machine, which always tears down the socket, but kept as
/// a symmetrical counterpart to `build_subscribe_envelope`).
pub fn build_unsubscribe_envelope(group: &SubscriptionGroup, include_book: bool) -> Value {
    build_envelope("unsubscribe", group, include_book)
}

fn build_envelope(op: &str, group: &SubscriptionGroup, include_book: bool) -> Value {
    let inst_type = group.category.inst_type();
    let mut args = Vec::with_capacity(group.symbols.len() * if include_book { 2 } else { 1 });

    for symbol in &group.symbols {
        let inst_id = symbol.to_inst_id(group.category);
        args.push(json!({
            "instType": inst_type,
            "channel": TRADE_CHANNEL,
            "instId": inst_id,
        }));
        if include_book {
            args.push(json!({
                "instType": inst_type,
                "channel": BOOK_CHANNEL,
                "instId": inst_id,
            }));
        }
    }

    json!({ "op": op, "args": args })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_core::{MarketCategory, SymbolId};

    fn group() -> SubscriptionGroup {
        SubscriptionGroup::new(
            "g-spot-0",
            MarketCategory::Spot,
            vec![SymbolId::new("BTCUSDT"), SymbolId::new("ETHUSDT")],
        )
    }

    #[test]
    fn public_tier_subscribes_trade_only() {
        let envelope = build_subscribe_envelope(&group(), false);
        let args = envelope["args"].as_array().unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0]["channel"], "trade");
        assert_eq!(args[0]["instId"], "BTCUSDT_SPBL");
    }

    #[test]
    fn privileged_tier_adds_book_channel_per_symbol() {
        let envelope = build_subscribe_envelope(&group(), true);
        let args = envelope["args"].as_array().unwrap();
        assert_eq!(args.len(), 4);
        assert_eq!(args[1]["channel"], "books");
        assert_eq!(args[1]["instId"], "BTCUSDT_SPBL");
    }

    #[test]
    fn op_field_distinguishes_subscribe_from_unsubscribe() {
        let sub = build_subscribe_envelope(&group(), false);
        let unsub = build_unsubscribe_envelope(&group(), false);
        assert_eq!(sub["op"], "subscribe");
        assert_eq!(unsub["op"], "unsubscribe");
    }
}
