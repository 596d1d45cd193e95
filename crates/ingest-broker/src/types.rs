//! Outbound message envelope sent down a client session's transport.

use serde::Serialize;
use serde_json::Value;

/// A frame written to a dashboard client's socket. The broker never touches
/// the socket itself; the control-plane WS handler (C10) drains a session's
/// channel and writes each `BrokerMessage` as one text frame.
#[derive(Debug, Clone)]
pub enum BrokerMessage {
    /// One-shot frame sent immediately on `connect`.
    Hello {
        symbol: String,
        server_time_ms: i64,
    },
    /// A batched, debounced market-data payload.
    Data(Value),
    /// Sent when a session has been idle; a missing pong within the
    /// deadline closes the session.
    Ping,
}

impl BrokerMessage {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Hello { symbol, server_time_ms } => serde_json::json!({
                "type": "connection",
                "status": "connected",
                "symbol": symbol,
                "server_time_ms": server_time_ms,
            }),
            Self::Data(v) => v.clone(),
            Self::Ping => serde_json::json!({ "type": "ping" }),
        }
    }
}

/// Read-only snapshot of broker-wide counters, exported as-is by the
/// metrics facade and returned from the control plane's status endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BrokerMetrics {
    pub messages_sent: u64,
    pub messages_queued: u64,
    pub connections_total: u64,
    pub errors_count: u64,
    pub active_symbols: usize,
    pub total_connections: usize,
}
