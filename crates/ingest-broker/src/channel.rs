//! Per-symbol channel state and the client sessions attached to it.

use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::types::BrokerMessage;

/// A long-lived bidirectional channel to one dashboard consumer, subscribed
/// to one symbol. Removed on first send failure, explicit disconnect, or
/// ping/pong idle timeout.
pub(crate) struct ClientSession {
    pub sender: mpsc::Sender<BrokerMessage>,
    pub last_activity: Instant,
    pub ping_sent_at: Option<Instant>,
}

impl ClientSession {
    pub fn new(sender: mpsc::Sender<BrokerMessage>) -> Self {
        Self {
            sender,
            last_activity: Instant::now(),
            ping_sent_at: None,
        }
    }
}

/// Symbol id -> {set of client sessions, pending-message slot, last-flush
/// timestamp}. An entry exists iff its session set is non-empty; the broker
/// removes the entry as soon as the last session detaches.
pub(crate) struct SymbolChannel {
    pub sessions: HashMap<Uuid, ClientSession>,
    /// At most one in-flight value at a time; overwritten by every
    /// broadcast call regardless of whether it "advances" the debounce
    /// window, so only the latest survives to the next flush.
    pub pending: Option<serde_json::Value>,
    /// When the debounce window last advanced (as opposed to coalesced).
    pub last_accepted: Option<Instant>,
    pub last_flush: Instant,
}

impl SymbolChannel {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            pending: None,
            last_accepted: None,
            last_flush: Instant::now(),
        }
    }
}

impl Default for SymbolChannel {
    fn default() -> Self {
        Self::new()
    }
}
