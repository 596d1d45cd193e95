//! C7 fan-out broker.
//!
//! Holds one [`channel::SymbolChannel`] per symbol with at least one
//! attached dashboard session. Upstream data (C6, via the application
//! context) calls [`FanOutBroker::broadcast`] once per trade/book update;
//! a background flusher coalesces bursts inside a debounce window and
//! delivers only the latest value per symbol on every batch tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use ingest_core::SymbolId;
use ingest_telemetry::Metrics;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::channel::{ClientSession, SymbolChannel};
use crate::types::{BrokerMessage, BrokerMetrics};

/// Idle threshold before a session is proactively pinged.
const IDLE_PING_THRESHOLD: Duration = Duration::from_secs(15);
/// Total idle time (no frame and no pong) before a session is reaped.
const SESSION_TIMEOUT: Duration = Duration::from_secs(30);
/// Depth of each session's outbound mailbox.
const SESSION_MAILBOX: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct FanOutBrokerConfig {
    /// Default debounce window applied when a caller passes `None`.
    pub debounce_ms: u64,
    /// Flusher tick interval; each tick sends at most one message per
    /// symbol to every attached session.
    pub batch_interval_ms: u64,
}

impl Default for FanOutBrokerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 25,
            batch_interval_ms: 50,
        }
    }
}

#[derive(Default)]
struct BrokerCounters {
    messages_sent: AtomicU64,
    messages_queued: AtomicU64,
    connections_total: AtomicU64,
    errors_count: AtomicU64,
}

pub struct FanOutBroker {
    channels: DashMap<SymbolId, SymbolChannel>,
    config: FanOutBrokerConfig,
    counters: BrokerCounters,
}

impl FanOutBroker {
    pub fn new(config: FanOutBrokerConfig) -> Self {
        Self {
            channels: DashMap::new(),
            config,
            counters: BrokerCounters::default(),
        }
    }

    /// Attaches a new dashboard session to `symbol` and immediately queues a
    /// `Hello` frame. Returns the session id used for `disconnect` and
    /// `record_activity`, plus the receiving half of its mailbox.
    pub fn connect(&self, symbol: SymbolId) -> (Uuid, mpsc::Receiver<BrokerMessage>) {
        let (tx, rx) = mpsc::channel(SESSION_MAILBOX);
        let id = Uuid::new_v4();
        {
            let mut entry = self.channels.entry(symbol.clone()).or_default();
            entry.sessions.insert(id, ClientSession::new(tx.clone()));
        }
        self.counters.connections_total.fetch_add(1, Ordering::Relaxed);
        Metrics::broker_connections_set(self.metrics().total_connections as i64);
        let server_time_ms = chrono::Utc::now().timestamp_millis();
        let _ = tx.try_send(BrokerMessage::Hello {
            symbol: symbol.as_str().to_string(),
            server_time_ms,
        });
        (id, rx)
    }

    /// Detaches a session. Drops the symbol's channel entirely once its
    /// last session is gone, preserving the "entry exists iff non-empty"
    /// invariant.
    pub fn disconnect(&self, symbol: &SymbolId, id: Uuid) {
        let mut drop_entry = false;
        if let Some(mut entry) = self.channels.get_mut(symbol) {
            entry.sessions.remove(&id);
            drop_entry = entry.sessions.is_empty();
        }
        if drop_entry {
            self.channels.remove(symbol);
        }
        Metrics::broker_connections_set(self.metrics().total_connections as i64);
    }

    /// Marks `id` as recently active, clearing any outstanding ping. The
    /// control plane calls this on every inbound frame or pong from the
    /// client transport.
    pub fn record_activity(&self, symbol: &SymbolId, id: Uuid) {
        if let Some(mut entry) = self.channels.get_mut(symbol) {
            if let Some(session) = entry.sessions.get_mut(&id) {
                session.last_activity = Instant::now();
                session.ping_sent_at = None;
            }
        }
    }

    /// Enqueues `message` for `symbol`. A no-op if no session is currently
    /// subscribed, since a channel entry never exists without sessions.
    ///
    /// Coalescing: the pending slot is always overwritten with the latest
    /// value. The debounce window only governs whether `last_accepted`
    /// advances; while a message arrives within `debounce_ms` of the last
    /// advance, it is treated as coalesced into the same batch. Passing
    /// `debounce_ms == 0` disables the window (every call advances) but the
    /// single-pending-slot invariant still applies, so bursts are still
    /// delivered at the flusher's cadence rather than one send per call.
    pub fn broadcast(&self, symbol: &SymbolId, message: Value, debounce_ms: Option<u64>) {
        let debounce_ms = debounce_ms.unwrap_or(self.config.debounce_ms);
        let Some(mut entry) = self.channels.get_mut(symbol) else {
            return;
        };
        let now = Instant::now();
        let advances = debounce_ms == 0
            || entry
                .last_accepted
                .map_or(true, |t| now.duration_since(t) >= Duration::from_millis(debounce_ms));
        entry.pending = Some(message);
        if advances {
            entry.last_accepted = Some(now);
        }
        drop(entry);
        self.counters.messages_queued.fetch_add(1, Ordering::Relaxed);
        Metrics::broker_message_queued(symbol.as_str());
    }

    pub fn metrics(&self) -> BrokerMetrics {
        let total_connections: usize = self.channels.iter().map(|e| e.sessions.len()).sum();
        BrokerMetrics {
            messages_sent: self.counters.messages_sent.load(Ordering::Relaxed),
            messages_queued: self.counters.messages_queued.load(Ordering::Relaxed),
            connections_total: self.counters.connections_total.load(Ordering::Relaxed),
            errors_count: self.counters.errors_count.load(Ordering::Relaxed),
            active_symbols: self.channels.len(),
            total_connections,
        }
    }

    /// One flusher tick: drains the pending slot of every symbol channel and
    /// delivers it to all attached sessions, reaping any whose mailbox has
    /// closed.
    pub async fn flush_once(&self) {
        let symbols: Vec<SymbolId> = self.channels.iter().map(|e| e.key().clone()).collect();
        for symbol in symbols {
            let snapshot = {
                let Some(mut entry) = self.channels.get_mut(&symbol) else {
                    continue;
                };
                let pending = entry.pending.take();
                entry.last_flush = Instant::now();
                let sessions: Vec<(Uuid, mpsc::Sender<BrokerMessage>)> = entry
                    .sessions
                    .iter()
                    .map(|(id, s)| (*id, s.sender.clone()))
                    .collect();
                (pending, sessions)
            };
            let Some(value) = snapshot.0 else {
                continue;
            };
            let mut dead = Vec::new();
            for (id, sender) in snapshot.1 {
                if sender.send(BrokerMessage::Data(value.clone())).await.is_err() {
                    dead.push(id);
                } else {
                    self.counters.messages_sent.fetch_add(1, Ordering::Relaxed);
                    Metrics::broker_message_sent(symbol.as_str());
                }
            }
            if !dead.is_empty() {
                self.counters.errors_count.fetch_add(dead.len() as u64, Ordering::Relaxed);
                for _ in &dead {
                    Metrics::broker_error("send_failed");
                }
                self.reap(&symbol, &dead);
                Metrics::broker_connections_set(self.metrics().total_connections as i64);
            }
        }
    }

    /// One idle sweep: pings sessions that have gone quiet past
    /// `IDLE_PING_THRESHOLD` and reaps ones that have exceeded
    /// `SESSION_TIMEOUT` without a frame or pong.
    pub async fn sweep_idle(&self) {
        let symbols: Vec<SymbolId> = self.channels.iter().map(|e| e.key().clone()).collect();
        for symbol in symbols {
            let now = Instant::now();
            let (to_ping, mut to_close): (Vec<(Uuid, mpsc::Sender<BrokerMessage>)>, Vec<Uuid>) = {
                let Some(entry) = self.channels.get(&symbol) else {
                    continue;
                };
                let mut ping = Vec::new();
                let mut close = Vec::new();
                for (id, session) in entry.sessions.iter() {
                    let idle = now.duration_since(session.last_activity);
                    if idle >= SESSION_TIMEOUT {
                        close.push(*id);
                    } else if idle >= IDLE_PING_THRESHOLD && session.ping_sent_at.is_none() {
                        ping.push((*id, session.sender.clone()));
                    }
                }
                (ping, close)
            };

            let mut failed = Vec::new();
            for (id, sender) in &to_ping {
                if sender.send(BrokerMessage::Ping).await.is_err() {
                    failed.push(*id);
                }
            }
            if let Some(mut entry) = self.channels.get_mut(&symbol) {
                for (id, _) in to_ping.iter().filter(|(id, _)| !failed.contains(id)) {
                    if let Some(session) = entry.sessions.get_mut(id) {
                        session.ping_sent_at = Some(now);
                    }
                }
            }
            to_close.extend(failed);
            if !to_close.is_empty() {
                self.reap(&symbol, &to_close);
                Metrics::broker_connections_set(self.metrics().total_connections as i64);
            }
        }
    }

    fn reap(&self, symbol: &SymbolId, ids: &[Uuid]) {
        let mut drop_entry = false;
        if let Some(mut entry) = self.channels.get_mut(symbol) {
            for id in ids {
                entry.sessions.remove(id);
            }
            drop_entry = entry.sessions.is_empty();
        }
        if drop_entry {
            self.channels.remove(symbol);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(s: &str) -> SymbolId {
        SymbolId::new(s)
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_dropped() {
        let broker = FanOutBroker::new(FanOutBrokerConfig::default());
        broker.broadcast(&sym("BTCUSDT"), serde_json::json!({"p": 1}), None);
        assert_eq!(broker.metrics().messages_queued, 0);
        assert_eq!(broker.metrics().active_symbols, 0);
    }

    #[tokio::test]
    async fn connect_sends_hello_and_tracks_counts() {
        let broker = FanOutBroker::new(FanOutBrokerConfig::default());
        let (id, mut rx) = broker.connect(sym("BTCUSDT"));
        let msg = rx.recv().await.unwrap();
        assert!(matches!(msg, BrokerMessage::Hello { .. }));
        let m = broker.metrics();
        assert_eq!(m.connections_total, 1);
        assert_eq!(m.total_connections, 1);
        assert_eq!(m.active_symbols, 1);
        broker.disconnect(&sym("BTCUSDT"), id);
        assert_eq!(broker.metrics().active_symbols, 0);
    }

    #[tokio::test]
    async fn debounced_bursts_coalesce_to_latest() {
        let broker = FanOutBroker::new(FanOutBrokerConfig {
            debounce_ms: 25,
            batch_interval_ms: 50,
        });
        let (_, mut rx) = broker.connect(sym("BTCUSDT"));
        rx.recv().await.unwrap(); // drain Hello

        broker.broadcast(&sym("BTCUSDT"), serde_json::json!({"seq": 1}), None);
        broker.broadcast(&sym("BTCUSDT"), serde_json::json!({"seq": 2}), None);
        broker.broadcast(&sym("BTCUSDT"), serde_json::json!({"seq": 3}), None);
        assert_eq!(broker.metrics().messages_queued, 3);

        broker.flush_once().await;
        let delivered = rx.recv().await.unwrap();
        match delivered {
            BrokerMessage::Data(v) => assert_eq!(v["seq"], 3),
            _ => panic!("expected coalesced data frame"),
        }
        assert_eq!(broker.metrics().messages_sent, 1);
    }

    #[tokio::test]
    async fn send_failure_reaps_session() {
        let broker = FanOutBroker::new(FanOutBrokerConfig::default());
        let (id, rx) = broker.connect(sym("ETHUSDT"));
        drop(rx); // close the mailbox so the next send fails
        broker.broadcast(&sym("ETHUSDT"), serde_json::json!({"p": 1}), None);
        broker.flush_once().await;
        assert_eq!(broker.metrics().active_symbols, 0);
        // disconnect on an already-reaped session is a harmless no-op
        broker.disconnect(&sym("ETHUSDT"), id);
    }
}
