//! C6: one long-lived upstream streaming session for one SubscriptionGroup.
//!
//! `Idle -> Connecting -> Subscribing -> Streaming -> (Draining|Reconnecting|Terminated)`.
//! The session never forwards venue data directly to the cache sink or the
//! fan-out broker; it emits `SessionEvent`s over a channel, and the
//! application context (ingest-gateway) wires those to C3/C7. This keeps
//! ingest-feed free of a dependency on ingest-cache/ingest-broker.

use crate::error::FeedError;
use crate::frame::{parse_frame, FrameEvent};
use crate::upstream::heartbeat::HeartbeatMonitor;
use crate::upstream::subscription::build_subscribe_envelope;
use futures_util::{SinkExt, StreamExt};
use ingest_core::{BookUpdate, FailoverLatch, SubscriptionGroup, Trade};
use ingest_ratelimit::TokenBucket;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(60);
const MAX_CONSECUTIVE_FRAME_ERRORS: u32 = 5;

/// Position in the session's state machine, mirrored out to metrics/health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Subscribing,
    Streaming,
    Draining,
    Reconnecting,
    Terminated,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Subscribing => "subscribing",
            Self::Streaming => "streaming",
            Self::Draining => "draining",
            Self::Reconnecting => "reconnecting",
            Self::Terminated => "terminated",
        };
        write!(f, "{s}")
    }
}

/// Output of the session, consumed by the application context.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(SessionState),
    Trades(Vec<Trade>),
    Book(BookUpdate),
    /// A non-fatal `event:error` frame, or a transient socket/parse error.
    Error { message: String },
}

/// Configuration fixed for the lifetime of one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ws_url: String,
    pub group: SubscriptionGroup,
    /// Whether this session also subscribes to the book channel
    /// (privileged tier only).
    pub privileged: bool,
}

/// One upstream streaming session. Owns no cross-component state beyond the
/// failover latch and its subscribe-rate bucket, both handles into shared
/// application context.
pub struct UpstreamSession {
    config: SessionConfig,
    failover: Arc<FailoverLatch>,
    subscribe_bucket: Arc<TokenBucket>,
    events: mpsc::Sender<SessionEvent>,
    stop: watch::Receiver<bool>,
}

impl UpstreamSession {
    pub fn new(
        config: SessionConfig,
        failover: Arc<FailoverLatch>,
        subscribe_bucket: Arc<TokenBucket>,
        events: mpsc::Sender<SessionEvent>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            failover,
            subscribe_bucket,
            events,
            stop,
        }
    }

    fn stopping(&self) -> bool {
        *self.stop.borrow()
    }

    async fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event).await;
    }

    async fn emit_state(&self, state: SessionState) {
        debug!(group = %self.config.group.id, state = %state, "session state transition");
        self.emit(SessionEvent::StateChanged(state)).await;
    }

    /// Drive the session until `stop` is signalled. Never returns an error:
    /// all transient failures are absorbed into the Reconnecting state.
    pub async fn run(mut self) {
        let mut attempt: u32 = 0;

        loop {
            if self.stopping() {
                self.emit_state(SessionState::Terminated).await;
                return;
            }

            self.emit_state(SessionState::Idle).await;

            if self.failover.is_active() {
                if self.wait_for_failover_clear_or_stop().await {
                    self.emit_state(SessionState::Terminated).await;
                    return;
                }
                continue;
            }

            self.emit_state(SessionState::Connecting).await;

            match self.connect_and_stream().await {
                StreamOutcome::Stopped => {
                    self.emit_state(SessionState::Terminated).await;
                    return;
                }
                StreamOutcome::Failed(reason, reached_streaming) => {
                    self.emit(SessionEvent::Error { message: reason }).await;
                    self.emit_state(SessionState::Reconnecting).await;
                    if reached_streaming {
                        attempt = 0;
                    }
                    let backoff =
                        Duration::from_secs(2u64.saturating_pow(attempt)).min(MAX_RECONNECT_BACKOFF);
                    attempt = attempt.saturating_add(1);
                    if self.sleep_or_stop(backoff).await {
                        self.emit_state(SessionState::Terminated).await;
                        return;
                    }
                }
            }
        }
    }

    /// Wait until the failover latch clears, or `stop` fires. Returns
    /// `true` if the session should terminate.
    async fn wait_for_failover_clear_or_stop(&mut self) -> bool {
        loop {
            if self.stopping() {
                return true;
            }
            if !self.failover.is_active() {
                return false;
            }
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(500)) => {}
                _ = self.stop.changed() => {}
            }
        }
    }

    async fn sleep_or_stop(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.stopping(),
            _ = self.stop.changed() => true,
        }
    }

    async fn connect_and_stream(&mut self) -> StreamOutcome {
        let (ws_stream, _response) = match tokio_tungstenite::connect_async(&self.config.ws_url).await
        {
            Ok(pair) => pair,
            Err(e) => return StreamOutcome::Failed(format!("connect failed: {e}"), false),
        };
        let (mut write, mut read) = ws_stream.split();

        self.subscribe_bucket.acquire().await;
        let envelope = build_subscribe_envelope(&self.config.group, self.config.privileged);
        if let Err(e) = write.send(Message::Text(envelope.to_string().into())).await {
            self.subscribe_bucket.report_error(&e.to_string());
            return StreamOutcome::Failed(format!("subscribe send failed: {e}"), false);
        }
        self.subscribe_bucket.report_success();
        self.emit_state(SessionState::Subscribing).await;

        let mut heartbeat = HeartbeatMonitor::new();
        let mut subscribed = false;
        let mut consecutive_frame_errors: u32 = 0;
        let mut tick = tokio::time::interval(Duration::from_secs(1));

        loop {
            if self.stopping() {
                self.emit_state(SessionState::Draining).await;
                let _ = tokio::time::timeout(Duration::from_secs(10), write.close()).await;
                return StreamOutcome::Stopped;
            }

            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            heartbeat.record_frame();
                            match parse_frame(&text, self.config.group.category, &self.config.group.symbols) {
                                Ok(FrameEvent::SubscribeAck) => {
                                    if !subscribed {
                                        subscribed = true;
                                        self.emit_state(SessionState::Streaming).await;
                                        info!(group = %self.config.group.id, "subscriptions confirmed");
                                    }
                                }
                                Ok(FrameEvent::Error { message }) => {
                                    consecutive_frame_errors += 1;
                                    self.emit(SessionEvent::Error { message }).await;
                                    if consecutive_frame_errors >= MAX_CONSECUTIVE_FRAME_ERRORS {
                                        return StreamOutcome::Failed(
                                            "repeated upstream error frames".into(),
                                            subscribed,
                                        );
                                    }
                                }
                                Ok(FrameEvent::Trades(trades)) => {
                                    consecutive_frame_errors = 0;
                                    if !trades.is_empty() {
                                        self.emit(SessionEvent::Trades(trades)).await;
                                    }
                                }
                                Ok(FrameEvent::Book(book)) => {
                                    consecutive_frame_errors = 0;
                                    if self.config.privileged {
                                        self.emit(SessionEvent::Book(book)).await;
                                    }
                                }
                                Ok(FrameEvent::Unknown) => {}
                                Err(FeedError::ParseError(msg)) | Err(FeedError::InvalidData(msg)) => {
                                    warn!(group = %self.config.group.id, error = %msg, "dropping malformed frame");
                                }
                                Err(other) => {
                                    return StreamOutcome::Failed(other.to_string(), subscribed);
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            heartbeat.record_frame();
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            heartbeat.record_pong();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                            return StreamOutcome::Failed(format!("socket closed: {reason}"), subscribed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return StreamOutcome::Failed(format!("socket error: {e}"), subscribed)
                        }
                        None => return StreamOutcome::Failed("socket stream ended".into(), subscribed),
                    }
                }
                _ = tick.tick() => {
                    let now = Instant::now();
                    if heartbeat.idle_timed_out(now) {
                        return StreamOutcome::Failed("idle timeout: no frame for 60s".into(), subscribed);
                    }
                    if heartbeat.pong_overdue(now) {
                        return StreamOutcome::Failed("pong deadline missed".into(), subscribed);
                    }
                    if heartbeat.should_ping(now) {
                        if let Err(e) = write.send(Message::Ping(Vec::new().into())).await {
                            return StreamOutcome::Failed(format!("ping send failed: {e}"), subscribed);
                        }
                        heartbeat.record_ping_sent();
                    }
                }
            }
        }
    }
}

enum StreamOutcome {
    Stopped,
    /// Carries whether the session reached `Streaming` before failing, so
    /// the reconnect backoff can reset instead of keeping a stale `attempt`
    /// count from before the session last streamed successfully.
    Failed(String, bool),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_state_display() {
        assert_eq!(SessionState::Streaming.to_string(), "streaming");
        assert_eq!(SessionState::Reconnecting.to_string(), "reconnecting");
    }

    #[test]
    fn backoff_sequence_caps_at_60s() {
        let backoffs: Vec<u64> = (0..8)
            .map(|attempt| 2u64.saturating_pow(attempt).min(60))
            .collect();
        assert_eq!(backoffs, vec![1, 2, 4, 8, 16, 32, 60, 60]);
    }

    /// Mirrors `run()`'s reconnect loop bookkeeping: `attempt` climbs across
    /// consecutive failures that never reach `Streaming`, then resets the
    /// instant one does, so a later failure backs off from 1s again instead
    /// of starting at the accumulated exponent.
    #[test]
    fn attempt_resets_after_reaching_streaming() {
        let mut attempt: u32 = 0;
        let outcomes = [
            StreamOutcome::Failed("connect failed".into(), false),
            StreamOutcome::Failed("connect failed".into(), false),
            StreamOutcome::Failed("idle timeout".into(), true),
        ];
        let mut backoffs = Vec::new();
        for outcome in outcomes {
            if let StreamOutcome::Failed(_, reached_streaming) = outcome {
                if reached_streaming {
                    attempt = 0;
                }
                backoffs.push(2u64.saturating_pow(attempt).min(60));
                attempt = attempt.saturating_add(1);
            }
        }
        assert_eq!(backoffs, vec![1, 2, 1]);
    }
}
