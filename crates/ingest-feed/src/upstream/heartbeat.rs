//! Application-level heartbeat tracking for one upstream session.
//!
//! The venue expects a ping every 20 s and answers with a pong within 10 s;
//! a missing pong or 60 s of total silence triggers a reconnect.

use tokio::time::{Duration, Instant};

pub const PING_INTERVAL: Duration = Duration::from_secs(20);
pub const PONG_DEADLINE: Duration = Duration::from_secs(10);
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Tracks the last time any frame was received and the state of an
/// in-flight ping, so the session loop can decide when to send a ping and
/// when to give up and reconnect.
pub struct HeartbeatMonitor {
    last_frame_at: Instant,
    ping_sent_at: Option<Instant>,
}

impl HeartbeatMonitor {
    pub fn new() -> Self {
        Self {
            last_frame_at: Instant::now(),
            ping_sent_at: None,
        }
    }

    /// Record that a frame (of any kind, including a pong) was received.
    pub fn record_frame(&mut self) {
        self.last_frame_at = Instant::now();
    }

    /// Record that a pong was received, clearing the in-flight ping.
    pub fn record_pong(&mut self) {
        self.ping_sent_at = None;
        self.record_frame();
    }

    /// Whether it is time to send a new ping (no ping currently in flight
    /// and `PING_INTERVAL` has elapsed since the last frame).
    pub fn should_ping(&self, now: Instant) -> bool {
        self.ping_sent_at.is_none() && now.duration_since(self.last_frame_at) >= PING_INTERVAL
    }

    pub fn record_ping_sent(&mut self) {
        self.ping_sent_at = Some(Instant::now());
    }

    /// Whether the in-flight ping has missed its pong deadline.
    pub fn pong_overdue(&self, now: Instant) -> bool {
        match self.ping_sent_at {
            Some(sent) => now.duration_since(sent) >= PONG_DEADLINE,
            None => false,
        }
    }

    /// Whether the session has gone completely silent for `IDLE_TIMEOUT`.
    pub fn idle_timed_out(&self, now: Instant) -> bool {
        now.duration_since(self.last_frame_at) >= IDLE_TIMEOUT
    }
}

impl Default for HeartbeatMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn pings_after_interval_of_silence() {
        let monitor = HeartbeatMonitor::new();
        assert!(!monitor.should_ping(Instant::now()));
        tokio::time::advance(PING_INTERVAL).await;
        assert!(monitor.should_ping(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_double_ping_while_one_is_in_flight() {
        let mut monitor = HeartbeatMonitor::new();
        tokio::time::advance(PING_INTERVAL).await;
        assert!(monitor.should_ping(Instant::now()));
        monitor.record_ping_sent();
        assert!(!monitor.should_ping(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn pong_overdue_after_deadline() {
        let mut monitor = HeartbeatMonitor::new();
        monitor.record_ping_sent();
        assert!(!monitor.pong_overdue(Instant::now()));
        tokio::time::advance(PONG_DEADLINE).await;
        assert!(monitor.pong_overdue(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn pong_clears_in_flight_ping() {
        let mut monitor = HeartbeatMonitor::new();
        monitor.record_ping_sent();
        monitor.record_pong();
        tokio::time::advance(PONG_DEADLINE).await;
        assert!(!monitor.pong_overdue(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_fires_after_60s_silence() {
        let monitor = HeartbeatMonitor::new();
        assert!(!monitor.idle_timed_out(Instant::now()));
        tokio::time::advance(IDLE_TIMEOUT).await;
        assert!(monitor.idle_timed_out(Instant::now()));
    }
}
