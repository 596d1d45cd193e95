//! Process-wide failover latch shared between the health supervisor (writer)
//! and upstream sessions (readers).

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// A single boolean flag, set only by the health supervisor, read by every
/// upstream session before it attempts to (re)connect.
pub struct FailoverLatch {
    active: AtomicBool,
    detail: Mutex<LatchDetail>,
}

struct LatchDetail {
    reason: Option<String>,
    since: Instant,
}

impl Default for FailoverLatch {
    fn default() -> Self {
        Self {
            active: AtomicBool::new(false),
            detail: Mutex::new(LatchDetail {
                reason: None,
                since: Instant::now(),
            }),
        }
    }
}

impl FailoverLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Set the latch. A transition (true<->false) updates `since` and the
    /// recorded reason; re-setting the same value is a no-op on `since`.
    pub fn set(&self, active: bool, reason: impl Into<String>) {
        let previous = self.active.swap(active, Ordering::AcqRel);
        if previous != active {
            let mut detail = self.detail.lock();
            detail.since = Instant::now();
            detail.reason = if active { Some(reason.into()) } else { None };
        }
    }

    pub fn reason(&self) -> Option<String> {
        self.detail.lock().reason.clone()
    }

    pub fn since(&self) -> Instant {
        self.detail.lock().since
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_inactive() {
        let latch = FailoverLatch::new();
        assert!(!latch.is_active());
        assert!(latch.reason().is_none());
    }

    #[test]
    fn set_active_records_reason() {
        let latch = FailoverLatch::new();
        latch.set(true, "cache sink unreachable");
        assert!(latch.is_active());
        assert_eq!(latch.reason().as_deref(), Some("cache sink unreachable"));
    }

    #[test]
    fn clearing_drops_reason() {
        let latch = FailoverLatch::new();
        latch.set(true, "degraded");
        latch.set(false, "");
        assert!(!latch.is_active());
        assert!(latch.reason().is_none());
    }
}
