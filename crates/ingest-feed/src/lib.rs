//! C6: venue frame parsing and the upstream session state machine.
//!
//! `frame` classifies and parses raw venue text frames into `Trade`s and
//! `BookUpdate`s; `upstream` drives one socket per `SubscriptionGroup`
//! through `Idle -> Connecting -> Subscribing -> Streaming ->
//! (Draining|Reconnecting|Terminated)`, honoring the failover latch and the
//! subscribe-rate bucket.

use std::sync::Once;

pub mod error;
pub mod frame;
pub mod upstream;

pub use error::{FeedError, FeedResult};
pub use frame::{parse_frame, FrameEvent};
pub use upstream::heartbeat::HeartbeatMonitor;
pub use upstream::session::{SessionConfig, SessionEvent, SessionState, UpstreamSession};
pub use upstream::subscription::{build_subscribe_envelope, build_unsubscribe_envelope};

static INIT_CRYPTO: Once = Once::new();

/// Installs the process-wide rustls crypto provider. Idempotent; call once
/// at startup before any TLS connection (upstream sockets, catalog HTTP
/// client, or the control plane) is opened.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
