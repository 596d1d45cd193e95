//! C6 upstream session: heartbeat tracking, subscribe-envelope construction,
//! and the session state machine itself.

pub mod heartbeat;
pub mod session;
pub mod subscription;
