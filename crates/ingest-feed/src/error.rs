//! Errors surfaced by frame parsing and the upstream session state machine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("parse error: {0}")]
    ParseError(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("socket error: {0}")]
    Socket(String),

    #[error("subscription error: {0}")]
    Subscription(String),

    #[error("idle timeout: no frame for {0:?}")]
    IdleTimeout(std::time::Duration),

    #[error("pong deadline missed")]
    PongMissed,
}

pub type FeedResult<T> = Result<T, FeedError>;
