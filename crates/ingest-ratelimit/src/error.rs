//! Error types for rate limiting and circuit breaking.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("circuit open: {0}")]
    CircuitOpen(String),

    #[error("invalid rate limit configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, RateLimitError>;
