//! Fan-out broker error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("session {0} is not attached to symbol {1}")]
    NotAttached(uuid::Uuid, String),
}

pub type BrokerResult<T> = Result<T, BrokerError>;
