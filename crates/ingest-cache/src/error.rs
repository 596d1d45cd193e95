//! Cache-sink error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("encoding error: {0}")]
    Encoding(String),
}

pub type CacheResult<T> = Result<T, CacheError>;
