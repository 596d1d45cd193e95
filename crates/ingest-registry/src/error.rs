//! Error types for the catalog oracle client and symbol manager.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("catalog response decode error: {0}")]
    Decode(String),

    #[error("rate limiter rejected call: {0}")]
    CircuitOpen(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
