//! Error types for the health supervisor and capability policy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("credential validation failed: {0}")]
    CredentialValidation(String),

    #[error("symbol manager reconcile failed: {0}")]
    Reconcile(String),
}

pub type HealthResult<T> = Result<T, HealthError>;
