//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rate limit error: {0}")]
    RateLimit(#[from] ingest_ratelimit::RateLimitError),

    #[error("Cache sink error: {0}")]
    Cache(#[from] ingest_cache::CacheError),

    #[error("Registry error: {0}")]
    Registry(#[from] ingest_registry::RegistryError),

    #[error("Feed error: {0}")]
    Feed(#[from] ingest_feed::FeedError),

    #[error("Health/capability error: {0}")]
    Health(#[from] ingest_health::HealthError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] ingest_telemetry::TelemetryError),

    #[error("Preflight error: {0}")]
    Preflight(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Shutdown requested")]
    Shutdown,
}

pub type AppResult<T> = Result<T, AppError>;
