//! Prometheus metrics and structured logging for the ingestion pipeline.
//!
//! Provides observability from day one: per-component Prometheus metrics
//! and structured logging with `tracing`, switching between pretty and
//! JSON output based on `RUST_ENV`.

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
