//! C10 control plane and application wiring for the market-data ingestion
//! pipeline.
//!
//! `app` constructs every component (C1-C9) and drives them; `sessions`
//! reconciles running upstream sessions (C6) against the current working
//! set and capability profile; `http` exposes the axum HTTP/WS surface.

pub mod app;
pub mod config;
pub mod error;
pub mod http;
pub mod sessions;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use http::{create_router, AppState};
