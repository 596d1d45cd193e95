//! Market-data ingestion pipeline: entry point.
//!
//! Loads configuration, wires the application context (C1-C9), and serves
//! the control plane (C10) until ctrl-c.

use anyhow::Result;
use clap::Parser;
use ingest_core::Credentials;
use ingest_gateway::{create_router, AppConfig, AppState, Application};
use std::sync::Arc;
use tracing::info;

/// Market-data ingestion pipeline gateway.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via INGEST_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    ingest_feed::init_crypto();

    let args = Args::parse();
    ingest_telemetry::init_logging()?;

    info!("starting ingestion gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = match args.config.or_else(|| std::env::var("INGEST_CONFIG").ok()) {
        Some(path) => AppConfig::from_file(&path)?,
        None => AppConfig::load()?,
    };
    info!(bind = %config.server.host, port = config.server.port, "configuration loaded");

    let app = Arc::new(Application::new(config.clone()).await?);

    let initial_credentials = Credentials::from_env_values(
        std::env::var("BITGET_API_KEY").ok(),
        std::env::var("BITGET_SECRET_KEY").ok(),
        std::env::var("BITGET_PASSPHRASE").ok(),
    );
    if let Some(credentials) = initial_credentials {
        match app.set_credentials(Some(credentials)).await {
            Ok(change) => info!(tier = ?change.profile.tier, "applied venue credentials from environment"),
            Err(e) => tracing::warn!(error = %e, "venue credentials from environment were rejected, staying on public tier"),
        }
    }

    let state = AppState::new(app.clone());
    let router = create_router(state);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "control plane listening");

    let server_app = app.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "control plane server exited");
        }
        let _ = server_app;
    });

    let run_handle = tokio::spawn(app.clone().run());

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    app.shutdown();

    let _ = run_handle.await;
    server.abort();

    Ok(())
}
