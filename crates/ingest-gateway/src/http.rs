//! C10: the control plane's axum HTTP/WS router.
//!
//! Every handler is a thin projection over the components it fronts:
//! credential changes go straight to C9, symbol views straight to C5/C4,
//! and `/ws/{symbol}` is upgraded then handed to C7's connect/disconnect.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use ingest_core::{Credentials, MarketCategory, SymbolId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::app::Application;

const MIN_KEY_SECRET_LEN: usize = 10;
const MIN_PASSPHRASE_LEN: usize = 3;
const DEFAULT_TOP_LIMIT: usize = 20;

#[derive(Clone)]
pub struct AppState {
    app: Arc<Application>,
}

impl AppState {
    pub fn new(app: Arc<Application>) -> Self {
        Self { app }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/user/set_bitget_api", post(set_bitget_api))
        .route("/user/reset_bitget_api", delete(reset_bitget_api))
        .route("/user/test_connection", post(test_connection))
        .route("/user/limits", get(user_limits))
        .route("/user/status", get(user_status))
        .route("/symbols/all", get(symbols_all))
        .route("/symbols/top", get(symbols_top))
        .route("/symbols/{symbol}/info", get(symbol_info))
        .route("/ws/{symbol}", get(ws_handler))
        .route("/metrics", get(metrics))
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
enum HandlerError {
    #[error("invalid credentials: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    App(#[from] crate::error::AppError),
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::App(crate::error::AppError::Health(ingest_health::HealthError::CredentialValidation(_))) => {
                StatusCode::BAD_REQUEST
            }
            Self::App(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

type HandlerResult<T> = Result<T, HandlerError>;

#[derive(Debug, Deserialize)]
struct SetBitgetApiRequest {
    api_key: String,
    secret_key: String,
    passphrase: String,
}

#[derive(Debug, Serialize)]
struct CapabilityChangeResponse {
    tier: ingest_core::Tier,
    privileged_activated: bool,
    max_symbols_per_group: usize,
    rate_cap: f64,
    markets: Vec<MarketCategory>,
}

async fn set_bitget_api(
    State(state): State<AppState>,
    Json(req): Json<SetBitgetApiRequest>,
) -> HandlerResult<Json<CapabilityChangeResponse>> {
    if req.api_key.len() < MIN_KEY_SECRET_LEN || req.secret_key.len() < MIN_KEY_SECRET_LEN {
        return Err(HandlerError::InvalidInput(
            "api_key and secret_key must be at least 10 characters".to_string(),
        ));
    }
    if req.passphrase.len() < MIN_PASSPHRASE_LEN {
        return Err(HandlerError::InvalidInput(
            "passphrase must be at least 3 characters".to_string(),
        ));
    }

    let credentials = Credentials::new(req.api_key, req.secret_key, req.passphrase);
    let change = state.app.set_credentials(Some(credentials)).await?;
    Ok(Json(CapabilityChangeResponse {
        tier: change.profile.tier,
        privileged_activated: change.privileged_activated,
        max_symbols_per_group: change.profile.max_symbols_per_group,
        rate_cap: change.profile.rate_cap,
        markets: change.profile.markets.clone(),
    }))
}

async fn reset_bitget_api(
    State(state): State<AppState>,
) -> HandlerResult<Json<CapabilityChangeResponse>> {
    let change = state.app.set_credentials(None).await?;
    Ok(Json(CapabilityChangeResponse {
        tier: change.profile.tier,
        privileged_activated: change.privileged_activated,
        max_symbols_per_group: change.profile.max_symbols_per_group,
        rate_cap: change.profile.rate_cap,
        markets: change.profile.markets.clone(),
    }))
}

#[derive(Debug, Serialize)]
struct TestConnectionResponse {
    symbol_count: usize,
}

async fn test_connection(State(state): State<AppState>) -> HandlerResult<Json<TestConnectionResponse>> {
    let placeholder = Credentials::new("", "", "");
    let count = state
        .app
        .catalog
        .test_connection(&placeholder)
        .await
        .map_err(|e| HandlerError::App(crate::error::AppError::Registry(e)))?;
    Ok(Json(TestConnectionResponse { symbol_count: count }))
}

#[derive(Debug, Serialize)]
struct LimitsResponse {
    tier: ingest_core::Tier,
    rate_cap: f64,
    max_symbols_per_group: usize,
    resolutions_secs: Vec<u32>,
    historical_window_days: u32,
    book_subscriptions_enabled: bool,
}

async fn user_limits(State(state): State<AppState>) -> Json<LimitsResponse> {
    let profile = state.app.capability.current_profile();
    Json(LimitsResponse {
        tier: profile.tier,
        rate_cap: profile.rate_cap,
        max_symbols_per_group: profile.max_symbols_per_group,
        resolutions_secs: profile.resolutions_secs.clone(),
        historical_window_days: profile.historical_window_days,
        book_subscriptions_enabled: profile.book_subscriptions_enabled,
    })
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    health: ingest_health::HealthSnapshot,
    tier: ingest_core::Tier,
    active_subscription_groups: usize,
    broker: ingest_broker::BrokerMetrics,
}

async fn user_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        health: state.app.health_snapshot(),
        tier: state.app.capability.current_tier(),
        active_subscription_groups: state.app.sessions.active_group_count(),
        broker: state.app.broker.metrics(),
    })
}

/// Prometheus text-exposition scrape endpoint. Unauthenticated, read-only,
/// and deliberately outside the `/user`/`/symbols` namespaces so it can be
/// pointed at directly by a scraper config.
async fn metrics() -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        ingest_telemetry::metrics::render(),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct SymbolsAllQuery {
    #[serde(default)]
    market: Option<MarketCategory>,
}

async fn symbols_all(
    State(state): State<AppState>,
    axum::extract::Query(query): axum::extract::Query<SymbolsAllQuery>,
) -> Json<Vec<ingest_core::SymbolMeta>> {
    let markets = match query.market {
        Some(m) => vec![m],
        None => state.app.capability.current_profile().markets.clone(),
    };
    let mut all = Vec::new();
    for market in markets {
        all.extend(state.app.symbol_manager.meta_for(market));
    }
    Json(all)
}

#[derive(Debug, Deserialize)]
struct SymbolsTopQuery {
    #[serde(default)]
    market: Option<MarketCategory>,
    limit: Option<usize>,
}

async fn symbols_top(
    State(state): State<AppState>,
    axum::extract::Query(query): axum::extract::Query<SymbolsTopQuery>,
) -> Json<Vec<ingest_core::SymbolMeta>> {
    let market = query.market.unwrap_or(MarketCategory::Spot);
    let limit = query.limit.unwrap_or(DEFAULT_TOP_LIMIT);
    let mut meta = state.app.symbol_manager.meta_for(market);
    meta.sort_by(|a, b| b.notional_24h.cmp(&a.notional_24h));
    meta.truncate(limit);
    Json(meta)
}

async fn symbol_info(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Response {
    let symbol_id = SymbolId::new(symbol);
    let markets = state.app.capability.current_profile().markets.clone();
    for market in markets {
        if let Some(meta) = state
            .app
            .symbol_manager
            .meta_for(market)
            .into_iter()
            .find(|m| m.symbol == symbol_id)
        {
            return Json(meta).into_response();
        }
    }
    StatusCode::NOT_FOUND.into_response()
}

async fn ws_handler(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let symbol_id = SymbolId::new(symbol);
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, symbol_id))
}

async fn handle_ws_connection(socket: WebSocket, state: AppState, symbol: SymbolId) {
    let (connection_id, mut mailbox) = state.app.broker.connect(symbol.clone());
    info!(symbol = %symbol.as_str(), connection = %connection_id, "client subscribed");

    let (mut sender, mut receiver) = socket.split();

    let broker = state.app.broker.clone();
    let activity_symbol = symbol.clone();
    let mut incoming_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    debug!("client sent close frame");
                    break;
                }
                Ok(Message::Pong(_)) | Ok(Message::Text(_)) => {
                    broker.record_activity(&activity_symbol, connection_id);
                }
                Ok(Message::Ping(_)) | Ok(Message::Binary(_)) => {}
                Err(e) => {
                    debug!(error = %e, "websocket receive error");
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            msg = mailbox.recv() => {
                match msg {
                    Some(msg) => {
                        let text = msg.to_json().to_string();
                        if sender.send(Message::Text(text.into())).await.is_err() {
                            debug!("failed to send to client, disconnected");
                            break;
                        }
                    }
                    None => {
                        warn!(symbol = %symbol.as_str(), "broker mailbox closed session");
                        break;
                    }
                }
            }
            _ = &mut incoming_task => {
                debug!("incoming task completed, closing connection");
                break;
            }
        }
    }

    state.app.broker.disconnect(&symbol, connection_id);
    info!(symbol = %symbol.as_str(), connection = %connection_id, "client disconnected");
}
