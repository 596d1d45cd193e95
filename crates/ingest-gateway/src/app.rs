//! The application context: constructs every component (C1-C9), wires their
//! event channels together, and drives them until shutdown.

use std::sync::Arc;

use ingest_broker::{run_flusher, run_idle_sweeper, FanOutBroker, FanOutBrokerConfig};
use ingest_cache::{SinkConfig, StreamSink};
use ingest_core::{Credentials, FailoverLatch, MarketCategory, Trade};
use ingest_feed::SessionEvent;
use ingest_health::{
    as_liveness_probe, AnalyticalStoreProbe, CapabilityChange, CapabilityPolicy, HealthSnapshot,
    HealthSupervisor, HttpAnalyticalProbe,
};
use ingest_ratelimit::{CircuitBreaker, CircuitConfig, TokenBucket};
use ingest_registry::{CatalogClient, SymbolEvent, SymbolManager, SymbolManagerConfig};
use ingest_telemetry::Metrics;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::sessions::SessionManager;

const EVENT_MAILBOX: usize = 1024;
const CATALOG_BASE_RATE: f64 = 8.0;
const CATALOG_BURST: f64 = 4.0;
const SUBSCRIBE_BASE_RATE: f64 = 8.0;
const SUBSCRIBE_BURST: f64 = 4.0;

/// Markets the symbol manager is seeded with before any capability
/// profile has been established; narrowed to public tier's markets since
/// `run()` always reconciles to public tier immediately on startup.
const INITIAL_MARKETS: [MarketCategory; 2] = [MarketCategory::Spot, MarketCategory::UsdtM];

/// Owns every component and the background tasks that drive them.
/// Constructed once in `main`, shared as an `Arc` with the HTTP control
/// plane.
pub struct Application {
    pub config: AppConfig,
    pub cache: Arc<StreamSink>,
    pub catalog: Arc<CatalogClient>,
    pub symbol_manager: Arc<SymbolManager>,
    pub broker: Arc<FanOutBroker>,
    pub failover: Arc<FailoverLatch>,
    pub health: Arc<HealthSupervisor>,
    pub capability: Arc<CapabilityPolicy>,
    pub sessions: Arc<SessionManager>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Application {
    pub async fn new(config: AppConfig) -> AppResult<Self> {
        let cache = Arc::new(
            StreamSink::connect(
                &config.redis.url(),
                SinkConfig {
                    dedup_window: std::time::Duration::from_secs(config.redis.dedup_window_secs),
                    orderbook_ttl: std::time::Duration::from_secs(config.redis.orderbook_ttl_secs),
                    stream_maxlen: config.redis.stream_maxlen,
                    pool_size: config.redis.pool_size,
                },
            )
            .await?,
        );

        let catalog_bucket = Arc::new(TokenBucket::new("catalog-oracle", CATALOG_BASE_RATE, CATALOG_BURST));
        let catalog_breaker = Arc::new(CircuitBreaker::new("catalog-oracle", CircuitConfig::default()));
        let catalog = Arc::new(CatalogClient::new(
            config.venue.rest_base_url.clone(),
            catalog_bucket.clone(),
            catalog_breaker,
        ));

        let subscribe_bucket = Arc::new(TokenBucket::new(
            "upstream-subscribe",
            SUBSCRIBE_BASE_RATE,
            SUBSCRIBE_BURST,
        ));

        let (symbol_events_tx, symbol_events_rx) = mpsc::channel::<SymbolEvent>(EVENT_MAILBOX);
        let symbol_manager = Arc::new(SymbolManager::new(
            catalog.clone(),
            SymbolManagerConfig {
                max_symbols_per_market: config.symbols.max_symbols_per_market,
                min_volume_24h: Decimal::from(config.symbols.min_volume_24h),
            },
            symbol_events_tx,
        ));
        symbol_manager.initialize(&INITIAL_MARKETS).await?;

        let broker = Arc::new(FanOutBroker::new(FanOutBrokerConfig {
            debounce_ms: config.broker.debounce_ms,
            batch_interval_ms: config.broker.batch_interval_ms,
        }));

        let failover = Arc::new(FailoverLatch::new());

        let analytical_probe: Option<Arc<dyn AnalyticalStoreProbe>> =
            match &config.analytical_store.host {
                Some(host) => Some(Arc::new(HttpAnalyticalProbe::new(format!(
                    "http://{host}:{}",
                    config.analytical_store.port
                )))),
                None => None,
            };
        let health = Arc::new(HealthSupervisor::new(
            cache.clone(),
            catalog.clone(),
            failover.clone(),
            analytical_probe.map(as_liveness_probe),
        ));
        health.register_bucket(catalog_bucket.clone());
        health.register_bucket(subscribe_bucket.clone());

        let (capability_tx, capability_rx) = mpsc::channel::<CapabilityChange>(EVENT_MAILBOX);
        let capability = Arc::new(CapabilityPolicy::new(
            catalog.clone(),
            symbol_manager.clone(),
            vec![catalog_bucket, subscribe_bucket.clone()],
            capability_tx,
        ));

        let (session_events_tx, session_events_rx) = mpsc::channel::<SessionEvent>(EVENT_MAILBOX);
        let sessions = Arc::new(SessionManager::new(
            config.venue.clone(),
            failover.clone(),
            subscribe_bucket.clone(),
            session_events_tx,
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let app = Self {
            config,
            cache,
            catalog,
            symbol_manager,
            broker,
            failover,
            health,
            capability,
            sessions,
            shutdown_tx,
            shutdown_rx,
        };

        app.spawn_event_loops(session_events_rx, symbol_events_rx, capability_rx, subscribe_bucket);
        Ok(app)
    }

    /// Spawns the three event-consuming loops. Kept separate from `new` so
    /// construction and wiring stay easy to read top to bottom.
    fn spawn_event_loops(
        &self,
        mut session_events: mpsc::Receiver<SessionEvent>,
        mut symbol_events: mpsc::Receiver<SymbolEvent>,
        mut capability_changes: mpsc::Receiver<CapabilityChange>,
        subscribe_bucket: Arc<TokenBucket>,
    ) {
        let cache = self.cache.clone();
        let broker = self.broker.clone();
        let mut shutdown = self.shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = session_events.recv() => {
                        match event {
                            Some(event) => handle_session_event(&cache, &broker, &subscribe_bucket, event).await,
                            None => return,
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() { return; }
                    }
                }
            }
        });

        let mut shutdown = self.shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = symbol_events.recv() => {
                        match event {
                            Some(SymbolEvent::Activated(key)) => {
                                info!(symbol = %key.symbol.as_str(), market = %key.category.slug(), "symbol activated");
                            }
                            Some(SymbolEvent::Deactivated(key)) => {
                                info!(symbol = %key.symbol.as_str(), market = %key.category.slug(), "symbol deactivated");
                            }
                            None => return,
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() { return; }
                    }
                }
            }
        });

        let sessions = self.sessions.clone();
        let symbol_manager = self.symbol_manager.clone();
        let mut shutdown = self.shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    change = capability_changes.recv() => {
                        match change {
                            Some(change) => {
                                for market in &change.profile.markets {
                                    Metrics::working_set_size(
                                        market.slug(),
                                        symbol_manager.symbols_for(*market).len() as i64,
                                    );
                                }
                                sessions.reconcile(&symbol_manager, change.profile).await;
                            }
                            None => return,
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() { return; }
                    }
                }
            }
        });
    }

    /// Runs the application in the foreground: background tasks (flusher,
    /// idle sweeper, health supervisor) plus an initial reconcile to public
    /// tier, until `shutdown()` is called.
    pub async fn run(self: Arc<Self>) -> AppResult<()> {
        let flusher = tokio::spawn(run_flusher(
            self.broker.clone(),
            self.config.broker.batch_interval_ms,
            self.shutdown_rx.clone(),
        ));
        let sweeper = tokio::spawn(run_idle_sweeper(self.broker.clone(), self.shutdown_rx.clone()));
        let health_task: JoinHandle<()> = tokio::spawn(self.health.clone().run(self.shutdown_rx.clone()));

        if let Err(e) = self.capability.reset_to_public().await {
            error!(error = %e, "initial public-tier reconcile failed");
        }

        let mut shutdown = self.shutdown_rx.clone();
        shutdown.changed().await.ok();

        self.sessions.stop_all().await;
        let _ = tokio::join!(flusher, sweeper, health_task);
        Ok(())
    }

    /// Signals every background task to stop and returns once `run` would
    /// exit. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Applies a new credential triple, rescaling rate buckets and the
    /// working set. See [`CapabilityPolicy::reconfigure`].
    pub async fn set_credentials(
        &self,
        credentials: Option<Credentials>,
    ) -> AppResult<CapabilityChange> {
        self.capability
            .reconfigure(credentials)
            .await
            .map_err(AppError::from)
    }

    pub fn health_snapshot(&self) -> HealthSnapshot {
        self.health.snapshot()
    }
}

async fn handle_session_event(
    cache: &Arc<StreamSink>,
    broker: &Arc<FanOutBroker>,
    subscribe_bucket: &Arc<TokenBucket>,
    event: SessionEvent,
) {
    match event {
        SessionEvent::Trades(trades) => {
            for trade in trades {
                publish_trade(cache, broker, trade).await;
            }
        }
        SessionEvent::Book(book) => match cache.put_book(&book).await {
            Ok(()) => {
                Metrics::book_update(book.market.slug());
            }
            Err(e) => warn!(error = %e, "failed to cache book update"),
        },
        SessionEvent::StateChanged(state) => {
            Metrics::upstream_session_state("default", &state.to_string());
        }
        SessionEvent::Error { message } => {
            warn!(error = %message, "upstream session error");
            subscribe_bucket.report_error(&message);
        }
    }
}

async fn publish_trade(cache: &Arc<StreamSink>, broker: &Arc<FanOutBroker>, trade: Trade) {
    match cache.publish_trade(&trade).await {
        Ok(true) => {
            Metrics::trade_published(trade.market.slug());
            let payload = serde_json::json!({
                "type": "trade",
                "symbol": trade.symbol.as_str(),
                "market": trade.market.slug(),
                "price": trade.price.0.to_string(),
                "size": trade.size.0.to_string(),
                "side": trade.side,
                "source_ts": trade.source_ts_ms(),
            });
            broker.broadcast(&trade.symbol, payload, None);
        }
        Ok(false) => {
            Metrics::trade_deduped(trade.market.slug());
        }
        Err(e) => {
            warn!(error = %e, "failed to publish trade to cache");
        }
    }
}
