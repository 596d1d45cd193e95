//! Application configuration.
//!
//! Loaded from a TOML file (path resolved via `--config` or `INGEST_CONFIG`,
//! falling back to `config/default.toml`). Venue credentials and the Redis
//! password are deliberately absent from the file format and read from the
//! environment instead (`BITGET_API_KEY`/`BITGET_SECRET_KEY`/
//! `BITGET_PASSPHRASE`, `REDIS_PASSWORD`), so a config file can be committed
//! without leaking secrets.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Redis connection settings backing the cache/stream sink (C3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    #[serde(default = "default_orderbook_ttl_secs")]
    pub orderbook_ttl_secs: u64,
    #[serde(default = "default_stream_maxlen")]
    pub stream_maxlen: usize,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl RedisConfig {
    /// Connection URL, folding in `REDIS_PASSWORD` if set.
    pub fn url(&self) -> String {
        match std::env::var("REDIS_PASSWORD") {
            Ok(password) if !password.is_empty() => {
                format!("redis://:{password}@{}:{}", self.host, self.port)
            }
            _ => format!("redis://{}:{}", self.host, self.port),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            dedup_window_secs: default_dedup_window_secs(),
            orderbook_ttl_secs: default_orderbook_ttl_secs(),
            stream_maxlen: default_stream_maxlen(),
            pool_size: default_pool_size(),
        }
    }
}

fn default_redis_host() -> String {
    "localhost".to_string()
}
fn default_redis_port() -> u16 {
    6379
}
fn default_dedup_window_secs() -> u64 {
    ingest_cache::DEFAULT_DEDUP_WINDOW.as_secs()
}
fn default_orderbook_ttl_secs() -> u64 {
    ingest_cache::DEFAULT_ORDERBOOK_TTL.as_secs()
}
fn default_stream_maxlen() -> usize {
    ingest_cache::DEFAULT_STREAM_MAXLEN
}
fn default_pool_size() -> usize {
    ingest_cache::DEFAULT_POOL_SIZE
}

/// Venue REST/streaming endpoints (C4 catalog oracle, C6 upstream sessions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    #[serde(default = "default_rest_base_url")]
    pub rest_base_url: String,
    #[serde(default = "default_url_spot")]
    pub url_spot: String,
    #[serde(default = "default_url_mix")]
    pub url_mix: String,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            rest_base_url: default_rest_base_url(),
            url_spot: default_url_spot(),
            url_mix: default_url_mix(),
        }
    }
}

fn default_rest_base_url() -> String {
    "https://api.bitget.com".to_string()
}
fn default_url_spot() -> String {
    "wss://ws.bitget.com/spot/v1/stream".to_string()
}
fn default_url_mix() -> String {
    "wss://ws.bitget.com/mix/v1/stream".to_string()
}

/// Symbol manager (C5) selection knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolManagerSettings {
    #[serde(default = "default_max_symbols_per_market")]
    pub max_symbols_per_market: usize,
    #[serde(default = "default_min_volume_24h")]
    pub min_volume_24h: i64,
}

impl Default for SymbolManagerSettings {
    fn default() -> Self {
        Self {
            max_symbols_per_market: default_max_symbols_per_market(),
            min_volume_24h: default_min_volume_24h(),
        }
    }
}

fn default_max_symbols_per_market() -> usize {
    200
}
fn default_min_volume_24h() -> i64 {
    ingest_registry::DEFAULT_MIN_VOLUME_24H
}

/// Fan-out broker (C7) batching knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BrokerSettings {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_batch_interval_ms")]
    pub batch_interval_ms: u64,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            batch_interval_ms: default_batch_interval_ms(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    25
}
fn default_batch_interval_ms() -> u64 {
    50
}

/// Control plane (C10) HTTP/WS bind settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_host")]
    pub host: String,
    #[serde(default = "default_bind_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_bind_host(),
            port: default_bind_port(),
        }
    }
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}
fn default_bind_port() -> u16 {
    8080
}

/// ClickHouse liveness-probe target (C8); the pipeline never writes to or
/// queries ClickHouse itself, only checks it is reachable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticalStoreConfig {
    pub host: Option<String>,
    #[serde(default = "default_clickhouse_port")]
    pub port: u16,
}

impl Default for AnalyticalStoreConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_clickhouse_port(),
        }
    }
}

fn default_clickhouse_port() -> u16 {
    8123
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub venue: VenueConfig,
    #[serde(default)]
    pub symbols: SymbolManagerSettings,
    #[serde(default)]
    pub broker: BrokerSettings,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub analytical_store: AnalyticalStoreConfig,
}

impl AppConfig {
    /// Load configuration, resolving the file path from `INGEST_CONFIG` (or
    /// `config/default.toml`) and falling back to defaults if absent.
    pub fn load() -> AppResult<Self> {
        let config_path =
            std::env::var("INGEST_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());

        if Path::new(&config_path).exists() {
            Self::from_file(&config_path)
        } else {
            tracing::warn!(path = %config_path, "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("failed to parse config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = AppConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.redis.port, config.redis.port);
        assert_eq!(parsed.server.port, 8080);
    }

    #[test]
    fn redis_url_without_password() {
        std::env::remove_var("REDIS_PASSWORD");
        let config = RedisConfig::default();
        assert_eq!(config.url(), "redis://localhost:6379");
    }
}
