//! C4: read-only catalog oracle client.
//!
//! Every call passes through the named rate bucket (C1) and the named
//! circuit breaker (C2) before hitting the network.

use ingest_core::{Credentials, MarketCategory, Price, Size, SymbolId, SymbolMeta, SymbolStatus};
use ingest_ratelimit::{CircuitBreaker, CircuitOutcome, CircuitState, TokenBucket};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{RegistryError, RegistryResult};

const VENUE_SUCCESS_CODE: &str = "00000";
const PUBLIC_TIMEOUT: Duration = Duration::from_secs(30);
const PRIVILEGED_TIMEOUT: Duration = Duration::from_secs(60);

/// Venue success-envelope shape shared by every catalog endpoint.
#[derive(Debug, Deserialize)]
struct VenueEnvelope<T> {
    code: String,
    #[serde(default)]
    msg: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct RawSymbol {
    symbol: String,
    #[serde(rename = "baseCoin")]
    base_coin: String,
    #[serde(rename = "quoteCoin")]
    quote_coin: String,
    status: String,
    #[serde(rename = "minTradeAmount")]
    min_trade_amount: Decimal,
    #[serde(rename = "maxTradeAmount")]
    max_trade_amount: Decimal,
    #[serde(rename = "sizeTickSize")]
    size_tick_size: Decimal,
    #[serde(rename = "priceTickSize")]
    price_tick_size: Decimal,
    #[serde(rename = "quoteVolume24h")]
    quote_volume_24h: Decimal,
}

fn parse_status(raw: &str) -> SymbolStatus {
    match raw.to_ascii_lowercase().as_str() {
        "online" | "normal" => SymbolStatus::Online,
        "paused" | "halt" => SymbolStatus::Paused,
        _ => SymbolStatus::Delisted,
    }
}

impl RawSymbol {
    fn into_meta(self, market: MarketCategory) -> SymbolMeta {
        SymbolMeta {
            symbol: SymbolId::new(self.symbol),
            market,
            base: self.base_coin,
            quote: self.quote_coin,
            status: parse_status(&self.status),
            min_size: Size::new(self.min_trade_amount),
            max_size: Size::new(self.max_trade_amount),
            size_tick: Size::new(self.size_tick_size),
            price_tick: Price::new(self.price_tick_size),
            notional_24h: self.quote_volume_24h,
        }
    }
}

/// C4: the venue's read-only catalog oracle.
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    bucket: Arc<TokenBucket>,
    breaker: Arc<CircuitBreaker>,
}

impl CatalogClient {
    pub fn new(base_url: impl Into<String>, bucket: Arc<TokenBucket>, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            bucket,
            breaker,
        }
    }

    /// Name and current state of the circuit breaker guarding this client,
    /// for the health supervisor's periodic metrics snapshot.
    pub fn circuit_state(&self) -> (&str, CircuitState) {
        (self.breaker.name(), self.breaker.state())
    }

    /// All online spot symbols.
    pub async fn list_spot_symbols(&self) -> RegistryResult<Vec<SymbolMeta>> {
        let raw: Vec<RawSymbol> = self
            .get("/api/spot/v1/public/products", None, false)
            .await?;
        Ok(raw
            .into_iter()
            .map(|s| s.into_meta(MarketCategory::Spot))
            .filter(|m| m.is_tradeable())
            .collect())
    }

    /// All normal-status futures symbols for the given product type.
    pub async fn list_futures_symbols(
        &self,
        product_type: MarketCategory,
    ) -> RegistryResult<Vec<SymbolMeta>> {
        let query = [("productType", product_type.inst_type())];
        let raw: Vec<RawSymbol> = self
            .get("/api/mix/v1/market/contracts", Some(&query), false)
            .await?;
        Ok(raw
            .into_iter()
            .map(|s| s.into_meta(product_type))
            .filter(|m| m.is_tradeable())
            .collect())
    }

    /// The first `limit` symbols for `market`, ordered by descending 24h
    /// notional, tie-broken lexicographically by symbol id.
    pub async fn top_by_volume(
        &self,
        market: MarketCategory,
        limit: usize,
    ) -> RegistryResult<Vec<SymbolMeta>> {
        let mut symbols = if market == MarketCategory::Spot {
            self.list_spot_symbols().await?
        } else {
            self.list_futures_symbols(market).await?
        };
        symbols.sort_by(|a, b| {
            b.notional_24h
                .cmp(&a.notional_24h)
                .then_with(|| a.symbol.as_str().cmp(b.symbol.as_str()))
        });
        symbols.truncate(limit);
        Ok(symbols)
    }

    /// Two read-only probe calls used to validate a candidate credential
    /// triple before `CapabilityProfile` commits it. Returns the total
    /// number of symbols observed across both calls.
    pub async fn test_connection(&self, _credentials: &Credentials) -> RegistryResult<usize> {
        let spot = self.list_spot_symbols().await?;
        let usdtm = self.list_futures_symbols(MarketCategory::UsdtM).await?;
        Ok(spot.len() + usdtm.len())
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&[(&str, &str)]>,
        privileged: bool,
    ) -> RegistryResult<T> {
        self.bucket.acquire().await;
        let timeout = if privileged { PRIVILEGED_TIMEOUT } else { PUBLIC_TIMEOUT };
        let url = format!("{}{}", self.base_url, path);

        let result = self
            .breaker
            .execute(|| async {
                let mut req = self.http.get(&url).timeout(timeout);
                if let Some(q) = query {
                    req = req.query(q);
                }
                let response = req.send().await?;
                let envelope: VenueEnvelope<T> = response.json().await?;
                if envelope.code != VENUE_SUCCESS_CODE {
                    return Err(RegistryError::Catalog(
                        envelope.msg.unwrap_or_else(|| envelope.code.clone()),
                    ));
                }
                envelope
                    .data
                    .ok_or_else(|| RegistryError::Decode("missing data field".into()))
            })
            .await;

        match result {
            Ok(v) => {
                self.bucket.report_success();
                debug!(url = %url, "catalog request ok");
                Ok(v)
            }
            Err(CircuitOutcome::Open(e)) => Err(RegistryError::CircuitOpen(e.to_string())),
            Err(CircuitOutcome::Inner(e)) => {
                self.bucket.report_error(&e.to_string());
                warn!(url = %url, error = %e, "catalog request failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_ratelimit::CircuitConfig;

    fn client() -> CatalogClient {
        CatalogClient::new(
            "https://example.invalid",
            Arc::new(TokenBucket::new("catalog", 8.0, 8.0)),
            Arc::new(CircuitBreaker::new("catalog", CircuitConfig::default())),
        )
    }

    #[test]
    fn raw_symbol_maps_status_case_insensitively() {
        assert_eq!(parse_status("Online"), SymbolStatus::Online);
        assert_eq!(parse_status("PAUSED"), SymbolStatus::Paused);
        assert_eq!(parse_status("delisted"), SymbolStatus::Delisted);
    }

    #[test]
    fn client_constructs_with_shared_bucket_and_breaker() {
        let c = client();
        assert_eq!(c.base_url, "https://example.invalid");
    }
}
