//! C3: append-only stream sink with a dedup-set TTL and an order-book
//! latest-value cache, both backed by Redis.

use dashmap::DashMap;
use ingest_core::{BookUpdate, Trade};
use redis::aio::ConnectionManager;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::{CacheError, CacheResult};

pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(3600);
pub const DEFAULT_ORDERBOOK_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_STREAM_MAXLEN: usize = 50_000;
pub const DEFAULT_POOL_SIZE: usize = 20;

/// Tunables for [`StreamSink`]. See `SPEC_FULL.md` §4.3 for the defaults.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub dedup_window: Duration,
    pub orderbook_ttl: Duration,
    pub stream_maxlen: usize,
    pub pool_size: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            dedup_window: DEFAULT_DEDUP_WINDOW,
            orderbook_ttl: DEFAULT_ORDERBOOK_TTL,
            stream_maxlen: DEFAULT_STREAM_MAXLEN,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

/// A small round-robin pool of multiplexed connections. Each
/// `ConnectionManager` already pipelines concurrent callers over one
/// socket; spreading callers across a handful of them bounds how much a
/// single reconnect storm can stall, and matches the sink's default pool
/// size of 20.
struct ConnectionPool {
    connections: Vec<ConnectionManager>,
    next: AtomicUsize,
}

impl ConnectionPool {
    async fn connect(redis_url: &str, size: usize) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let mut connections = Vec::with_capacity(size.max(1));
        for _ in 0..size.max(1) {
            connections.push(client.get_connection_manager().await?);
        }
        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
        })
    }

    fn pick(&self) -> ConnectionManager {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        self.connections[i].clone()
    }
}

/// In-process dedup guard, consulted before the round trip to Redis so a
/// hot-looping reconnect replay doesn't cost a command per trade. Holds a
/// monotonic insertion stamp per hash so entries can be swept once they
/// fall outside `dedup_window`.
struct LocalDedup {
    seen: DashMap<u64, Instant>,
    window: Duration,
}

impl LocalDedup {
    fn new(window: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            window,
        }
    }

    /// Returns true if this hash was already seen within the window.
    fn check_and_insert(&self, hash: u64) -> bool {
        let now = Instant::now();
        if let Some(stamp) = self.seen.get(&hash) {
            if now.duration_since(*stamp) < self.window {
                return true;
            }
        }
        self.seen.insert(hash, now);
        false
    }

    fn sweep(&self) {
        let now = Instant::now();
        self.seen.retain(|_, stamp| now.duration_since(*stamp) < self.window);
    }
}

/// C3: the cache/stream sink. Cheap to clone; safe for concurrent callers
/// sharing the underlying connection pool.
pub struct StreamSink {
    pool: ConnectionPool,
    config: SinkConfig,
    local_dedup: LocalDedup,
}

impl StreamSink {
    pub async fn connect(redis_url: &str, config: SinkConfig) -> CacheResult<Self> {
        let pool = ConnectionPool::connect(redis_url, config.pool_size).await?;
        let local_dedup = LocalDedup::new(config.dedup_window);
        Ok(Self {
            pool,
            config,
            local_dedup,
        })
    }

    /// Publish a trade. Returns `Ok(true)` on first publication, `Ok(false)`
    /// when it was dropped as a dedup hit. Idempotent under retries: a
    /// reconnect replay of a trade already written returns `Ok(false)`
    /// rather than a duplicate stream entry.
    pub async fn publish_trade(&self, trade: &Trade) -> CacheResult<bool> {
        let hash = trade.dedup_hash();
        if self.local_dedup.check_and_insert(hash) {
            return Ok(false);
        }

        let mut conn = self.pool.pick();
        let dedup_key = format!("trade_dedup:{hash:x}");
        let claimed: Option<String> = redis::cmd("SET")
            .arg(&dedup_key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(self.config.dedup_window.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        if claimed.is_none() {
            return Ok(false);
        }

        let payload = encode_payload(trade)?;
        let stream_key = trade.stream_key();
        let entry_id = trade.entry_id();
        self.xadd_capped(&mut conn, &stream_key, &entry_id, &payload).await?;
        debug!(stream = %stream_key, id = %entry_id, "trade published");
        Ok(true)
    }

    async fn xadd_capped(
        &self,
        conn: &mut ConnectionManager,
        stream_key: &str,
        entry_id: &str,
        payload: &[u8],
    ) -> CacheResult<()> {
        let result: redis::RedisResult<String> = redis::cmd("XADD")
            .arg(stream_key)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.config.stream_maxlen)
            .arg(entry_id)
            .arg("data")
            .arg(payload)
            .query_async(conn)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("equal or smaller") => {
                // Two trades with the same source timestamp but different
                // price/size hash differently (see `Trade::entry_id`), so
                // both clear the dedup check above but collide on entry id.
                // Fall back to an auto-assigned id rather than drop the
                // second one.
                redis::cmd("XADD")
                    .arg(stream_key)
                    .arg("MAXLEN")
                    .arg("~")
                    .arg(self.config.stream_maxlen)
                    .arg("*")
                    .arg("data")
                    .arg(payload)
                    .query_async::<String>(conn)
                    .await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write the latest order-book snapshot. Latest wins; short TTL means a
    /// stalled upstream session simply lets the key expire rather than
    /// serving stale depth.
    pub async fn put_book(&self, book: &BookUpdate) -> CacheResult<()> {
        let mut conn = self.pool.pick();
        let payload = encode_payload(book)?;
        let _: () = redis::cmd("SET")
            .arg(book.cache_key())
            .arg(payload)
            .arg("EX")
            .arg(self.config.orderbook_ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Liveness probe used by the health supervisor (C8).
    pub async fn ping(&self) -> bool {
        let mut conn = self.pool.pick();
        redis::cmd("PING").query_async::<String>(&mut conn).await.is_ok()
    }

    /// Periodic maintenance: drop expired entries from the in-process dedup
    /// map. The supervisor calls this on a minute-ish tick.
    pub fn sweep_local_dedup(&self) {
        self.local_dedup.sweep();
    }
}

fn encode_payload<T: serde::Serialize>(value: &T) -> CacheResult<Vec<u8>> {
    let json = serde_json::to_vec(value).map_err(|e| CacheError::Encoding(e.to_string()))?;
    zstd::stream::encode_all(&json[..], 0).map_err(|e| CacheError::Encoding(e.to_string()))
}

/// Decode a payload written by [`encode_payload`]. Exposed for readers
/// (e.g. a backfill job) that share this sink's wire format.
pub fn decode_payload<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> CacheResult<T> {
    let json = zstd::stream::decode_all(bytes).map_err(|e| CacheError::Encoding(e.to_string()))?;
    serde_json::from_slice(&json).map_err(|e| CacheError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ingest_core::{MarketCategory, Price, Side, Size, SymbolId};
    use rust_decimal_macros::dec;
    use std::time::Duration as StdDuration;

    fn sample_trade() -> Trade {
        Trade::new(
            SymbolId::new("BTCUSDT"),
            MarketCategory::Spot,
            Price::new(dec!(30000)),
            Size::new(dec!(0.1)),
            Side::Buy,
            Utc::now(),
        )
    }

    #[test]
    fn local_dedup_flags_repeat_within_window() {
        let dedup = LocalDedup::new(StdDuration::from_secs(60));
        let trade = sample_trade();
        assert!(!dedup.check_and_insert(trade.dedup_hash()));
        assert!(dedup.check_and_insert(trade.dedup_hash()));
    }

    #[test]
    fn local_dedup_sweep_drops_expired_entries() {
        let dedup = LocalDedup::new(StdDuration::from_millis(1));
        let trade = sample_trade();
        assert!(!dedup.check_and_insert(trade.dedup_hash()));
        std::thread::sleep(StdDuration::from_millis(5));
        dedup.sweep();
        assert_eq!(dedup.seen.len(), 0);
    }

    #[test]
    fn payload_roundtrips_through_compression() {
        let trade = sample_trade();
        let encoded = encode_payload(&trade).unwrap();
        let decoded: Trade = decode_payload(&encoded).unwrap();
        assert_eq!(decoded, trade);
    }

    #[test]
    fn sink_config_defaults_match_spec() {
        let config = SinkConfig::default();
        assert_eq!(config.stream_maxlen, DEFAULT_STREAM_MAXLEN);
        assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(config.orderbook_ttl, DEFAULT_ORDERBOOK_TTL);
    }
}
