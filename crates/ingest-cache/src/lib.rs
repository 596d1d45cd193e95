//! C3: the cache/stream sink.
//!
//! Every accepted trade is appended to a per-(symbol, market) Redis stream
//! behind a TTL-backed dedup set; every order-book update overwrites a
//! short-TTL latest-value key. Both payloads are zstd-compressed JSON.

pub mod error;
pub mod sink;

pub use error::{CacheError, CacheResult};
pub use sink::{
    decode_payload, SinkConfig, StreamSink, DEFAULT_DEDUP_WINDOW, DEFAULT_ORDERBOOK_TTL,
    DEFAULT_POOL_SIZE, DEFAULT_STREAM_MAXLEN,
};
