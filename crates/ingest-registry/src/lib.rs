//! C4 catalog oracle client and C5 symbol manager.
//!
//! `client` is a read-only HTTP client over the venue's catalog/ticker
//! endpoints, rate-limited and circuit-broken. `symbol_manager` derives the
//! working set of (symbol, market) pairs the upstream sessions (C6) are
//! built from, and re-derives it whenever the capability profile changes.

pub mod client;
pub mod error;
pub mod symbol_manager;

pub use client::CatalogClient;
pub use error::{RegistryError, RegistryResult};
pub use symbol_manager::{SymbolEvent, SymbolManager, SymbolManagerConfig, DEFAULT_MIN_VOLUME_24H};
