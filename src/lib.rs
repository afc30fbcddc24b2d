//! Outbound HTTP request engine with caching, deduplication, and retries.

pub mod cache;
pub mod client;
pub mod config;
pub mod dedup;
pub mod error;
pub mod observability;
pub mod pipeline;
pub mod pool;
pub mod request;
pub mod resilience;
pub mod transport;

pub use cache::{CacheEntry, CacheLayer, LayerStats, MultilayerCache};
pub use client::{CacheReport, Client, ClientBuilder};
pub use config::{load_config, ClientConfig, ConfigError};
pub use dedup::{InflightRegistry, MemoMap};
pub use error::Error;
pub use pool::{ConnectionPoolRegistry, ConnectionPoolStats};
pub use request::{CacheState, CacheTier, RequestSpec, UpstreamResponse};
