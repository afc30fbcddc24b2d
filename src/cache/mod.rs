//! Multi-tier cache subsystem.
//!
//! # Responsibilities
//! - Define the uniform layer contract (`get`/`has`/`set`/`stats`)
//! - Bounded in-memory LRU backend
//! - On-disk backend with per-key read/write locking
//! - Cascading multilayer composition with front-fill
//!
//! # Design Decisions
//! - Backends never surface I/O errors to callers: a failed read or
//!   write degrades to a miss / rejected set, with an error counter
//!   for metrics. The network call remains the source of truth.
//! - Counters reset each time `stats()` is read, so readings mean
//!   "since last read". `item_count` is a gauge and is not reset.

pub mod disk;
pub mod entry;
pub mod memory;
pub mod multilayer;

pub use disk::DiskCache;
pub use entry::CacheEntry;
pub use memory::MemoryCache;
pub use multilayer::MultilayerCache;

use std::time::Duration;

use async_trait::async_trait;

/// Point-in-time counters for one cache layer.
///
/// Produced by [`CacheLayer::stats`]; all counters except `item_count`
/// are deltas since the previous read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerStats {
    pub hits: u64,
    pub total: u64,
    pub item_count: u64,
    pub evictions: u64,
    pub errors: u64,
}

impl LayerStats {
    pub fn merge(self, other: LayerStats) -> LayerStats {
        LayerStats {
            hits: self.hits + other.hits,
            total: self.total + other.total,
            item_count: self.item_count + other.item_count,
            evictions: self.evictions + other.evictions,
            errors: self.errors + other.errors,
        }
    }
}

/// Uniform contract implemented by every cache backend.
///
/// `remove` exists because the freshness policy must be able to drop an
/// entry whose replacement response is no longer cacheable.
#[async_trait]
pub trait CacheLayer<V>: Send + Sync {
    /// Fetch a value. Expired or unreadable entries are misses.
    async fn get(&self, key: &str) -> Option<V>;

    /// Whether the key is present, without affecting recency or counters.
    async fn has(&self, key: &str) -> bool;

    /// Store a value, replacing any prior entry whole. Returns `false`
    /// if the backend could not persist it.
    async fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> bool;

    /// Drop a key. Absence is a valid state; removing a missing key is
    /// a no-op.
    async fn remove(&self, key: &str);

    /// Snapshot and reset the layer's counters.
    fn stats(&self) -> LayerStats;
}
