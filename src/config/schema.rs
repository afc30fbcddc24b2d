//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! request engine. All types derive Serde traits for deserialization
//! from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for one client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL that relative request paths are joined against.
    pub base_url: String,

    /// Headers attached to every request (request-level headers win).
    pub default_headers: BTreeMap<String, String>,

    /// Query parameters attached to every request.
    pub default_params: BTreeMap<String, String>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// In-memory cache tier.
    pub memory_cache: MemoryCacheConfig,

    /// On-disk cache tier.
    pub disk_cache: DiskCacheConfig,

    /// Connection pool settings.
    pub pool: PoolConfig,

    /// Concurrency limits.
    pub concurrency: ConcurrencyConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-attempt deadline in milliseconds.
    pub request_ms: u64,

    /// Multiplier applied to the deadline on each retry (>= 1.0).
    pub timeout_coefficient: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_ms: 30_000,
            timeout_coefficient: 1.0,
        }
    }
}

impl TimeoutConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retry budget; zero disables retrying.
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,

    /// Geometric growth factor for subsequent delays (>= 1.0).
    pub backoff_coefficient: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: 200,
            backoff_coefficient: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

/// In-memory cache tier configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MemoryCacheConfig {
    pub enabled: bool,

    /// Maximum number of entries held before LRU eviction.
    pub capacity: usize,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 1_024,
        }
    }
}

/// On-disk cache tier configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiskCacheConfig {
    pub enabled: bool,

    /// Directory the cache files live in; created on first use.
    pub path: String,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "cache".to_string(),
        }
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// TCP keep-alive probe interval in seconds.
    pub keepalive_secs: u64,

    /// Idle socket lifetime in seconds.
    pub idle_timeout_secs: u64,

    /// Idle sockets retained per upstream host.
    pub max_idle_per_host: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            keepalive_secs: 60,
            idle_timeout_secs: 60,
            max_idle_per_host: 32,
        }
    }
}

/// Concurrency configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Maximum requests simultaneously on the wire; excess waits in
    /// arrival order.
    pub max_in_flight: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { max_in_flight: 64 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Response header inspected to detect upstream-served cache hits.
    pub upstream_cache_header: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            upstream_cache_header: "x-upstream-cache".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            base_url = "http://api.example.com/v1/"
            "#,
        )
        .unwrap();

        assert_eq!(config.base_url, "http://api.example.com/v1/");
        assert_eq!(config.timeouts.request_ms, 30_000);
        assert_eq!(config.retries.max_retries, 0);
        assert!(config.memory_cache.enabled);
        assert_eq!(config.memory_cache.capacity, 1_024);
        assert!(!config.disk_cache.enabled);
        assert_eq!(config.concurrency.max_in_flight, 64);
        assert_eq!(config.observability.upstream_cache_header, "x-upstream-cache");
    }

    #[test]
    fn test_full_config_round_trip() {
        let config: ClientConfig = toml::from_str(
            r#"
            base_url = "http://api.example.com/"

            [default_headers]
            accept = "application/json"

            [timeouts]
            request_ms = 5000
            timeout_coefficient = 1.5

            [retries]
            max_retries = 3
            initial_backoff_ms = 100
            backoff_coefficient = 2.0

            [memory_cache]
            capacity = 64

            [disk_cache]
            enabled = true
            path = "/var/cache/upcall"

            [pool]
            max_idle_per_host = 8

            [concurrency]
            max_in_flight = 16
            "#,
        )
        .unwrap();

        assert_eq!(config.default_headers["accept"], "application/json");
        assert_eq!(config.timeouts.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.retries.max_retries, 3);
        assert_eq!(config.retries.initial_backoff(), Duration::from_millis(100));
        assert_eq!(config.memory_cache.capacity, 64);
        assert!(config.disk_cache.enabled);
        assert_eq!(config.pool.max_idle_per_host, 8);
        assert_eq!(config.concurrency.max_in_flight, 16);
    }
}
