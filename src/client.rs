//! The caller-facing client: configuration in, pipeline out.
//!
//! # Responsibilities
//! - Assemble the stage chain from a validated [`ClientConfig`]
//! - Own the shared registries (cache tiers, pool, single-flight)
//! - Expose stats snapshots for the embedder to poll
//!
//! # Design Decisions
//! - The stage order is fixed at build time. Requests opt out of
//!   individual stages per call; they cannot reorder them.
//! - The builder accepts replacement hooks (recorder, header sink,
//!   transport, registries) so embedders and tests can observe or
//!   fake any seam without touching the chain itself.

use std::sync::Arc;

use http::HeaderName;
use tokio::sync::Semaphore;
use tracing::info;
use url::Url;

use crate::cache::{CacheEntry, CacheLayer, DiskCache, LayerStats, MemoryCache};
use crate::config::{validate_config, ClientConfig};
use crate::dedup::InflightRegistry;
use crate::error::Error;
use crate::observability::{HeaderSink, NoopRecorder, Recorder};
use crate::pipeline::cache::CacheStage;
use crate::pipeline::dedup::{MemoStage, SingleFlightStage};
use crate::pipeline::defaults::DefaultsStage;
use crate::pipeline::not_found::{EmptyBodyStage, NotFoundStage};
use crate::pipeline::observe::{HeaderSinkStage, ObserveStage};
use crate::pipeline::terminal::TerminalStage;
use crate::pipeline::upstream_cache::UpstreamCacheStage;
use crate::pipeline::{Outcome, Pipeline, Stage};
use crate::pool::{ConnectionPoolRegistry, ConnectionPoolStats, PoolSettings};
use crate::request::{build_header_map, CacheTier, CallContext, RequestSpec};
use crate::transport::{HyperTransport, Transport};

/// Per-tier cache counters since the previous snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheReport {
    pub memory: Option<LayerStats>,
    pub disk: Option<LayerStats>,
}

pub struct Client {
    pipeline: Pipeline,
    memory: Option<Arc<MemoryCache<CacheEntry>>>,
    disk: Option<Arc<DiskCache>>,
    pool: Arc<ConnectionPoolRegistry>,
    inflight: Arc<InflightRegistry>,
}

impl Client {
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder {
            config,
            recorder: None,
            header_sink: None,
            transport: None,
            pool: None,
            inflight: None,
        }
    }

    /// Run one logical call through the pipeline.
    pub async fn execute(&self, spec: RequestSpec) -> Outcome {
        self.pipeline.execute(CallContext::new(Arc::new(spec))).await
    }

    /// Snapshot and reset the cache tier counters.
    pub fn cache_stats(&self) -> CacheReport {
        CacheReport {
            memory: self.memory.as_ref().map(|tier| tier.stats()),
            disk: self.disk.as_ref().map(|tier| tier.stats()),
        }
    }

    pub fn pool_stats(&self) -> ConnectionPoolStats {
        self.pool.stats()
    }

    /// Calls currently collapsed under single-flight keys.
    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }
}

pub struct ClientBuilder {
    config: ClientConfig,
    recorder: Option<Arc<dyn Recorder>>,
    header_sink: Option<Arc<dyn HeaderSink>>,
    transport: Option<Arc<dyn Transport>>,
    pool: Option<Arc<ConnectionPoolRegistry>>,
    inflight: Option<Arc<InflightRegistry>>,
}

impl ClientBuilder {
    pub fn recorder(mut self, recorder: Arc<dyn Recorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Capture response headers for every call made by this client.
    pub fn header_sink(mut self, sink: Arc<dyn HeaderSink>) -> Self {
        self.header_sink = Some(sink);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Share a pool registry between clients talking to the same hosts.
    pub fn pool(mut self, pool: Arc<ConnectionPoolRegistry>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Share a single-flight registry between clients, widening the
    /// collapse scope beyond one client.
    pub fn inflight(mut self, inflight: Arc<InflightRegistry>) -> Self {
        self.inflight = Some(inflight);
        self
    }

    pub async fn build(self) -> Result<Client, Error> {
        let config = self.config;
        validate_config(&config).map_err(|errors| {
            let joined = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            Error::InvalidRequest(format!("invalid configuration: {joined}"))
        })?;

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| Error::InvalidRequest(format!("invalid base_url: {e}")))?;
        let default_headers = build_header_map(
            &config
                .default_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Vec<_>>(),
        )?;
        let upstream_cache_header =
            HeaderName::try_from(config.observability.upstream_cache_header.as_str()).map_err(
                |_| Error::InvalidRequest("upstream_cache_header is not a valid header name".into()),
            )?;

        let pool = self.pool.unwrap_or_else(|| {
            Arc::new(ConnectionPoolRegistry::new(PoolSettings {
                keepalive: std::time::Duration::from_secs(config.pool.keepalive_secs),
                idle_timeout: std::time::Duration::from_secs(config.pool.idle_timeout_secs),
                max_idle_per_host: config.pool.max_idle_per_host,
            }))
        });
        let inflight = self.inflight.unwrap_or_default();
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HyperTransport::new(pool.clone())));
        let recorder = self.recorder.unwrap_or_else(|| Arc::new(NoopRecorder));

        let memory = config
            .memory_cache
            .enabled
            .then(|| Arc::new(MemoryCache::new(config.memory_cache.capacity)));
        let disk = if config.disk_cache.enabled {
            Some(Arc::new(
                DiskCache::open(&config.disk_cache.path)
                    .await
                    .map_err(|e| Error::CacheBackend(e.to_string()))?,
            ))
        } else {
            None
        };

        let mut stages: Vec<Arc<dyn Stage>> = Vec::new();
        stages.push(Arc::new(DefaultsStage {
            base_url,
            default_headers,
            default_params: config
                .default_params
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            timeout: config.timeouts.request_timeout(),
            retries: config.retries.max_retries,
            initial_backoff: config.retries.initial_backoff(),
            backoff_coefficient: config.retries.backoff_coefficient,
            timeout_coefficient: config.timeouts.timeout_coefficient,
        }));
        stages.push(Arc::new(ObserveStage { recorder }));
        stages.push(Arc::new(MemoStage));
        if let Some(sink) = self.header_sink {
            stages.push(Arc::new(HeaderSinkStage { sink }));
        }
        stages.push(Arc::new(SingleFlightStage { registry: inflight.clone() }));
        stages.push(Arc::new(NotFoundStage));
        if let Some(memory) = &memory {
            stages.push(Arc::new(CacheStage {
                tier: CacheTier::Memory,
                tier_name: "memory",
                layer: memory.clone() as Arc<dyn CacheLayer<CacheEntry>>,
            }));
        }
        if let Some(disk) = &disk {
            stages.push(Arc::new(CacheStage {
                tier: CacheTier::Disk,
                tier_name: "disk",
                layer: disk.clone() as Arc<dyn CacheLayer<CacheEntry>>,
            }));
        }
        stages.push(Arc::new(EmptyBodyStage));
        stages.push(Arc::new(UpstreamCacheStage { header: upstream_cache_header }));
        stages.push(Arc::new(TerminalStage {
            transport,
            pool: pool.clone(),
            limiter: Arc::new(Semaphore::new(config.concurrency.max_in_flight)),
        }));

        info!(
            base_url = %config.base_url,
            memory_cache = config.memory_cache.enabled,
            disk_cache = config.disk_cache.enabled,
            max_in_flight = config.concurrency.max_in_flight,
            "client built"
        );

        Ok(Client {
            pipeline: Pipeline::new(stages),
            memory,
            disk,
            pool,
            inflight,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        ClientConfig {
            base_url: "http://api.example.com/v1/".to_string(),
            ..ClientConfig::default()
        }
    }

    #[tokio::test]
    async fn test_build_with_defaults() {
        let client = Client::builder(config()).build().await.unwrap();
        assert!(client.cache_stats().memory.is_some());
        assert!(client.cache_stats().disk.is_none());
        assert_eq!(client.pool_stats(), ConnectionPoolStats::default());
        assert_eq!(client.inflight_count(), 0);
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let mut bad = config();
        bad.concurrency.max_in_flight = 0;
        assert!(matches!(
            Client::builder(bad).build().await,
            Err(Error::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_build_with_disk_tier() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut cfg = config();
        cfg.disk_cache.enabled = true;
        cfg.disk_cache.path = dir.path().to_string_lossy().into_owned();

        let client = Client::builder(cfg).build().await.unwrap();
        let report = client.cache_stats();
        assert!(report.disk.is_some());
    }
}
