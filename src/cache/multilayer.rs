//! Cascading composition of cache layers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use super::{CacheLayer, LayerStats};

/// Loader invoked on a full miss; its result is written through every
/// layer before being returned.
pub type Fetcher<V> = Arc<dyn Fn(String) -> BoxFuture<'static, Option<V>> + Send + Sync>;

/// Layers ordered fastest first. A hit in a slower layer is copied
/// forward into every faster layer so the next lookup short-circuits.
pub struct MultilayerCache<V> {
    layers: Vec<Arc<dyn CacheLayer<V>>>,
    fetcher: Option<Fetcher<V>>,
}

impl<V: Clone + Send + Sync + 'static> MultilayerCache<V> {
    pub fn new(layers: Vec<Arc<dyn CacheLayer<V>>>) -> Self {
        Self { layers, fetcher: None }
    }

    pub fn with_fetcher(mut self, fetcher: Fetcher<V>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn layers(&self) -> &[Arc<dyn CacheLayer<V>>] {
        &self.layers
    }
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> CacheLayer<V> for MultilayerCache<V> {
    async fn get(&self, key: &str) -> Option<V> {
        for (depth, layer) in self.layers.iter().enumerate() {
            if let Some(value) = layer.get(key).await {
                for faster in &self.layers[..depth] {
                    faster.set(key, value.clone(), None).await;
                }
                return Some(value);
            }
        }

        let fetcher = self.fetcher.as_ref()?;
        let value = fetcher(key.to_string()).await?;
        for layer in &self.layers {
            layer.set(key, value.clone(), None).await;
        }
        Some(value)
    }

    async fn has(&self, key: &str) -> bool {
        for layer in &self.layers {
            if layer.has(key).await {
                return true;
            }
        }
        false
    }

    /// Fans out to every layer. Reports success only if all layers
    /// accepted the write, so a caller can tell a partially durable
    /// store from a fully durable one.
    async fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> bool {
        let mut all_accepted = true;
        for layer in &self.layers {
            all_accepted &= layer.set(key, value.clone(), ttl).await;
        }
        all_accepted
    }

    async fn remove(&self, key: &str) {
        for layer in &self.layers {
            layer.remove(key).await;
        }
    }

    fn stats(&self) -> LayerStats {
        self.layers
            .iter()
            .map(|layer| layer.stats())
            .fold(LayerStats::default(), LayerStats::merge)
    }
}
