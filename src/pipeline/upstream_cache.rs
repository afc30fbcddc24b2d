//! Classify responses the upstream served from its own cache.

use futures_util::future::BoxFuture;
use http::HeaderName;

use super::{Next, Outcome, Stage};
use crate::observability::metrics;
use crate::request::{CacheState, CallContext};

/// Watches a diagnostic header on responses that actually crossed the
/// wire and counts the ones the upstream answered from its own cache.
/// Purely observational; the response is passed through unchanged.
pub struct UpstreamCacheStage {
    pub header: HeaderName,
}

impl Stage for UpstreamCacheStage {
    fn handle(&self, ctx: CallContext, next: Next) -> BoxFuture<'static, Outcome> {
        let header = self.header.clone();
        let label = ctx.spec.metric_label.clone();
        Box::pin(async move {
            let outcome = next.run(ctx).await;
            if let Ok(response) = &outcome {
                let served_from_upstream_cache = response.cache_state == CacheState::Miss
                    && response
                        .headers
                        .get(&header)
                        .and_then(|value| value.to_str().ok())
                        .is_some_and(|value| value.to_ascii_lowercase().contains("hit"));
                if served_from_upstream_cache {
                    metrics::record_upstream_cache_hit(&label);
                }
            }
            outcome
        })
    }
}
