//! Cache tier stages and the freshness policy.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use http::{Method, StatusCode};
use tracing::debug;

use super::{Next, Outcome, Stage};
use crate::cache::entry::max_age;
use crate::cache::{CacheEntry, CacheLayer};
use crate::request::{CacheState, CacheTier, CallContext};

/// One cache tier in the chain.
///
/// Only GET requests that opted into this tier participate; everything
/// else flows straight through. The policy on the way back up:
///
/// - fresh stored entry: serve it, skip the rest of the chain
/// - stale entry with a validator: send `If-None-Match`, and on a
///   `304` re-arm the entry and serve it
/// - stale entry without a validator: drop it, it can never be revived
/// - cacheable success: store it (which also promotes hits from a
///   slower tier into this one)
/// - any other response over a previously stored entry: drop the
///   entry rather than serve it stale later
pub struct CacheStage {
    pub tier: CacheTier,
    pub tier_name: &'static str,
    pub layer: Arc<dyn CacheLayer<CacheEntry>>,
}

impl CacheStage {
    fn storage_ttl(entry: &CacheEntry) -> Option<Duration> {
        // Validator-bearing entries must outlive their freshness window
        // so they can be revalidated.
        if entry.etag.is_some() {
            None
        } else {
            entry.remaining_ttl()
        }
    }
}

impl Stage for CacheStage {
    fn handle(&self, mut ctx: CallContext, next: Next) -> BoxFuture<'static, Outcome> {
        if ctx.method != Method::GET || !ctx.spec.cacheable.includes(self.tier) {
            return next.run(ctx);
        }

        let layer = self.layer.clone();
        let tier_name = self.tier_name;
        Box::pin(async move {
            let key = ctx.cache_key.clone();

            let stale = match layer.get(&key).await {
                Some(entry) if entry.is_fresh() => {
                    debug!(tier = tier_name, key, "cache hit");
                    return Ok(entry.into_response(CacheState::Hit));
                }
                Some(entry) => match &entry.etag {
                    Some(etag) => {
                        ctx.validator = Some(etag.clone());
                        Some(entry)
                    }
                    None => {
                        layer.remove(&key).await;
                        None
                    }
                },
                None => None,
            };

            let outcome = next.run(ctx).await;

            match &outcome {
                Ok(response) if response.status == StatusCode::NOT_MODIFIED => {
                    if let Some(mut entry) = stale {
                        debug!(tier = tier_name, key, "revalidated stale entry");
                        entry.refresh(max_age(&response.headers).unwrap_or(Duration::ZERO));
                        layer.set(&key, entry.clone(), Self::storage_ttl(&entry)).await;
                        return Ok(entry.into_response(CacheState::Hit));
                    }
                    outcome
                }
                Ok(response) => {
                    // Anything other than a 304 that crossed the wire
                    // supersedes whatever was stored under this key.
                    let entry = CacheEntry::from_response(response)
                        .filter(|_| response.status.is_success());
                    match entry {
                        Some(entry) => {
                            layer.set(&key, entry.clone(), Self::storage_ttl(&entry)).await;
                        }
                        None if stale.is_some() => layer.remove(&key).await,
                        None => {}
                    }
                    outcome
                }
                Err(_) => outcome,
            }
        })
    }
}
