//! First stage: fold client-level defaults into the call context.

use std::time::Duration;

use futures_util::future::BoxFuture;
use http::HeaderMap;
use url::Url;

use super::{Next, Outcome, Stage};
use crate::error::Error;
use crate::request::{build_header_map, canonical_cache_key, CallContext};

/// Resolves the request URL against the client's base, merges default
/// headers and query parameters under the request's own, applies the
/// effective timeout and retry settings, and computes the canonical
/// cache key everything downstream agrees on.
pub struct DefaultsStage {
    pub base_url: Url,
    pub default_headers: HeaderMap,
    pub default_params: Vec<(String, String)>,
    pub timeout: Duration,
    pub retries: u32,
    pub initial_backoff: Duration,
    pub backoff_coefficient: f64,
    pub timeout_coefficient: f64,
}

impl DefaultsStage {
    fn resolve(&self, ctx: &mut CallContext) -> Result<(), Error> {
        let spec = ctx.spec.clone();

        let mut url = if spec.path.starts_with("http://") || spec.path.starts_with("https://") {
            Url::parse(&spec.path)
                .map_err(|e| Error::InvalidRequest(format!("invalid url {}: {e}", spec.path)))?
        } else {
            self.base_url
                .join(&spec.path)
                .map_err(|e| Error::InvalidRequest(format!("invalid path {}: {e}", spec.path)))?
        };
        let merged_params: Vec<_> = self.default_params.iter().chain(spec.params.iter()).collect();
        if !merged_params.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in merged_params {
                query.append_pair(key, value);
            }
        }

        let mut headers = self.default_headers.clone();
        headers.extend(build_header_map(&spec.headers)?);

        ctx.cache_key = canonical_cache_key(&url);
        ctx.url = Some(url);
        ctx.headers = headers;
        ctx.timeout = spec.timeout.unwrap_or(self.timeout);
        ctx.retries = spec.retries.unwrap_or(self.retries);
        ctx.initial_backoff = spec.initial_backoff_delay.unwrap_or(self.initial_backoff);
        ctx.backoff_coefficient = spec.backoff_coefficient.unwrap_or(self.backoff_coefficient);
        ctx.timeout_coefficient = spec.timeout_coefficient.unwrap_or(self.timeout_coefficient);
        Ok(())
    }
}

impl Stage for DefaultsStage {
    fn handle(&self, mut ctx: CallContext, next: Next) -> BoxFuture<'static, Outcome> {
        if let Err(err) = self.resolve(&mut ctx) {
            return Box::pin(async move { Err(err) });
        }
        next.run(ctx)
    }
}
