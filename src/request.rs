//! Request and response types for the execution pipeline.
//!
//! # Responsibilities
//! - Define the caller-facing [`RequestSpec`] and its fluent builder
//! - Define the per-invocation [`CallContext`] threaded through stages
//! - Define [`UpstreamResponse`] and the cache-state tag it carries
//! - Compute canonical, order-independent cache keys

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::dedup::MemoMap;
use crate::error::Error;

/// Which cache tier(s) a request may be served from and stored into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    /// Bypass caching entirely.
    #[default]
    None,
    /// In-memory bounded cache only.
    Memory,
    /// On-disk cache only.
    Disk,
    /// Both memory and disk.
    Any,
}

impl CacheTier {
    /// Whether a request with this tier setting participates in `tier`.
    pub fn includes(self, tier: CacheTier) -> bool {
        match self {
            CacheTier::None => false,
            CacheTier::Any => matches!(tier, CacheTier::Memory | CacheTier::Disk | CacheTier::Any),
            exact => exact == tier,
        }
    }
}

/// How a response was produced, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Served by the terminal transport call.
    Miss,
    /// Served from a cache tier without touching the network.
    Hit,
    /// Joined another caller's identical in-flight call.
    Inflight,
    /// Collapsed within the caller's unit of work.
    Memoized,
}

impl CacheState {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheState::Miss => "miss",
            CacheState::Hit => "hit",
            CacheState::Inflight => "inflight",
            CacheState::Memoized => "memoized",
        }
    }
}

/// Computes a single-flight key from a request spec.
pub type InflightKeyFn = Arc<dyn Fn(&RequestSpec) -> String + Send + Sync>;

/// Caller-supplied description of one logical outbound call.
///
/// Immutable once submitted; the pipeline derives a [`CallContext`]
/// per invocation and never mutates the spec itself.
pub struct RequestSpec {
    pub method: Method,
    /// Path (joined against the client's base URL) or an absolute URL.
    pub path: String,
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub timeout: Option<Duration>,
    /// Retry budget. `None` falls back to the client default; an
    /// effective value of zero disables retrying (fail fast).
    pub retries: Option<u32>,
    pub initial_backoff_delay: Option<Duration>,
    pub backoff_coefficient: Option<f64>,
    pub timeout_coefficient: Option<f64>,
    pub cacheable: CacheTier,
    pub memoizable: bool,
    /// Unit-of-work memo map; collapse only happens when both this and
    /// `memoizable` are set.
    pub memo: Option<MemoMap>,
    /// When present, identical concurrent calls collapse process-wide.
    pub inflight_key: Option<InflightKeyFn>,
    pub metric_label: String,
    /// Treat an upstream 404 as a successful null result.
    pub null_if_not_found: bool,
    /// Honored for safe methods only; ignored otherwise.
    pub cancellation: Option<CancellationToken>,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            headers: Vec::new(),
            body: None,
            timeout: None,
            retries: None,
            initial_backoff_delay: None,
            backoff_coefficient: None,
            timeout_coefficient: None,
            cacheable: CacheTier::None,
            memoizable: false,
            memo: None,
            inflight_key: None,
            metric_label: String::from("unlabeled"),
            null_if_not_found: false,
            cancellation: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        let mut spec = Self::new(Method::POST, path);
        spec.body = Some(body.into());
        spec
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn backoff(mut self, initial: Duration, coefficient: f64) -> Self {
        self.initial_backoff_delay = Some(initial);
        self.backoff_coefficient = Some(coefficient);
        self
    }

    pub fn timeout_coefficient(mut self, coefficient: f64) -> Self {
        self.timeout_coefficient = Some(coefficient);
        self
    }

    pub fn cacheable(mut self, tier: CacheTier) -> Self {
        self.cacheable = tier;
        self
    }

    /// Collapse repeated identical calls within the given unit of work.
    pub fn memoize(mut self, memo: &MemoMap) -> Self {
        self.memoizable = true;
        self.memo = Some(memo.clone());
        self
    }

    /// Collapse identical concurrent calls process-wide under the key
    /// computed by `f`.
    pub fn inflight_key<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestSpec) -> String + Send + Sync + 'static,
    {
        self.inflight_key = Some(Arc::new(f));
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.metric_label = label.into();
        self
    }

    pub fn null_if_not_found(mut self) -> Self {
        self.null_if_not_found = true;
        self
    }

    pub fn cancellable(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

impl fmt::Debug for RequestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSpec")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("params", &self.params)
            .field("cacheable", &self.cacheable)
            .field("memoizable", &self.memoizable)
            .field("retries", &self.retries)
            .field("metric_label", &self.metric_label)
            .field("null_if_not_found", &self.null_if_not_found)
            .finish_non_exhaustive()
    }
}

/// The response handed back to callers.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// `None` is the null result produced by the 404-as-null policy.
    pub body: Option<Bytes>,
    pub cache_state: CacheState,
}

impl UpstreamResponse {
    /// A successful null result (404-as-null policy).
    pub fn null(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: None,
            cache_state: CacheState::Miss,
        }
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let body = self
            .body
            .as_ref()
            .ok_or_else(|| Error::InvalidRequest("response has no body to decode".into()))?;
        serde_json::from_slice(body)
            .map_err(|e| Error::InvalidRequest(format!("body is not valid JSON: {e}")))
    }
}

/// Mutable per-invocation state derived from a [`RequestSpec`].
///
/// One context exists per logical call, owned exclusively by the
/// pipeline invocation that created it. Stages decorate it on the way
/// down; short-circuiting stages drop it.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub spec: Arc<RequestSpec>,
    pub method: Method,
    /// Resolved by the defaults stage; `None` before stage 1 runs.
    pub url: Option<Url>,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub timeout: Duration,
    pub retries: u32,
    pub initial_backoff: Duration,
    pub backoff_coefficient: f64,
    pub timeout_coefficient: f64,
    /// Canonical cache key; empty before the defaults stage runs.
    pub cache_key: String,
    /// ETag validator attached by a cache stage holding a stale entry.
    pub validator: Option<String>,
}

impl CallContext {
    pub fn new(spec: Arc<RequestSpec>) -> Self {
        Self {
            method: spec.method.clone(),
            body: spec.body.clone(),
            url: None,
            headers: HeaderMap::new(),
            timeout: Duration::from_secs(30),
            retries: 0,
            initial_backoff: Duration::from_millis(200),
            backoff_coefficient: 2.0,
            timeout_coefficient: 1.0,
            cache_key: String::new(),
            validator: None,
            spec,
        }
    }
}

/// Canonical cache key: scheme, authority, path, and query pairs sorted
/// so that parameter order never splits the cache.
pub fn canonical_cache_key(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    let mut key = format!("{}://{}{}", url.scheme(), url.authority(), url.path());
    for (i, (k, v)) in pairs.iter().enumerate() {
        key.push(if i == 0 { '?' } else { '&' });
        key.push_str(k);
        key.push('=');
        key.push_str(v);
    }
    key
}

/// Convert loosely-typed header pairs into a `HeaderMap`, rejecting
/// values that cannot appear on the wire.
pub fn build_header_map(pairs: &[(String, String)]) -> Result<HeaderMap, Error> {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        let name = HeaderName::try_from(name.as_str())
            .map_err(|_| Error::InvalidRequest(format!("invalid header name: {name}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::InvalidRequest(format!("invalid header value for {name}")))?;
        map.insert(name, value);
    }
    Ok(map)
}
