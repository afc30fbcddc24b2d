//! Cached HTTP response entries and freshness rules.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};

use crate::request::{CacheState, UpstreamResponse};

/// One cached response.
///
/// An entry is only ever replaced whole; there are no partial updates.
/// Entries with neither a validator nor a bounded lifetime are never
/// constructed ([`CacheEntry::from_response`] returns `None`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub etag: Option<String>,
    /// Absolute expiry, milliseconds since the Unix epoch.
    pub expires_at_ms: u64,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl CacheEntry {
    /// Build an entry from a successful response, if it is cacheable.
    ///
    /// Requires an `ETag` or a positive `max-age`: without either there
    /// is nothing to validate against and nothing bounding the entry's
    /// lifetime, so storing it would serve stale data forever.
    pub fn from_response(response: &UpstreamResponse) -> Option<CacheEntry> {
        let body = response.body.as_ref()?;
        let etag = response
            .headers
            .get(http::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let max_age = max_age(&response.headers);

        if etag.is_none() && max_age.unwrap_or(Duration::ZERO).is_zero() {
            return None;
        }

        Some(CacheEntry {
            etag,
            expires_at_ms: now_ms() + max_age.unwrap_or(Duration::ZERO).as_millis() as u64,
            status: response.status.as_u16(),
            headers: headermap_to_vec(&response.headers),
            body: body.clone(),
        })
    }

    pub fn is_fresh(&self) -> bool {
        now_ms() < self.expires_at_ms
    }

    /// Re-arm the expiry after a `304 Not Modified` revalidation.
    pub fn refresh(&mut self, max_age: Duration) {
        self.expires_at_ms = now_ms() + max_age.as_millis() as u64;
    }

    /// Time until expiry, if the entry is still fresh.
    pub fn remaining_ttl(&self) -> Option<Duration> {
        let now = now_ms();
        (self.expires_at_ms > now).then(|| Duration::from_millis(self.expires_at_ms - now))
    }

    /// Rebuild the response this entry was stored from.
    pub fn into_response(self, cache_state: CacheState) -> UpstreamResponse {
        UpstreamResponse {
            status: StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
            headers: vec_to_headermap(&self.headers),
            body: Some(self.body),
            cache_state,
        }
    }
}

/// Parse `Cache-Control: max-age=N` from response headers.
pub fn max_age(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(http::header::CACHE_CONTROL)?.to_str().ok()?;
    for directive in value.split(',') {
        if let Some(seconds) = directive.trim().strip_prefix("max-age=") {
            return seconds.trim().parse::<u64>().ok().map(Duration::from_secs);
        }
    }
    None
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub fn headermap_to_vec(map: &HeaderMap) -> Vec<(String, String)> {
    let mut items = Vec::new();
    for (name, value) in map.iter() {
        if let Ok(value) = value.to_str() {
            items.push((name.as_str().to_string(), value.to_string()));
        }
    }
    items
}

pub fn vec_to_headermap(items: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in items {
        if let (Ok(name), Ok(value)) = (
            http::header::HeaderName::try_from(name.as_str()),
            http::HeaderValue::from_str(value),
        ) {
            map.append(name, value);
        }
    }
    map
}
