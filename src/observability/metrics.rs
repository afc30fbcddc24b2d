//! Metric emission points.
//!
//! All counters funnel through here so the metric names stay in one
//! place. With no recorder installed the macros are no-ops.

use std::time::Duration;

use metrics::{counter, histogram};

use crate::request::CacheState;

/// One completed call, however it was served.
pub fn record_request(label: &str, cache_state: CacheState, status: Option<u16>, elapsed: Duration) {
    counter!(
        "upcall_requests_total",
        "label" => label.to_string(),
        "cache_state" => cache_state.as_str(),
    )
    .increment(1);
    histogram!("upcall_request_duration_seconds", "label" => label.to_string())
        .record(elapsed.as_secs_f64());

    if status.is_none_or(|status| status >= 400) {
        counter!(
            "upcall_request_errors_total",
            "label" => label.to_string(),
            "status" => status.map(|s| s.to_string()).unwrap_or_else(|| "none".into()),
        )
        .increment(1);
    }
}

pub fn record_cache_eviction(tier: &'static str) {
    counter!("upcall_cache_evictions_total", "tier" => tier).increment(1);
}

/// The upstream itself answered from its own cache.
pub fn record_upstream_cache_hit(label: &str) {
    counter!("upcall_upstream_cache_hits_total", "label" => label.to_string()).increment(1);
}

/// A call was absorbed by single-flight or memoization instead of
/// executing.
pub fn record_dedup_join(kind: &'static str, label: &str) {
    counter!(
        "upcall_dedup_joins_total",
        "kind" => kind,
        "label" => label.to_string(),
    )
    .increment(1);
}

pub fn record_retry(label: &str) {
    counter!("upcall_retries_total", "label" => label.to_string()).increment(1);
}
