//! Observability surface.
//!
//! # Responsibilities
//! - Define the per-call [`Recorder`] hook embedders can implement
//! - Define the [`HeaderSink`] hook for response-header capture
//! - Emit process-wide metrics through the `metrics` facade
//!
//! # Design Decisions
//! - Hooks are synchronous and infallible: they run inline on the
//!   request path, so anything slow or fallible belongs behind a
//!   channel inside the implementation, not here.

pub mod metrics;

use std::time::Duration;

use http::HeaderMap;

use crate::request::CacheState;

/// Invoked once per completed call with its timing and disposition.
pub trait Recorder: Send + Sync {
    fn record(&self, elapsed: Duration, status: Option<u16>, cache_state: CacheState, label: &str);
}

/// Recorder that drops everything. Installed when the embedder does
/// not supply one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl Recorder for NoopRecorder {
    fn record(&self, _: Duration, _: Option<u16>, _: CacheState, _: &str) {}
}

/// Receives the response headers of completed calls. Wired into the
/// pipeline only when configured, so unconfigured clients pay nothing.
pub trait HeaderSink: Send + Sync {
    fn observe(&self, label: &str, headers: &HeaderMap);
}
