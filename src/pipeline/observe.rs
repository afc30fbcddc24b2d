//! Observation stages: spans, timing, recorder and header hooks.

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::BoxFuture;
use tracing::{debug, info_span, Instrument};

use super::{Next, Outcome, Stage};
use crate::observability::{metrics, HeaderSink, Recorder};
use crate::request::CacheState;

/// Wraps the rest of the chain in a span and reports every completed
/// call to the metrics facade and the embedder's recorder.
pub struct ObserveStage {
    pub recorder: Arc<dyn Recorder>,
}

impl Stage for ObserveStage {
    fn handle(&self, ctx: crate::request::CallContext, next: Next) -> BoxFuture<'static, Outcome> {
        let recorder = self.recorder.clone();
        let label = ctx.spec.metric_label.clone();
        let span = info_span!(
            "outbound_call",
            label = %label,
            method = %ctx.method,
            path = %ctx.spec.path,
        );

        Box::pin(
            async move {
                let started = Instant::now();
                let outcome = next.run(ctx).await;
                let elapsed = started.elapsed();

                let (status, cache_state) = match &outcome {
                    Ok(response) => (Some(response.status.as_u16()), response.cache_state),
                    Err(error) => (error.status(), CacheState::Miss),
                };

                debug!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    status = status.unwrap_or(0),
                    cache_state = cache_state.as_str(),
                    ok = outcome.is_ok(),
                    "call finished"
                );
                metrics::record_request(&label, cache_state, status, elapsed);
                recorder.record(elapsed, status, cache_state, &label);

                outcome
            }
            .instrument(span),
        )
    }
}

/// Feeds response headers to the configured sink. Only present in the
/// chain when a sink is configured.
pub struct HeaderSinkStage {
    pub sink: Arc<dyn HeaderSink>,
}

impl Stage for HeaderSinkStage {
    fn handle(&self, ctx: crate::request::CallContext, next: Next) -> BoxFuture<'static, Outcome> {
        let sink = self.sink.clone();
        let label = ctx.spec.metric_label.clone();
        Box::pin(async move {
            let outcome = next.run(ctx).await;
            if let Ok(response) = &outcome {
                sink.observe(&label, &response.headers);
            }
            outcome
        })
    }
}
