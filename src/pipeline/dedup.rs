//! Collapse stages: memoization and single-flight.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::debug;

use super::{Next, Outcome, Stage};
use crate::dedup::InflightRegistry;
use crate::observability::metrics;
use crate::request::{CacheState, CallContext};

/// Identity of a call for collapse purposes: method, canonical URL,
/// and body content. Two calls with this key equal are assumed to be
/// the same call.
fn collapse_key(ctx: &CallContext) -> String {
    let mut key = format!("{} {}", ctx.method, ctx.cache_key);
    if let Some(body) = &ctx.body {
        key.push(' ');
        key.push_str(blake3::hash(body).to_hex().as_str());
    }
    key
}

/// Replays identical calls within the caller's unit of work. Inactive
/// unless the spec opted in and carries a memo scope.
pub struct MemoStage;

impl Stage for MemoStage {
    fn handle(&self, ctx: CallContext, next: Next) -> BoxFuture<'static, Outcome> {
        let memo = match &ctx.spec.memo {
            Some(memo) if ctx.spec.memoizable => memo.clone(),
            _ => return next.run(ctx),
        };

        let key = collapse_key(&ctx);
        let label = ctx.spec.metric_label.clone();
        Box::pin(async move {
            let (outcome, replayed) = memo.run_memoized(&key, move || next.run(ctx)).await;
            if replayed {
                debug!(key, "replayed memoized call");
                metrics::record_dedup_join("memo", &label);
                return outcome.map(|mut response| {
                    response.cache_state = CacheState::Memoized;
                    response
                });
            }
            outcome
        })
    }
}

/// Joins identical concurrent calls process-wide. Inactive unless the
/// spec supplies an in-flight key function.
pub struct SingleFlightStage {
    pub registry: Arc<InflightRegistry>,
}

impl Stage for SingleFlightStage {
    fn handle(&self, ctx: CallContext, next: Next) -> BoxFuture<'static, Outcome> {
        let key_fn = match &ctx.spec.inflight_key {
            Some(key_fn) => key_fn.clone(),
            None => return next.run(ctx),
        };

        let registry = self.registry.clone();
        let key = key_fn(&ctx.spec);
        let label = ctx.spec.metric_label.clone();
        Box::pin(async move {
            let (outcome, joined) = registry.run_coalesced(&key, move || next.run(ctx)).await;
            if joined {
                metrics::record_dedup_join("inflight", &label);
                return outcome.map(|mut response| {
                    response.cache_state = CacheState::Inflight;
                    response
                });
            }
            outcome
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use http::StatusCode;

    use crate::dedup::MemoMap;
    use crate::pipeline::Pipeline;
    use crate::request::{RequestSpec, UpstreamResponse};

    struct CountingTerminal {
        executions: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl Stage for CountingTerminal {
        fn handle(&self, _ctx: CallContext, _next: Next) -> BoxFuture<'static, Outcome> {
            let executions = self.executions.clone();
            let delay = self.delay;
            Box::pin(async move {
                executions.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Ok(UpstreamResponse::null(StatusCode::OK))
            })
        }
    }

    #[tokio::test]
    async fn test_memo_stage_replays_within_scope() {
        let executions = Arc::new(AtomicUsize::new(0));
        let pipeline = Arc::new(Pipeline::new(vec![
            Arc::new(MemoStage),
            Arc::new(CountingTerminal { executions: executions.clone(), delay: Duration::ZERO }),
        ]));

        let memo = MemoMap::new();
        for round in 0..3 {
            let spec = RequestSpec::get("/items").memoize(&memo);
            let mut ctx = CallContext::new(Arc::new(spec));
            ctx.cache_key = "http://api/items".into();
            let response = pipeline.execute(ctx).await.unwrap();
            if round > 0 {
                assert_eq!(response.cache_state, CacheState::Memoized);
            }
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_memo_stage_distinguishes_bodies() {
        let executions = Arc::new(AtomicUsize::new(0));
        let pipeline = Arc::new(Pipeline::new(vec![
            Arc::new(MemoStage),
            Arc::new(CountingTerminal { executions: executions.clone(), delay: Duration::ZERO }),
        ]));

        let memo = MemoMap::new();
        for body in ["alpha", "beta"] {
            let spec = RequestSpec::post("/items", body).memoize(&memo);
            let mut ctx = CallContext::new(Arc::new(spec));
            ctx.cache_key = "http://api/items".into();
            pipeline.execute(ctx).await.unwrap();
        }
        assert_eq!(executions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_memo_stage_inactive_without_opt_in() {
        let executions = Arc::new(AtomicUsize::new(0));
        let pipeline = Arc::new(Pipeline::new(vec![
            Arc::new(MemoStage),
            Arc::new(CountingTerminal { executions: executions.clone(), delay: Duration::ZERO }),
        ]));

        for _ in 0..2 {
            let ctx = CallContext::new(Arc::new(RequestSpec::get("/items")));
            pipeline.execute(ctx).await.unwrap();
        }
        assert_eq!(executions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_single_flight_collapses_concurrent_calls() {
        let executions = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(InflightRegistry::new());
        let pipeline = Arc::new(Pipeline::new(vec![
            Arc::new(SingleFlightStage { registry }),
            Arc::new(CountingTerminal {
                executions: executions.clone(),
                delay: Duration::from_millis(50),
            }),
        ]));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    let spec = RequestSpec::get("/items")
                        .inflight_key(|spec| format!("GET {}", spec.path));
                    pipeline.execute(CallContext::new(Arc::new(spec))).await
                })
            })
            .collect();

        let mut joined = 0;
        for task in tasks {
            let response = task.await.unwrap().unwrap();
            if response.cache_state == CacheState::Inflight {
                joined += 1;
            }
        }

        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(joined, 3, "one leader, three joiners");
    }

    #[tokio::test]
    async fn test_single_flight_sequential_calls_execute_each_time() {
        let executions = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(InflightRegistry::new());
        let pipeline = Arc::new(Pipeline::new(vec![
            Arc::new(SingleFlightStage { registry }),
            Arc::new(CountingTerminal { executions: executions.clone(), delay: Duration::ZERO }),
        ]));

        for _ in 0..2 {
            let spec =
                RequestSpec::get("/items").inflight_key(|spec| format!("GET {}", spec.path));
            pipeline
                .execute(CallContext::new(Arc::new(spec)))
                .await
                .unwrap();
        }
        assert_eq!(executions.load(Ordering::SeqCst), 2);
    }
}
