//! Unit-of-work memoization.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use super::SharedCall;
use crate::pipeline::Outcome;

/// Caller-owned memo scope.
///
/// Unlike the in-flight registry, results stay in the map after the
/// call settles: a later identical call within the same unit of work
/// replays the stored outcome instead of going out again. The caller
/// bounds the lifetime by dropping the map (or cloning it into exactly
/// the scope that should share results).
#[derive(Clone, Default)]
pub struct MemoMap {
    calls: Arc<DashMap<String, SharedCall>>,
}

impl MemoMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Forget every memoized call, forcing fresh executions.
    pub fn clear(&self) {
        self.calls.clear();
    }

    /// Run `make()` under `key`, or replay the call already recorded
    /// for it. Returns the outcome and whether it was replayed.
    pub async fn run_memoized<F>(&self, key: &str, make: F) -> (Outcome, bool)
    where
        F: FnOnce() -> BoxFuture<'static, Outcome>,
    {
        let (shared, replayed) = match self.calls.entry(key.to_string()) {
            Entry::Occupied(occupied) => (occupied.get().clone(), true),
            Entry::Vacant(vacant) => {
                let shared = make().shared();
                vacant.insert(shared.clone());
                (shared, false)
            }
        };
        (shared.await, replayed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http::StatusCode;

    use crate::request::UpstreamResponse;

    fn ok_response() -> Outcome {
        Ok(UpstreamResponse::null(StatusCode::OK))
    }

    #[tokio::test]
    async fn test_second_call_replays_without_executing() {
        let memo = MemoMap::new();
        let executions = Arc::new(AtomicUsize::new(0));

        for round in 0..3 {
            let executions = executions.clone();
            let (outcome, replayed) = memo
                .run_memoized("k", move || {
                    Box::pin(async move {
                        executions.fetch_add(1, Ordering::SeqCst);
                        ok_response()
                    })
                })
                .await;
            assert!(outcome.is_ok());
            assert_eq!(replayed, round > 0);
        }

        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(memo.len(), 1);
    }

    #[tokio::test]
    async fn test_errors_are_memoized_too() {
        let memo = MemoMap::new();
        let executions = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let executions = executions.clone();
            let (outcome, _) = memo
                .run_memoized("k", move || {
                    Box::pin(async move {
                        executions.fetch_add(1, Ordering::SeqCst);
                        Err(crate::error::Error::UpstreamTimeout)
                    })
                })
                .await;
            assert!(matches!(outcome, Err(crate::error::Error::UpstreamTimeout)));
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear_forces_fresh_execution() {
        let memo = MemoMap::new();
        let executions = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let executions = executions.clone();
            memo.run_memoized("k", move || {
                Box::pin(async move {
                    executions.fetch_add(1, Ordering::SeqCst);
                    ok_response()
                })
            })
            .await;
            memo.clear();
        }
        assert_eq!(executions.load(Ordering::SeqCst), 2);
        assert!(memo.is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_one_scope() {
        let memo = MemoMap::new();
        let twin = memo.clone();
        let executions = Arc::new(AtomicUsize::new(0));

        {
            let executions = executions.clone();
            memo.run_memoized("k", move || {
                Box::pin(async move {
                    executions.fetch_add(1, Ordering::SeqCst);
                    ok_response()
                })
            })
            .await;
        }
        let (outcome, replayed) = twin
            .run_memoized("k", || Box::pin(async { ok_response() }))
            .await;
        assert!(outcome.is_ok());
        assert!(replayed);
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }
}
