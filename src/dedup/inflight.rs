//! Process-wide single-flight registry.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::debug;

use super::SharedCall;
use crate::pipeline::Outcome;

/// Collapses identical concurrent calls into one execution.
///
/// The first caller under a key becomes the leader and runs the real
/// call; everyone else awaits a shared handle to it. The entry removes
/// itself the moment the call settles, so a later call under the same
/// key starts fresh rather than replaying a stale result.
#[derive(Clone, Default)]
pub struct InflightRegistry {
    calls: Arc<DashMap<String, SharedCall>>,
}

impl InflightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls currently in flight.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Run `make()` under `key`, or join an execution already in
    /// flight. Returns the outcome and whether this caller joined
    /// rather than led.
    pub async fn run_coalesced<F>(&self, key: &str, make: F) -> (Outcome, bool)
    where
        F: FnOnce() -> BoxFuture<'static, Outcome>,
    {
        let (shared, joined) = match self.calls.entry(key.to_string()) {
            Entry::Occupied(occupied) => (occupied.get().clone(), true),
            Entry::Vacant(vacant) => {
                let calls = self.calls.clone();
                let owned_key = key.to_string();
                let inner = make();
                let wrapped: BoxFuture<'static, Outcome> = Box::pin(async move {
                    let outcome = inner.await;
                    calls.remove(&owned_key);
                    outcome
                });
                let shared = wrapped.shared();
                vacant.insert(shared.clone());
                (shared, false)
            }
        };

        if joined {
            debug!(key, "joined in-flight call");
        }
        (shared.await, joined)
    }
}
