//! The staged execution pipeline.
//!
//! # Data Flow
//! ```text
//! execute(spec):
//!     → defaults.rs   (resolve URL, headers, timeouts, cache key)
//!     → observe.rs    (span, timing, recorder hook)
//!     → dedup.rs      (memoization, then single-flight)
//!     → not_found.rs  (404-as-null, empty-body normalization)
//!     → cache.rs      (memory tier, then disk tier)
//!     → upstream_cache.rs (classify upstream-served cache hits)
//!     → terminal.rs   (concurrency gate, retry loop, transport)
//! ```
//!
//! # Design Decisions
//! - Stages receive the context by value and hand it to the rest of
//!   the chain through [`Next`]; a stage that short-circuits simply
//!   never calls `next.run`.
//! - `handle` returns an owned boxed future so a stage's work can be
//!   shared between callers (the dedup stages wrap it in `Shared`).

pub mod cache;
pub mod dedup;
pub mod defaults;
pub mod not_found;
pub mod observe;
pub mod terminal;
pub mod upstream_cache;

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::Error;
use crate::request::{CallContext, UpstreamResponse};

/// What one logical call resolves to.
pub type Outcome = Result<UpstreamResponse, Error>;

/// One link in the execution chain.
pub trait Stage: Send + Sync {
    fn handle(&self, ctx: CallContext, next: Next) -> BoxFuture<'static, Outcome>;
}

/// Handle to the remainder of the chain after the current stage.
#[derive(Clone)]
pub struct Next {
    stages: Arc<[Arc<dyn Stage>]>,
    index: usize,
}

impl Next {
    pub fn run(self, ctx: CallContext) -> BoxFuture<'static, Outcome> {
        match self.stages.get(self.index).cloned() {
            Some(stage) => {
                let next = Next {
                    stages: self.stages,
                    index: self.index + 1,
                };
                stage.handle(ctx, next)
            }
            None => Box::pin(async {
                Err(Error::InvalidRequest(
                    "pipeline ended without a terminal stage".into(),
                ))
            }),
        }
    }
}

/// An ordered, immutable chain of stages.
pub struct Pipeline {
    stages: Arc<[Arc<dyn Stage>]>,
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self { stages: stages.into() }
    }

    pub async fn execute(&self, ctx: CallContext) -> Outcome {
        Next { stages: self.stages.clone(), index: 0 }.run(ctx).await
    }
}
