//! Absence-as-success policies.

use futures_util::future::BoxFuture;
use http::StatusCode;

use super::{Next, Outcome, Stage};
use crate::error::Error;
use crate::request::{CallContext, UpstreamResponse};

/// Turns an upstream 404 into a successful null result for specs that
/// opted in. Sits above the cache tiers so a negative result coming
/// out of the chain is already in its final shape.
pub struct NotFoundStage;

impl Stage for NotFoundStage {
    fn handle(&self, ctx: CallContext, next: Next) -> BoxFuture<'static, Outcome> {
        if !ctx.spec.null_if_not_found {
            return next.run(ctx);
        }

        Box::pin(async move {
            match next.run(ctx).await {
                Err(Error::ClientRequest { status: 404, .. }) => {
                    Ok(UpstreamResponse::null(StatusCode::NOT_FOUND))
                }
                other => other,
            }
        })
    }
}

/// Normalizes successful responses with an empty body to the null
/// shape, so callers opted into the null policy see one representation
/// of "nothing there" regardless of how the upstream phrased it.
pub struct EmptyBodyStage;

impl Stage for EmptyBodyStage {
    fn handle(&self, ctx: CallContext, next: Next) -> BoxFuture<'static, Outcome> {
        if !ctx.spec.null_if_not_found {
            return next.run(ctx);
        }

        Box::pin(async move {
            next.run(ctx).await.map(|mut response| {
                if response.body.as_ref().is_some_and(|body| body.is_empty()) {
                    response.body = None;
                }
                response
            })
        })
    }
}
