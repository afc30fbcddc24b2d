//! Terminal stage: the concurrency gate, retry loop, and transport.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{header, HeaderValue, Request};
use http_body_util::Full;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use url::Url;

use super::{Next, Outcome, Stage};
use crate::error::Error;
use crate::observability::metrics;
use crate::pool::ConnectionPoolRegistry;
use crate::request::{CacheState, CallContext, UpstreamResponse};
use crate::resilience::{calculate_backoff, classify_response, is_retryable, scaled_timeout};
use crate::transport::Transport;

/// Drives attempts against the wire until one succeeds, the retry
/// budget is spent, or the failure is terminal.
///
/// A budget of R retries allows R+1 attempts. Each attempt waits for a
/// fair concurrency slot, so under load requests go out in arrival
/// order rather than racing for sockets. Cancellation is honored only
/// for safe methods; an unsafe request already on the wire may have
/// executed upstream, and abandoning it would hide that.
pub struct TerminalStage {
    pub transport: Arc<dyn Transport>,
    pub pool: Arc<ConnectionPoolRegistry>,
    pub limiter: Arc<Semaphore>,
}

impl TerminalStage {
    fn build_request(ctx: &CallContext, url: &Url) -> Result<Request<Full<Bytes>>, Error> {
        let mut request = Request::builder()
            .method(ctx.method.clone())
            .uri(url.as_str())
            .body(Full::new(ctx.body.clone().unwrap_or_default()))
            .map_err(|e| Error::InvalidRequest(format!("cannot build request: {e}")))?;

        *request.headers_mut() = ctx.headers.clone();
        if let Some(validator) = &ctx.validator {
            let value = HeaderValue::from_str(validator)
                .map_err(|_| Error::InvalidRequest("etag validator is not a valid header".into()))?;
            request.headers_mut().insert(header::IF_NONE_MATCH, value);
        }
        Ok(request)
    }

    async fn wait_or_cancel(
        delay: std::time::Duration,
        cancellation: Option<&CancellationToken>,
    ) -> Result<(), Error> {
        match cancellation {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(Error::TransientNetwork {
                    message: "call cancelled".into(),
                }),
                _ = tokio::time::sleep(delay) => Ok(()),
            },
            None => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

impl Stage for TerminalStage {
    fn handle(&self, ctx: CallContext, _next: Next) -> BoxFuture<'static, Outcome> {
        let transport = self.transport.clone();
        let pool = self.pool.clone();
        let limiter = self.limiter.clone();

        Box::pin(async move {
            let url = ctx
                .url
                .clone()
                .ok_or_else(|| Error::InvalidRequest("request url was never resolved".into()))?;
            let cancellation = ctx
                .spec
                .cancellation
                .clone()
                .filter(|_| ctx.method.is_safe());
            let label = ctx.spec.metric_label.clone();

            let mut attempt: u32 = 1;
            loop {
                let delay = calculate_backoff(attempt, ctx.initial_backoff, ctx.backoff_coefficient);
                if !delay.is_zero() {
                    Self::wait_or_cancel(delay, cancellation.as_ref()).await?;
                }

                let request = Self::build_request(&ctx, &url)?;
                let timeout = scaled_timeout(ctx.timeout, ctx.timeout_coefficient, attempt);

                pool.begin_wait();
                let permit = limiter
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| Error::InvalidRequest("concurrency limiter closed".into()))?;
                pool.begin_request();

                let result = match cancellation.as_ref() {
                    Some(token) => tokio::select! {
                        _ = token.cancelled() => {
                            pool.finish_request();
                            drop(permit);
                            return Err(Error::TransientNetwork {
                                message: "call cancelled".into(),
                            });
                        }
                        result = transport.send(request, timeout) => result,
                    },
                    None => transport.send(request, timeout).await,
                };
                pool.finish_request();
                drop(permit);

                let error = match result {
                    Ok(reply) => match classify_response(reply.status, &reply.body) {
                        None => {
                            return Ok(UpstreamResponse {
                                status: reply.status,
                                headers: reply.headers,
                                body: Some(reply.body),
                                cache_state: CacheState::Miss,
                            })
                        }
                        Some(error) => error,
                    },
                    Err(error) => error,
                };

                if attempt > ctx.retries || !is_retryable(&ctx.method, &error) {
                    return Err(error);
                }

                warn!(
                    attempt,
                    retries = ctx.retries,
                    error = %error,
                    "attempt failed, retrying"
                );
                metrics::record_retry(&label);
                attempt += 1;
            }
        })
    }
}
