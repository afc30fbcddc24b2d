//! The wire boundary.
//!
//! Everything above this module works with fully-buffered requests and
//! responses; [`Transport`] is the one seam that touches sockets. Tests
//! swap in a scripted implementation to exercise the pipeline without a
//! listener.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Request, StatusCode};
use http_body_util::{BodyExt, Full};

use crate::error::Error;
use crate::pool::ConnectionPoolRegistry;

/// A fully-buffered upstream response, before classification.
#[derive(Debug, Clone)]
pub struct TransportReply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// One attempt on the wire. `timeout` covers the whole attempt,
/// including reading the body to completion.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: Request<Full<Bytes>>,
        timeout: Duration,
    ) -> Result<TransportReply, Error>;
}

/// Production transport over the pooled hyper client.
pub struct HyperTransport {
    pool: Arc<ConnectionPoolRegistry>,
}

impl HyperTransport {
    pub fn new(pool: Arc<ConnectionPoolRegistry>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(
        &self,
        request: Request<Full<Bytes>>,
        timeout: Duration,
    ) -> Result<TransportReply, Error> {
        let attempt = async {
            let response = self
                .pool
                .http_client()
                .request(request)
                .await
                .map_err(|e| Error::TransientNetwork { message: e.to_string() })?;

            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| Error::TransientNetwork {
                    message: format!("body read failed: {e}"),
                })?
                .to_bytes();

            Ok(TransportReply {
                status: parts.status,
                headers: parts.headers,
                body,
            })
        };

        match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(Error::TransientNetwork {
                message: format!("attempt exceeded its {}ms deadline", timeout.as_millis()),
            }),
        }
    }
}
