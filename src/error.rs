//! Error taxonomy for the request engine.
//!
//! # Design Decisions
//! - Every variant is `Clone`: a deduplicated call replays its error
//!   verbatim to all waiting callers, so errors must be shareable.
//!   Underlying I/O and hyper errors are flattened to strings at the
//!   boundary (they hold sockets and are neither `Clone` nor
//!   serializable).
//! - Cache backend failures never reach callers through `execute`;
//!   backends degrade to a miss and count the failure internally.

use bytes::Bytes;
use thiserror::Error;

/// Errors surfaced by [`Client::execute`](crate::client::Client::execute).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Connection reset, DNS failure, abort, or per-attempt timeout.
    /// Always considered retryable.
    #[error("transient network failure: {message}")]
    TransientNetwork { message: String },

    /// The upstream reported a gateway timeout, either as a 504 status
    /// or as a sentinel in a 5xx body. Retryable.
    #[error("upstream gateway timeout")]
    UpstreamTimeout,

    /// A 4xx response. Never retried; surfaced as-is unless the
    /// 404-as-null policy applies.
    #[error("client error: upstream returned status {status}")]
    ClientRequest { status: u16, body: Bytes },

    /// A 5xx response. Retried only for idempotent methods with a
    /// configured retry budget.
    #[error("server error: upstream returned status {status}")]
    ServerResponse { status: u16, body: Bytes },

    /// Disk or serialization failure inside a cache backend. Swallowed
    /// by the cache layers (treated as a miss); kept in the taxonomy
    /// for backends exposed directly to embedders.
    #[error("cache backend failure: {0}")]
    CacheBackend(String),

    /// The request spec could not be turned into a sendable request
    /// (bad path, unparsable header, missing terminal stage).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// The upstream HTTP status attached to this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::ClientRequest { status, .. } | Error::ServerResponse { status, .. } => {
                Some(*status)
            }
            Error::UpstreamTimeout => Some(504),
            _ => None,
        }
    }
}
