//! Keep-alive connection pool and its accounting.
//!
//! # Responsibilities
//! - Own the lazily-built HTTP client whose connector keeps sockets
//!   alive between calls
//! - Track active, idle, and pending request counts for observability
//!
//! # Design Decisions
//! - The client is built on first use, not at registry construction,
//!   so a registry can be created in sync code (config load, tests)
//!   without a runtime handle.
//! - Idle accounting is capped at the configured per-host idle limit.
//!   The pool inside the client does not expose its internals, so the
//!   counters track what the engine handed it, not kernel socket
//!   state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

/// Socket reuse knobs, resolved from configuration.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// TCP keep-alive probe interval on pooled sockets.
    pub keepalive: Duration,
    /// How long an idle socket may sit in the pool before being closed.
    pub idle_timeout: Duration,
    /// Idle sockets retained per upstream host.
    pub max_idle_per_host: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            keepalive: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(60),
            max_idle_per_host: 32,
        }
    }
}

/// Point-in-time view of pool occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionPoolStats {
    /// Requests currently on a socket.
    pub active_sockets: usize,
    /// Sockets handed back and presumed reusable.
    pub idle_sockets: usize,
    /// Requests admitted but waiting for capacity.
    pub pending_requests: usize,
}

/// Owns the pooled HTTP client and the occupancy counters around it.
pub struct ConnectionPoolRegistry {
    settings: PoolSettings,
    client: OnceLock<Client<HttpConnector, Full<Bytes>>>,
    active: AtomicUsize,
    idle: AtomicUsize,
    pending: AtomicUsize,
}

impl ConnectionPoolRegistry {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            settings,
            client: OnceLock::new(),
            active: AtomicUsize::new(0),
            idle: AtomicUsize::new(0),
            pending: AtomicUsize::new(0),
        }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// The pooled client, built on first use.
    pub fn http_client(&self) -> &Client<HttpConnector, Full<Bytes>> {
        self.client.get_or_init(|| {
            let mut connector = HttpConnector::new();
            connector.set_keepalive(Some(self.settings.keepalive));
            connector.set_nodelay(true);
            Client::builder(TokioExecutor::new())
                .pool_idle_timeout(self.settings.idle_timeout)
                .pool_max_idle_per_host(self.settings.max_idle_per_host)
                .build(connector)
        })
    }

    /// A request was admitted and is waiting for a concurrency slot.
    pub fn begin_wait(&self) {
        self.pending.fetch_add(1, Ordering::Relaxed);
    }

    /// A waiting request acquired a slot and is going on the wire.
    pub fn begin_request(&self) {
        self.pending.fetch_sub(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
        // The request either reuses an idle socket or dials a new one;
        // assume reuse while any idle socket is tracked.
        let _ = self
            .idle
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |idle| {
                idle.checked_sub(1)
            });
    }

    /// A request finished and its socket returned to the pool.
    pub fn finish_request(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        let cap = self.settings.max_idle_per_host;
        let _ = self
            .idle
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |idle| {
                (idle < cap).then_some(idle + 1)
            });
    }

    pub fn stats(&self) -> ConnectionPoolStats {
        ConnectionPoolStats {
            active_sockets: self.active.load(Ordering::Relaxed),
            idle_sockets: self.idle.load(Ordering::Relaxed),
            pending_requests: self.pending.load(Ordering::Relaxed),
        }
    }
}

impl Default for ConnectionPoolRegistry {
    fn default() -> Self {
        Self::new(PoolSettings::default())
    }
}
