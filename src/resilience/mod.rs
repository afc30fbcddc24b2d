//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Attempt fails:
//!     → retries.rs (classify the failure, check if retryable)
//!     → backoff.rs (compute the delay before the next attempt)
//!     → timeout scaling (stretch the per-attempt deadline)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every attempt has a deadline
//! - Server errors retry only for idempotent methods; network faults
//!   and gateway timeouts retry regardless
//! - Attempt numbering starts at 1; a retry budget of R allows R+1
//!   attempts in total

pub mod backoff;
pub mod retries;

pub use backoff::calculate_backoff;
pub use retries::{classify_response, is_retryable, scaled_timeout};
