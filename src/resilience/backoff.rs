//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Delay to sleep before the given attempt (1-indexed, so the first
/// retry is attempt 2 and waits the initial delay once grown).
///
/// The base delay grows geometrically and up to 20% jitter is added on
/// top, so a herd of callers that failed together does not retry in
/// lockstep.
pub fn calculate_backoff(attempt: u32, initial: Duration, coefficient: f64) -> Duration {
    if attempt <= 1 {
        return Duration::ZERO;
    }

    let growth = coefficient.max(1.0).powi(attempt as i32 - 2);
    let base_ms = initial.as_millis() as f64 * growth;
    let jitter = rand::thread_rng().gen_range(0.0..0.2);

    Duration::from_millis((base_ms * (1.0 + jitter)) as u64)
}
