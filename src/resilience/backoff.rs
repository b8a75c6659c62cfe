//! Exponential backoff with jitter.
//!
//! Used for per-record redelivery delays and supervisor restarts.

use std::time::Duration;

use rand::Rng;

/// Delay before attempt number `attempt` (1-based). Attempt 0 is immediate.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponent = (attempt - 1).min(63);
    let delay_ms = base_ms.saturating_mul(1u64 << exponent);
    let capped = delay_ms.min(max_ms);

    // Up to 10% jitter on top of the capped delay
    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}
