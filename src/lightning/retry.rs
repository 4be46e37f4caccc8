use std::time::Duration;

pub const INITIAL_DELAY_MS: u64 = 1000;
pub const MAX_DELAY_MS: u64 = 5000;

/// Delay to wait after the given failed attempt (1-based) before the next one:
/// `min(1000 * 2^(attempt - 1), 5000)` milliseconds.
pub fn backoff_delay(attempt: u32) -> Duration {
    // Past 2^3 the cap always wins, keep the shift small
    let exponent = attempt.saturating_sub(1).min(16);
    let delay_ms = INITIAL_DELAY_MS
        .saturating_mul(1u64 << exponent)
        .min(MAX_DELAY_MS);
    Duration::from_millis(delay_ms)
}
