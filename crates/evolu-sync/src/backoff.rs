//! Exponential backoff with jitter for transport/protocol retries.

use std::time::Duration;

use rand::Rng;

/// First retry delay.
pub const INITIAL_DELAY_MS: u64 = 100;
/// Multiplier applied per attempt.
pub const FACTOR: u32 = 2;
/// Delay never exceeds this, before jitter.
pub const MAX_DELAY_MS: u64 = 10_000;
/// Jitter applied as a fraction of the computed delay, plus or minus.
pub const JITTER_FRACTION: f64 = 0.10;

/// `min(INITIAL_DELAY_MS * FACTOR^(attempt-1), MAX_DELAY_MS)`, jittered by
/// `±JITTER_FRACTION`. `attempt` is 1-based; `attempt == 0` is treated as 1.
pub fn delay_for_attempt(attempt: u32) -> Duration {
    jittered(base_delay_ms(attempt))
}

fn base_delay_ms(attempt: u32) -> u64 {
    let attempt = attempt.max(1) - 1;
    INITIAL_DELAY_MS.saturating_mul(FACTOR.saturating_pow(attempt) as u64).min(MAX_DELAY_MS)
}

fn jittered(base_ms: u64) -> Duration {
    let spread = (base_ms as f64 * JITTER_FRACTION) as i64;
    let offset = if spread == 0 { 0 } else { rand::thread_rng().gen_range(-spread..=spread) };
    let millis = (base_ms as i64 + offset).max(0) as u64;
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_is_roughly_the_initial_delay() {
        let d = delay_for_attempt(1).as_millis();
        assert!((90..=110).contains(&d), "got {d}");
    }

    #[test]
    fn doubles_each_attempt_up_to_the_cap() {
        let a2 = base_delay_ms(2);
        let a3 = base_delay_ms(3);
        assert_eq!(a2, INITIAL_DELAY_MS * 2);
        assert_eq!(a3, INITIAL_DELAY_MS * 4);
    }

    #[test]
    fn never_exceeds_the_cap_before_jitter() {
        assert_eq!(base_delay_ms(100), MAX_DELAY_MS);
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        for attempt in 1..8 {
            let base = base_delay_ms(attempt) as i64;
            let observed = delay_for_attempt(attempt).as_millis() as i64;
            let spread = (base as f64 * JITTER_FRACTION).ceil() as i64 + 1;
            assert!((observed - base).abs() <= spread, "attempt {attempt}: base {base} observed {observed}");
        }
    }
}
