//! Exponential backoff.

use std::time::Duration;
use rand::Rng;

/// Delay before retrying after failed attempt `attempt` (0-based):
/// `base_ms × 2^attempt`, capped at `max_ms`.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exponential_base = 2u64.saturating_pow(attempt);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    Duration::from_millis(delay_ms.min(max_ms))
}

/// Add up to 10% random jitter to a delay.
pub fn with_jitter(delay: Duration) -> Duration {
    let millis = delay.as_millis() as u64;
    let jitter_range = millis / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };
    Duration::from_millis(millis + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        assert_eq!(calculate_backoff(0, 1000, 60_000), Duration::from_millis(1000));
        assert_eq!(calculate_backoff(1, 1000, 60_000), Duration::from_millis(2000));
        assert_eq!(calculate_backoff(2, 1000, 60_000), Duration::from_millis(4000));
        assert_eq!(calculate_backoff(10, 1000, 5000), Duration::from_millis(5000));
    }

    #[test]
    fn test_backoff_saturates() {
        assert_eq!(calculate_backoff(80, u64::MAX / 2, u64::MAX), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_jitter_bounds() {
        for _ in 0..50 {
            let d = with_jitter(Duration::from_millis(1000));
            assert!(d >= Duration::from_millis(1000));
            assert!(d < Duration::from_millis(1100));
        }
        assert_eq!(with_jitter(Duration::from_millis(5)), Duration::from_millis(5));
    }
}
