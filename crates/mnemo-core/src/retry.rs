//! Exponential backoff policy for per-item retries.

use std::time::Duration;

/// Backoff schedule: `min(base * 2^retry_count, max)`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Delay before the attempt following `retry_count` failures.
    /// Saturates at `max_delay` rather than overflowing for large
    /// counts.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let factor = 1u64.checked_shl(retry_count).unwrap_or(u64::MAX);
        let delay_ms = base_ms
            .saturating_mul(factor)
            .min(self.max_delay.as_millis() as u64);
        Duration::from_millis(delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let policy = RetryPolicy::default();
        let expected = [1000u64, 2000, 4000, 8000, 16000, 30000, 30000];
        for (count, want) in expected.iter().enumerate() {
            assert_eq!(
                policy.delay_for(count as u32),
                Duration::from_millis(*want),
                "retry_count = {}",
                count
            );
        }
    }

    #[test]
    fn delays_are_monotonic() {
        let policy = RetryPolicy::default();
        let mut previous = Duration::ZERO;
        for count in 0..20 {
            let delay = policy.delay_for(count);
            assert!(delay >= previous);
            previous = delay;
        }
    }

    #[test]
    fn huge_counts_saturate_at_max() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(63), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for(200), Duration::from_millis(30_000));
    }
}
