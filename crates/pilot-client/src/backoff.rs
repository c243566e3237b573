//! Reconnect delay schedule.

use std::time::Duration;

/// Exponential backoff with a cap and a bounded number of attempts.
///
/// Retry `n` (1-based) waits `min(base * 2^(n-1), cap)`. Once more than
/// `max_attempts` retries have failed the channel gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay before the first retry.
    pub base: Duration,

    /// Upper bound on any single delay.
    pub cap: Duration,

    /// Number of retries before the channel is marked errored.
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(10),
            max_attempts: 5,
        }
    }
}

impl Backoff {
    /// Delay to wait before retry number `attempt` (1-based).
    ///
    /// Attempt 0 is treated as attempt 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Returns true once `attempt` exceeds the allowed number of retries.
    #[must_use]
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt > self.max_attempts
    }

    /// The full delay schedule, one entry per allowed retry.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.max_attempts).map(|attempt| self.delay_for(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_calculation() {
        let backoff = Backoff {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            max_attempts: 5,
        };

        let delays: Vec<u64> = backoff.schedule().map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn test_exponential_backoff_max_cap() {
        let backoff = Backoff::default();

        assert_eq!(backoff.delay_for(4), Duration::from_secs(8));
        assert_eq!(backoff.delay_for(5), Duration::from_secs(10));
        assert_eq!(backoff.delay_for(6), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_is_monotonic_and_capped_for_any_attempt() {
        let backoff = Backoff {
            base: Duration::from_millis(250),
            cap: Duration::from_secs(7),
            max_attempts: 64,
        };

        let mut previous = Duration::ZERO;
        for attempt in 0..=200 {
            let delay = backoff.delay_for(attempt);
            assert!(delay >= previous, "attempt {attempt} went backwards");
            assert!(delay <= backoff.cap, "attempt {attempt} exceeded the cap");
            previous = delay;
        }
        assert_eq!(backoff.delay_for(u32::MAX), backoff.cap);
    }

    #[test]
    fn test_attempt_zero_uses_base() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay_for(0), backoff.base);
        assert_eq!(backoff.delay_for(1), backoff.base);
    }

    #[test]
    fn test_exhaustion() {
        let backoff = Backoff::default();
        assert!(!backoff.is_exhausted(5));
        assert!(backoff.is_exhausted(6));
    }
}
