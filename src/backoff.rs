//! Reconnect backoff policy
//!
//! Pure delay computation for the upstream reconnect loop: exponential
//! growth from a base, capped at a maximum, with full jitter on top. The
//! policy never gives up; past the cap it keeps yielding the maximum delay,
//! so a long upstream outage costs at most one `max` interval of lag once
//! the feed returns. The attempt counter itself is owned by the connection
//! task, which resets it after a connection survives the stability grace
//! period.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with full jitter
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
}

impl BackoffPolicy {
    /// Create a policy growing from `base` and capped at `max`
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    /// Deterministic delay for the given attempt: `min(base * 2^attempt, max)`.
    ///
    /// Non-decreasing in `attempt`; saturates at `max`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Delay for the given attempt with jitter applied, uniform in
    /// `[0, delay_for(attempt)]`. Jitter spreads reconnects out so a feed
    /// restart does not produce a thundering herd.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let ceiling = self.delay_for(attempt).as_millis() as u64;
        let jittered = rand::rng().random_range(0..=ceiling);
        Duration::from_millis(jittered)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(60));

        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(5), Duration::from_millis(3200));
    }

    #[test]
    fn test_delay_non_decreasing_and_capped() {
        let policy = BackoffPolicy::new(Duration::from_millis(250), Duration::from_secs(10));

        let mut previous = Duration::ZERO;
        for attempt in 0..40 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= previous);
            assert!(delay <= Duration::from_secs(10));
            previous = delay;
        }
        // Once capped, it stays at the cap forever (retry-forever policy).
        assert_eq!(policy.delay_for(63), Duration::from_secs(10));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_stays_within_computed_delay() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(5));

        for attempt in 0..8 {
            let ceiling = policy.delay_for(attempt);
            for _ in 0..50 {
                assert!(policy.next_delay(attempt) <= ceiling);
            }
        }
    }

    #[test]
    fn test_max_below_base_is_clamped() {
        let policy = BackoffPolicy::new(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
    }
}
