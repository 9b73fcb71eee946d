//! Reconnection Policy
//!
//! Exponential backoff for the sink connection. The delay before retry
//! `n` (0-indexed) is `base_delay × 2^n`, with no jitter and no cap. The
//! same schedule drives the initial dial, reconnection, and write
//! retries, each with its own attempt budget.

use std::time::Duration;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Maximum number of attempts per operation (at least 1).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_attempts: 5,
        }
    }
}

impl ReconnectConfig {
    /// Create a new configuration.
    ///
    /// A zero attempt budget is raised to one.
    #[must_use]
    pub const fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
        }
    }

    /// Backoff delay for a 0-indexed attempt, saturating at `Duration::MAX`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        1u32.checked_shl(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// Start a policy for one operation.
    #[must_use]
    pub const fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(*self)
    }
}

/// Attempt counter for one operation.
///
/// # Example
///
/// ```rust
/// use alpaca_trade_relay::infrastructure::telegraf::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::new(Duration::from_millis(100), 3));
///
/// assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_millis(200)));
/// assert_eq!(policy.next_delay(), None);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Record a failed attempt and return the delay before the next one.
    ///
    /// Returns `None` once the failed attempt was the last in the budget,
    /// so no sleep follows the final failure.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        let failed = self.attempt_count;
        self.attempt_count = self.attempt_count.saturating_add(1);
        if self.attempt_count >= self.config.max_attempts {
            None
        } else {
            Some(self.config.delay(failed))
        }
    }

    /// Get the number of failed attempts so far.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert_eq!(config.base_delay, Duration::from_millis(100));
        assert_eq!(config.max_attempts, 5);
    }

    #[test]
    fn exponential_schedule() {
        let config = ReconnectConfig::new(Duration::from_millis(100), 5);
        let delays: Vec<u128> = (0..4).map(|n| config.delay(n).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800]);
    }

    #[test]
    fn delay_saturates() {
        let config = ReconnectConfig::new(Duration::from_secs(1), 5);
        assert_eq!(config.delay(40), Duration::MAX);
        assert_eq!(config.delay(u32::MAX), Duration::MAX);
    }

    #[test]
    fn zero_budget_is_one_attempt() {
        let config = ReconnectConfig::new(Duration::from_millis(10), 0);
        assert_eq!(config.max_attempts, 1);
        let mut policy = config.policy();
        assert!(policy.next_delay().is_none());
        assert_eq!(policy.attempt_count(), 1);
    }

    #[test]
    fn policy_stops_at_budget() {
        let mut policy = ReconnectConfig::new(Duration::from_millis(100), 3).policy();

        assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(policy.attempt_count(), 1);
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(policy.attempt_count(), 2);
        assert!(policy.next_delay().is_none());
        assert_eq!(policy.attempt_count(), 3);
    }

    proptest! {
        #[test]
        fn delay_doubles(base_ms in 1u64..10_000, attempt in 0u32..20) {
            let config = ReconnectConfig::new(Duration::from_millis(base_ms), 32);
            prop_assert_eq!(config.delay(attempt + 1), config.delay(attempt) * 2);
        }

        #[test]
        fn policy_never_exceeds_budget(max_attempts in 1u32..50) {
            let mut policy = ReconnectConfig::new(Duration::from_millis(1), max_attempts).policy();
            let mut sleeps = 0u32;
            while policy.next_delay().is_some() {
                sleeps += 1;
            }
            prop_assert_eq!(sleeps, max_attempts - 1);
            prop_assert_eq!(policy.attempt_count(), max_attempts);
        }
    }
}
