//! Shared retry policy and backoff computation.
//!
//! Used by `engine` (node-level `error_handling = retry`), `queue`
//! (`ActionExecutor` retries) and `automation-errors` itself (dead-letter
//! reprocessing eligibility).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff shape between retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    Linear,
    Exponential,
    Jittered,
}

/// A retry policy, as carried by `WorkflowDefinition.settings`,
/// `ActionDefinition`, and `ErrorHandler` configuration alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub max_retries: u32,
    pub backoff: BackoffStrategy,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Only consulted when `backoff == Jittered`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    /// spec.md §6: engine default retry policy.
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            backoff: BackoffStrategy::Exponential,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt is permitted after `attempts_so_far` failures.
    #[must_use]
    pub fn allows_retry(&self, attempts_so_far: u32) -> bool {
        self.enabled && attempts_so_far < self.max_retries
    }

    /// Delay before the `attempt`-th retry (1-indexed: the delay before the
    /// *first* retry is `delay_for(1)`).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let base = match self.backoff {
            BackoffStrategy::Fixed => self.initial_delay,
            BackoffStrategy::Linear => self.initial_delay * attempt,
            BackoffStrategy::Exponential | BackoffStrategy::Jittered => {
                let factor = self.multiplier.powi((attempt - 1) as i32);
                Duration::from_secs_f64((self.initial_delay.as_secs_f64() * factor).max(0.0))
            }
        };

        let capped = base.min(self.max_delay);

        if self.jitter && matches!(self.backoff, BackoffStrategy::Jittered) {
            let jittered_secs = rand::Rng::gen_range(&mut rand::thread_rng(), 0.0..=capped.as_secs_f64());
            Duration::from_secs_f64(jittered_secs)
        } else {
            capped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_matches_spec_example() {
        // exponential(initial=1s, multiplier=2, max=10s): 1,2,4,8,10,10,...
        let policy = RetryPolicy {
            enabled: true,
            max_retries: 10,
            backoff: BackoffStrategy::Exponential,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: false,
        };

        let delays: Vec<u64> = (1..=6).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let policy = RetryPolicy {
            backoff: BackoffStrategy::Fixed,
            initial_delay: Duration::from_millis(250),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for(5), Duration::from_millis(250));
    }

    #[test]
    fn allows_retry_respects_max_and_enabled() {
        let policy = RetryPolicy { max_retries: 2, ..RetryPolicy::default() };
        assert!(policy.allows_retry(0));
        assert!(policy.allows_retry(1));
        assert!(!policy.allows_retry(2));

        let disabled = RetryPolicy { enabled: false, ..RetryPolicy::default() };
        assert!(!disabled.allows_retry(0));
    }
}
