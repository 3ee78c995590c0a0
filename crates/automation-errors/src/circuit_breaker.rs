//! Per-component circuit breaker (spec §4.9, §8 invariant: never admits a
//! call while open before `next_retry_time`).

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub monitoring_window: Duration,
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            monitoring_window: Duration::from_secs(60),
            half_open_max_calls: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ComponentCounters {
    state: CircuitState,
    failure_count: u32,
    half_open_successes: u32,
    #[serde(skip, default = "Utc::now")]
    next_retry_time: DateTime<Utc>,
}

impl Default for ComponentCounters {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            half_open_successes: 0,
            next_retry_time: Utc::now(),
        }
    }
}

/// Returned when a call is fast-failed because its component's breaker is open.
#[derive(Debug, thiserror::Error)]
#[error("circuit breaker for '{component}' is open until {next_retry_time}")]
pub struct CircuitOpenError {
    pub component: String,
    pub next_retry_time: DateTime<Utc>,
}

/// Keyed registry of per-component circuit breakers.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    components: DashMap<String, ComponentCounters>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self { config, components: DashMap::new() }
    }

    fn entry(&self, component: &str) -> dashmap::mapref::one::RefMut<'_, String, ComponentCounters> {
        self.components.entry(component.to_owned()).or_default()
    }

    /// Checks (and, if appropriate, transitions) the breaker before a call.
    ///
    /// # Errors
    /// Returns [`CircuitOpenError`] if the breaker is open and the reset
    /// timeout has not elapsed.
    pub fn allow_request(&self, component: &str) -> Result<(), CircuitOpenError> {
        let mut counters = self.entry(component);
        match counters.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                if Utc::now() >= counters.next_retry_time {
                    counters.state = CircuitState::HalfOpen;
                    counters.half_open_successes = 0;
                    Ok(())
                } else {
                    Err(CircuitOpenError {
                        component: component.to_owned(),
                        next_retry_time: counters.next_retry_time,
                    })
                }
            }
        }
    }

    /// Records a successful call.
    pub fn record_success(&self, component: &str) {
        let mut counters = self.entry(component);
        match counters.state {
            CircuitState::Closed => {
                counters.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                counters.half_open_successes += 1;
                if counters.half_open_successes >= self.config.half_open_max_calls {
                    counters.state = CircuitState::Closed;
                    counters.failure_count = 0;
                    counters.half_open_successes = 0;
                    tracing::info!(component, "circuit breaker closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Records a failed call.
    pub fn record_failure(&self, component: &str) {
        let mut counters = self.entry(component);
        match counters.state {
            CircuitState::Closed => {
                counters.failure_count += 1;
                if counters.failure_count >= self.config.failure_threshold {
                    counters.state = CircuitState::Open;
                    counters.next_retry_time = Utc::now()
                        + chrono::Duration::from_std(self.config.reset_timeout)
                            .unwrap_or_default();
                    tracing::warn!(component, "circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                counters.state = CircuitState::Open;
                counters.half_open_successes = 0;
                counters.next_retry_time = Utc::now()
                    + chrono::Duration::from_std(self.config.reset_timeout).unwrap_or_default();
                tracing::warn!(component, "circuit breaker re-opened from half-open");
            }
            CircuitState::Open => {}
        }
    }

    #[must_use]
    pub fn state(&self, component: &str) -> CircuitState {
        self.entry(component).state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 5,
            reset_timeout: Duration::from_millis(50),
            monitoring_window: Duration::from_secs(60),
            half_open_max_calls: 3,
        }
    }

    #[test]
    fn opens_after_threshold_and_fast_fails() {
        let breaker = CircuitBreaker::new(cfg());
        for _ in 0..5 {
            breaker.record_failure("x");
        }
        assert_eq!(breaker.state("x"), CircuitState::Open);
        assert!(breaker.allow_request("x").is_err());
    }

    #[test]
    fn half_open_after_reset_timeout_then_closes_on_successes() {
        let breaker = CircuitBreaker::new(cfg());
        for _ in 0..5 {
            breaker.record_failure("x");
        }
        std::thread::sleep(Duration::from_millis(60));
        assert!(breaker.allow_request("x").is_ok());
        assert_eq!(breaker.state("x"), CircuitState::HalfOpen);

        breaker.record_success("x");
        breaker.record_success("x");
        breaker.record_success("x");
        assert_eq!(breaker.state("x"), CircuitState::Closed);
    }

    #[test]
    fn failure_in_half_open_reopens() {
        let breaker = CircuitBreaker::new(cfg());
        for _ in 0..5 {
            breaker.record_failure("x");
        }
        std::thread::sleep(Duration::from_millis(60));
        breaker.allow_request("x").unwrap();
        breaker.record_failure("x");
        assert_eq!(breaker.state("x"), CircuitState::Open);
    }
}
