//! `automation-errors` — the `ErrorHandler` (spec §4.9): classification,
//! retry policy, circuit breakers, dead-letter queue, and reporting gate.

pub mod circuit_breaker;
pub mod classify;
pub mod dead_letter;
pub mod error;
pub mod reporting;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitOpenError, CircuitState};
pub use classify::{ErrorKind, Severity};
pub use dead_letter::{DeadLetterConfig, DeadLetterItem, DeadLetterQueue, ReprocessingStrategy};
pub use error::{AutomationError, ErrorContext, RetryInfo};
pub use reporting::{ErrorReporter, ReportingConfig};
pub use retry::{BackoffStrategy, RetryPolicy};

/// Aggregate configuration for one [`ErrorHandler`] instance (spec §6).
#[derive(Clone)]
pub struct ErrorHandlerConfig {
    pub circuit_breaker: CircuitBreakerConfig,
    pub dead_letter: DeadLetterConfig,
    pub reporting: ReportingConfig,
    pub default_retry_policy: RetryPolicy,
    pub retryable_kinds: Vec<ErrorKind>,
    pub non_retryable_kinds: Vec<ErrorKind>,
}

impl Default for ErrorHandlerConfig {
    fn default() -> Self {
        Self {
            circuit_breaker: CircuitBreakerConfig::default(),
            dead_letter: DeadLetterConfig::default(),
            reporting: ReportingConfig::default(),
            default_retry_policy: RetryPolicy::default(),
            retryable_kinds: vec![
                ErrorKind::Network,
                ErrorKind::Timeout,
                ErrorKind::RateLimit,
                ErrorKind::ServiceUnavailable,
                ErrorKind::InternalServer,
            ],
            non_retryable_kinds: vec![
                ErrorKind::Validation,
                ErrorKind::BadRequest,
                ErrorKind::Authentication,
                ErrorKind::Authorization,
                ErrorKind::NotFound,
                ErrorKind::Conflict,
            ],
        }
    }
}

/// Central error-handling facade: classifies raw failures, drives circuit
/// breakers per component, decides retry eligibility, and routes exhausted
/// errors to the dead-letter queue.
pub struct ErrorHandler {
    config: ErrorHandlerConfig,
    pub circuit_breaker: CircuitBreaker,
    pub dead_letter: DeadLetterQueue,
    pub reporter: ErrorReporter,
}

impl ErrorHandler {
    #[must_use]
    pub fn new(config: ErrorHandlerConfig) -> Self {
        Self {
            circuit_breaker: CircuitBreaker::new(config.circuit_breaker),
            dead_letter: DeadLetterQueue::new(config.dead_letter),
            reporter: ErrorReporter::new(config.reporting),
            config,
        }
    }

    /// Classifies a raw failure into an [`AutomationError`] and, if the
    /// reporting gate allows it, logs it at a level matching severity.
    #[must_use]
    pub fn classify_and_report(
        &self,
        kind: ErrorKind,
        message: impl Into<String>,
        context: ErrorContext,
    ) -> AutomationError {
        let error = AutomationError::new(kind, message, context);
        if self.reporter.should_report(&error) {
            match error.severity {
                Severity::Critical | Severity::High => {
                    tracing::error!(error_id = %error.id, kind = ?error.kind, component = %error.context.component, "{}", error.message);
                }
                Severity::Medium => {
                    tracing::warn!(error_id = %error.id, kind = ?error.kind, "{}", error.message);
                }
                Severity::Low => {
                    tracing::info!(error_id = %error.id, kind = ?error.kind, "{}", error.message);
                }
            }
        }
        error
    }

    /// Whether `kind` is eligible for retry under the configured gates.
    #[must_use]
    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        if self.config.non_retryable_kinds.contains(&kind) {
            return false;
        }
        self.config.retryable_kinds.contains(&kind)
    }

    #[must_use]
    pub fn default_retry_policy(&self) -> RetryPolicy {
        self.config.default_retry_policy.clone()
    }

    /// Routes an error whose retries are exhausted (or that was classified
    /// non-retryable) to the dead-letter queue.
    pub fn dead_letter(&self, error: AutomationError) {
        self.dead_letter.push(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_and_non_retryable_kinds_are_disjoint_by_config() {
        let handler = ErrorHandler::new(ErrorHandlerConfig::default());
        assert!(handler.is_retryable(ErrorKind::Timeout));
        assert!(!handler.is_retryable(ErrorKind::Validation));
        assert!(!handler.is_retryable(ErrorKind::NotFound));
    }
}
