//! Error reporting gate: severity threshold plus a per-key fixed-window
//! rate limit so a thundering-herd failure doesn't spam downstream sinks.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::classify::Severity;
use crate::error::AutomationError;

#[derive(Debug, Clone, Copy)]
pub struct ReportingConfig {
    pub severity_threshold: Severity,
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            severity_threshold: Severity::Low,
            rate_limit_max: 20,
            rate_limit_window: Duration::from_secs(60),
        }
    }
}

struct WindowCounter {
    window_start: Instant,
    count: u32,
}

/// Decides whether a classified error should be forwarded to a reporting
/// sink (logs, monitoring, notification channels).
pub struct ErrorReporter {
    config: ReportingConfig,
    windows: DashMap<String, WindowCounter>,
}

impl ErrorReporter {
    #[must_use]
    pub fn new(config: ReportingConfig) -> Self {
        Self { config, windows: DashMap::new() }
    }

    /// Returns `true` if `error` should be reported now, or `false` if it is
    /// below the severity threshold or the reporting key's window is exhausted.
    pub fn should_report(&self, error: &AutomationError) -> bool {
        if error.severity < self.config.severity_threshold {
            return false;
        }

        let key = if error.context.component.is_empty() {
            "default".to_owned()
        } else {
            error.context.component.clone()
        };

        let mut counter = self.windows.entry(key).or_insert_with(|| WindowCounter {
            window_start: Instant::now(),
            count: 0,
        });

        if counter.window_start.elapsed() >= self.config.rate_limit_window {
            counter.window_start = Instant::now();
            counter.count = 0;
        }

        if counter.count >= self.config.rate_limit_max {
            return false;
        }

        counter.count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorKind;
    use crate::error::ErrorContext;

    fn err(severity_kind: ErrorKind, component: &str) -> AutomationError {
        AutomationError::new(
            severity_kind,
            "x",
            ErrorContext { component: component.to_owned(), ..Default::default() },
        )
    }

    #[test]
    fn below_threshold_is_dropped() {
        let reporter = ErrorReporter::new(ReportingConfig {
            severity_threshold: Severity::High,
            ..Default::default()
        });
        assert!(!reporter.should_report(&err(ErrorKind::NotFound, "x")));
        assert!(reporter.should_report(&err(ErrorKind::Authentication, "x")));
    }

    #[test]
    fn exceeding_rate_limit_drops_further_reports() {
        let reporter = ErrorReporter::new(ReportingConfig {
            severity_threshold: Severity::Low,
            rate_limit_max: 2,
            rate_limit_window: Duration::from_secs(60),
        });
        let e = err(ErrorKind::Unknown, "comp-a");
        assert!(reporter.should_report(&e));
        assert!(reporter.should_report(&e));
        assert!(!reporter.should_report(&e));
    }
}
