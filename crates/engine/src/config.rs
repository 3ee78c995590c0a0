//! `EngineConfig` — process-wide tuning, loaded from environment variables
//! with documented defaults (spec.md §6 "Environment: Engine", SPEC_FULL.md
//! ambient-stack section). Constructed once in `cli` and threaded through by
//! explicit parameter, never a global singleton (spec.md §9 design note).

use std::time::Duration;

use automation_errors::RetryPolicy;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on workflow executions running concurrently.
    pub max_concurrent_executions: usize,
    /// Fallback per-node timeout when neither the node nor the workflow
    /// settings specify one.
    pub default_timeout: Duration,
    /// Retry policy applied when a workflow's `error_handling` is `retry`
    /// and the node itself doesn't override it.
    pub default_retry_policy: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_executions: 20,
            default_timeout: Duration::from_secs(30),
            default_retry_policy: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Loads from the environment, falling back to spec-documented defaults
    /// for any variable that's absent or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_executions: std::env::var("ENGINE_MAX_CONCURRENT_EXECUTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_concurrent_executions),
            default_timeout: std::env::var("ENGINE_DEFAULT_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_timeout),
            default_retry_policy: defaults.default_retry_policy,
        }
    }
}
