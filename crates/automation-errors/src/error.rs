//! The `AutomationError` record (spec §3) — every failure the engine,
//! triggers, actions, and persistence layers surface is normalized into one
//! of these before it is reported or dead-lettered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classify::{ErrorKind, Severity};

/// Structured placement info: which workflow/execution/node/component/
/// operation produced the error, and in which environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorContext {
    pub workflow_id: Option<Uuid>,
    pub execution_id: Option<Uuid>,
    pub node_id: Option<String>,
    pub component: String,
    pub operation: String,
    pub environment: String,
}

/// A single recorded retry attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAttempt {
    pub attempt: u32,
    pub delay_ms: u64,
    pub at: DateTime<Utc>,
}

/// Retry bookkeeping attached to an error once at least one attempt is made.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryInfo {
    pub attempts: Vec<RetryAttempt>,
}

/// A classified, contextualized automation failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationError {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    pub context: ErrorContext,
    pub retry_info: Option<RetryInfo>,
    pub resolved: bool,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl AutomationError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>, context: ErrorContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            severity: kind.severity(),
            kind,
            message: message.into(),
            context,
            retry_info: None,
            resolved: false,
            tags: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn record_retry(&mut self, attempt: u32, delay_ms: u64) {
        self.retry_info
            .get_or_insert_with(RetryInfo::default)
            .attempts
            .push(RetryAttempt { attempt, delay_ms, at: Utc::now() });
    }

    pub fn resolve(&mut self) {
        self.resolved = true;
    }
}
