//! `TaskScheduler` data model (spec.md §4.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A cron-driven recurring invocation of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub cron_expression: String,
    pub timezone: String,
    pub next_execution: DateTime<Utc>,
    pub last_execution: Option<DateTime<Utc>>,
    pub execution_count: u64,
    pub max_executions: Option<u64>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl ScheduledTask {
    #[must_use]
    pub fn has_remaining_executions(&self) -> bool {
        match self.max_executions {
            Some(max) => self.execution_count < max,
            None => true,
        }
    }
}

/// A free-standing callback registered directly with the scheduler, distinct
/// from a per-workflow `ScheduledTask` (spec.md §4.4: "distinct from the
/// per-workflow scheduled tasks").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJob {
    pub id: Uuid,
    pub name: String,
    pub cron_expression: String,
    pub next_execution: DateTime<Utc>,
    pub last_execution: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub active: bool,
}

/// Outcome of a single master-tick pass, reported for observability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickReport {
    pub tasks_fired: u64,
    pub jobs_fired: u64,
    pub tasks_deactivated: u64,
    pub errors: Vec<String>,
}
