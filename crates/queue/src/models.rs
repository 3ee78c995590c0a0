//! `ActionExecutor` data model (spec.md §4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use automation_errors::RetryPolicy;

/// Field types accepted by input validation (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    File,
}

impl FieldType {
    #[must_use]
    pub fn matches(self, value: &Value) -> bool {
        match self {
            FieldType::String | FieldType::File => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldConstraint {
    pub pattern: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    #[serde(default)]
    pub enum_values: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputFieldSpec {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub constraint: FieldConstraint,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

/// Static configuration for one kind of side-effecting action. Registered
/// once; many [`QueuedAction`]s may submit against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub id: Uuid,
    pub name: String,
    pub handler_key: String,
    pub timeout: std::time::Duration,
    pub rate_limit: Option<RateLimitConfig>,
    pub retry_policy: RetryPolicy,
    pub input_schema: Vec<InputFieldSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAttemptRecord {
    pub attempt: u32,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// One submitted unit of work, tracked end to end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedAction {
    pub id: Uuid,
    pub definition_id: Uuid,
    pub input: Value,
    pub priority: i32,
    pub status: ActionStatus,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub retry_history: Vec<RetryAttemptRecord>,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl QueuedAction {
    #[must_use]
    pub fn new(definition_id: Uuid, input: Value, priority: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            definition_id,
            input,
            priority,
            status: ActionStatus::Pending,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            attempts: 0,
            retry_history: Vec::new(),
            output: None,
            error: None,
        }
    }
}

/// Ordering for the priority queue: higher `priority` first; equal
/// priority breaks FIFO by earlier `submitted_at` (spec.md §4.7).
#[derive(Debug, Clone)]
pub(crate) struct QueueEntry {
    pub action_id: Uuid,
    pub priority: i32,
    pub submitted_at: DateTime<Utc>,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.submitted_at == other.submitted_at
    }
}
impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap: higher priority must compare greater.
        // For equal priority, the earlier-submitted entry must compare
        // greater so it pops first (FIFO tie-break).
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.submitted_at.cmp(&self.submitted_at))
    }
}
