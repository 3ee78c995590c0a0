//! Core domain models for the workflow engine (spec.md §3).
//!
//! These types are the source of truth for what a workflow and a run of it
//! look like in memory. `WorkflowDefinition` serialises to/from the JSONB
//! `definition` column of the `workflows` table; `WorkflowExecution` is kept
//! in the engine's own in-memory execution registry and mirrored to
//! `workflow_executions`/`node_executions` by callers that want durable
//! history (the `api` crate does this via `db::repository::executions`).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use nodes::condition::ConditionNode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// How a workflow is started (spec §3 `WorkflowExecution.trigger_type`, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Manual,
    Scheduled,
    Webhook,
    Event,
    Chain,
}

/// A workflow's declared entry points (spec §3 `TriggerDefinition`, §4.2).
/// Kept minimal here — the full `TriggerDefinition` with stats/lifecycle
/// lives in the `triggers` crate; a `WorkflowDefinition` only needs to know
/// which trigger *kinds* are declared for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerSpec {
    Webhook { path: String },
    Manual,
    Cron { expression: String },
    Event { event_name: String },
    Condition { field: String, check_interval_secs: u64 },
    Api { endpoint: String, interval_secs: u64 },
}

// ---------------------------------------------------------------------------
// NodeDefinition
// ---------------------------------------------------------------------------

/// A single step in the workflow graph (spec §3 `Node`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique identifier within this workflow (referenced by edges).
    pub id: String,
    /// Maps to a registered `ExecutableNode` implementation, or
    /// `"sub-workflow"`, which the engine handles intrinsically.
    pub node_type: String,
    /// Human-readable label; display-only.
    #[serde(default)]
    pub name: String,
    /// Arbitrary configuration passed to the node at execution time.
    pub config: serde_json::Value,
    /// Per-node timeout, overriding `WorkflowSettings.default_timeout_secs`.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Evaluated before dispatch; on false the node is recorded `skipped`
    /// (spec §4.1 step 4).
    #[serde(default)]
    pub precondition: Option<ConditionNode>,
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Directed edge from one node to another, optionally guarded (spec §3, §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    /// When present and false, the edge's target is skipped for dataflow
    /// purposes without failing the parent node.
    #[serde(default)]
    pub guard: Option<ConditionNode>,
}

// ---------------------------------------------------------------------------
// WorkflowSettings
// ---------------------------------------------------------------------------

/// How the engine reacts to a failing node (spec §3 `settings.error_handling`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandlingMode {
    /// Abort the execution at the first failure.
    Stop,
    /// Record the failure but keep dispatching independent nodes.
    Continue,
    /// Re-run the failing node per `retry_policy` before giving up.
    Retry,
}

/// Per-workflow retry tuning (spec §6 `default_retry_policy`); reuses
/// `automation_errors::RetryPolicy` for the actual backoff math.
pub type RetryPolicy = automation_errors::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSettings {
    #[serde(default = "default_error_handling")]
    pub error_handling: ErrorHandlingMode,
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    #[serde(default)]
    pub notify_on_failure: bool,
    #[serde(default)]
    pub notify_on_success: bool,
}

fn default_error_handling() -> ErrorHandlingMode {
    ErrorHandlingMode::Stop
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            error_handling: default_error_handling(),
            default_timeout_secs: default_timeout_secs(),
            retry_policy: RetryPolicy::default(),
            notify_on_failure: false,
            notify_on_success: false,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

/// A complete workflow definition (spec §3 `WorkflowDefinition`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_active")]
    pub active: bool,
    pub nodes: Vec<NodeDefinition>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub triggers: Vec<TriggerSpec>,
    #[serde(default)]
    pub settings: WorkflowSettings,
    /// Default variable values, merged with trigger input when an
    /// execution starts (spec §4.1 step 1: "seed context.variables from
    /// workflow variables ∪ input").
    #[serde(default)]
    pub variables: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

fn default_active() -> bool {
    true
}

impl WorkflowDefinition {
    /// Convenience constructor for testing and `cli validate`.
    pub fn new(
        name: impl Into<String>,
        triggers: Vec<TriggerSpec>,
        nodes: Vec<NodeDefinition>,
        edges: Vec<Edge>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            version: 1,
            active: true,
            nodes,
            edges,
            triggers,
            settings: WorkflowSettings::default(),
            variables: serde_json::Map::new(),
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowExecution / NodeResult
// ---------------------------------------------------------------------------

/// Execution status (spec §3 `WorkflowExecution.status`); transitions are
/// enforced by `WorkflowEngine` (`pending → running → {completed|failed|
/// cancelled}`, with `paused` reachable only from `running`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Success,
    Failure,
    Skipped,
}

/// One node's outcome within an execution (spec §3 `NodeResult`). Appended
/// to `WorkflowExecution.node_results`, never mutated post-append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    pub node_id: String,
    pub status: NodeStatus,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

/// The mutable data environment of an execution (spec §3 `WorkflowContext`,
/// GLOSSARY). `variables` is populated by node outputs keyed by node id
/// alongside caller-supplied constants; `secrets` is never serialised to
/// non-encrypted storage (see `nodes::ExecutionContext`, which carries the
/// live, lock-guarded counterpart used during dispatch).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowContext {
    pub variables: serde_json::Map<String, serde_json::Value>,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub metadata: HashMap<String, String>,
}

/// A single run of a `WorkflowDefinition` (spec §3 `WorkflowExecution`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    pub trigger_type: TriggerType,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub progress: u8,
    pub current_node: Option<String>,
    pub context: WorkflowContext,
    pub node_results: Vec<NodeResult>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error: Option<String>,
}

impl WorkflowExecution {
    pub(crate) fn new(workflow_id: Uuid, trigger_type: TriggerType, input: serde_json::Value, max_retries: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            status: ExecutionStatus::Pending,
            trigger_type,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            progress: 0,
            current_node: None,
            context: WorkflowContext { input, ..WorkflowContext::default() },
            node_results: Vec::new(),
            retry_count: 0,
            max_retries,
            error: None,
        }
    }
}

/// Filter accepted by `WorkflowEngine::list_executions` (spec §6
/// `GET executions?workflowId&status&limit`).
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub workflow_id: Option<Uuid>,
    pub status: Option<ExecutionStatus>,
    pub limit: Option<usize>,
}

/// Result of `WorkflowEngine::validate` (spec §4.1 contract).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub execution_order: Vec<String>,
}
