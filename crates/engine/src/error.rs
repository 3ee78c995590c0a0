//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

/// Errors produced by the workflow engine (validation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors ------
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    #[error("edge references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference { node_id: String, side: &'static str },

    #[error("workflow graph contains a cycle (detected at node '{0}')")]
    CycleDetected(String),

    #[error("workflow has no nodes")]
    EmptyWorkflow,

    #[error("workflow has no start node (every node has an incoming edge)")]
    NoStartNode,

    #[error("no implementation registered for node type '{0}'")]
    UnknownNodeType(String),

    // ------ Lookup errors ------
    #[error("workflow '{0}' not found")]
    WorkflowNotFound(Uuid),

    #[error("execution '{0}' not found")]
    ExecutionNotFound(Uuid),

    // ------ Lifecycle errors ------
    #[error("cannot {action} execution '{id}' in status '{status}'")]
    InvalidTransition { id: Uuid, status: &'static str, action: &'static str },

    // ------ Execution errors ------
    #[error("node '{node_id}' failed fatally: {message}")]
    NodeFatal { node_id: String, message: String },

    #[error("node '{node_id}' exceeded retry limit: {message}")]
    NodeRetryExhausted { node_id: String, message: String },

    #[error("node '{node_id}' timed out after {timeout_ms}ms")]
    NodeTimeout { node_id: String, timeout_ms: u64 },

    #[error("sub-workflow call from '{node_id}' would re-enter workflow '{workflow_id}' already on the call stack")]
    SubWorkflowCycle { node_id: String, workflow_id: Uuid },

    #[error("state error: {0}")]
    State(#[from] state::StateError),
}
