//! The `ExecutableNode` trait — the contract every node must fulfil.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::NodeError;

/// Shared context passed to every node during execution.
///
/// Defined here (in the nodes crate) so both the engine and individual node
/// implementations can import it without a circular dependency.
#[derive(Clone)]
pub struct ExecutionContext {
    /// ID of the parent workflow.
    pub workflow_id: Uuid,
    /// ID of the current execution run.
    pub execution_id: Uuid,
    /// Initial input supplied when the execution was triggered.
    pub input: Value,
    /// Decrypted secrets scoped to this workflow. Never logged, never
    /// included in any snapshot serialization.
    pub secrets: HashMap<String, String>,
    /// Shared, mutable execution variables (spec.md `WorkflowContext.variables`).
    /// `variable-setter` writes here; other node types may read it through
    /// `$name` references in their config.
    pub variables: Arc<Mutex<serde_json::Map<String, Value>>>,
    /// Outputs of every node that has already completed in this execution,
    /// keyed by node id — the "enhanced context view" spec.md §4.1 requires
    /// be available to each dispatch.
    pub previous_outputs: HashMap<String, Value>,
    /// Workflow ids currently on the call stack, used to refuse
    /// self-recursive `sub-workflow` chains (SPEC_FULL.md addition).
    pub call_stack: Vec<Uuid>,
}

impl ExecutionContext {
    #[must_use]
    pub fn new(workflow_id: Uuid, execution_id: Uuid, input: Value) -> Self {
        Self {
            workflow_id,
            execution_id,
            input,
            secrets: HashMap::new(),
            variables: Arc::new(Mutex::new(serde_json::Map::new())),
            previous_outputs: HashMap::new(),
            call_stack: Vec::new(),
        }
    }

    /// Snapshot of `variables` for passing into the condition evaluator or a
    /// checkpoint; cheap because contexts are small JSON maps in practice.
    #[must_use]
    pub fn variables_snapshot(&self) -> serde_json::Map<String, Value> {
        self.variables.lock().unwrap().clone()
    }

    pub fn set_variable(&self, key: impl Into<String>, value: Value) {
        self.variables.lock().unwrap().insert(key.into(), value);
    }

    #[must_use]
    pub fn get_variable(&self, key: &str) -> Option<Value> {
        self.variables.lock().unwrap().get(key).cloned()
    }
}

/// The core node trait.
///
/// All built-in nodes and plugin implementations must implement this.
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    /// Execute the node, receive the *previous* node's JSON output as `input`,
    /// and return this node's JSON output.
    async fn execute(
        &self,
        input: Value,
        ctx: &ExecutionContext,
    ) -> Result<Value, NodeError>;
}
