//! `WorkflowEngine` (spec.md §4.1) — the central orchestrator.
//!
//! 1. Validates the DAG and produces a topological ordering at `register`.
//! 2. `execute` walks that ordering, dispatching each node through the
//!    shared `nodes::NodeRegistry`, `sub-workflow` recursing into the engine
//!    itself.
//! 3. Honours per-workflow `error_handling` (`stop`/`continue`/`retry`),
//!    per-node/workflow timeouts, edge guards, and node preconditions.
//! 4. Persists state/checkpoints via `state::StateManager` and classifies
//!    failures via `automation_errors::ErrorHandler`.
//! 5. `pause`/`resume`/`cancel` interact with an in-flight `execute` call
//!    through a lightweight cooperative control handle — the caller decides
//!    concurrency (e.g. `tokio::spawn(engine.execute(..))`), the engine only
//!    guarantees the loop observes the signal between node dispatches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use automation_errors::{ErrorContext, ErrorHandler, ErrorKind};
use chrono::Utc;
use dashmap::DashMap;
use nodes::condition::evaluate;
use nodes::traits::ExecutionContext;
use nodes::{NodeError, NodeRegistry};
use serde_json::Value;
use state::{SnapshotReason, StateManager};
use tokio::sync::Notify;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::models::{
    Edge, ErrorHandlingMode, ExecutionFilter, ExecutionStatus, NodeDefinition, NodeResult, NodeStatus,
    TriggerType, ValidationReport, WorkflowContext, WorkflowDefinition, WorkflowExecution,
};
use crate::{dag::validate_dag, EngineError};

// ---------------------------------------------------------------------------
// Cooperative pause/resume/cancel
// ---------------------------------------------------------------------------

const SIGNAL_RUNNING: u8 = 0;
const SIGNAL_PAUSE_REQUESTED: u8 = 1;
const SIGNAL_CANCELLED: u8 = 2;

struct ExecutionControl {
    signal: AtomicU8,
    notify: Notify,
}

impl ExecutionControl {
    fn new() -> Self {
        Self { signal: AtomicU8::new(SIGNAL_RUNNING), notify: Notify::new() }
    }

    fn request_pause(&self) {
        self.signal.store(SIGNAL_PAUSE_REQUESTED, Ordering::SeqCst);
    }

    fn request_resume(&self) {
        self.signal.store(SIGNAL_RUNNING, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn request_cancel(&self) {
        self.signal.store(SIGNAL_CANCELLED, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_cancelled(&self) -> bool {
        self.signal.load(Ordering::SeqCst) == SIGNAL_CANCELLED
    }

    /// Blocks the caller while a pause is in effect; returns once resumed
    /// or cancelled.
    async fn wait_if_paused(&self) {
        while self.signal.load(Ordering::SeqCst) == SIGNAL_PAUSE_REQUESTED {
            self.notify.notified().await;
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

struct Inner {
    definitions: DashMap<Uuid, WorkflowDefinition>,
    executions: DashMap<Uuid, WorkflowExecution>,
    controls: DashMap<Uuid, Arc<ExecutionControl>>,
    registry: NodeRegistry,
    state_manager: Arc<StateManager>,
    error_handler: Arc<ErrorHandler>,
    concurrency: tokio::sync::Semaphore,
    config: EngineConfig,
}

/// Cheap to clone — every clone shares the same underlying registries
/// (spec.md §9: "construct a root engine value at process start; child
/// services receive it by explicit parameter passing", not a global).
#[derive(Clone)]
pub struct WorkflowEngine {
    inner: Arc<Inner>,
}

impl WorkflowEngine {
    #[must_use]
    pub fn new(
        registry: NodeRegistry,
        state_manager: Arc<StateManager>,
        error_handler: Arc<ErrorHandler>,
        config: EngineConfig,
    ) -> Self {
        let concurrency = tokio::sync::Semaphore::new(config.max_concurrent_executions);
        Self {
            inner: Arc::new(Inner {
                definitions: DashMap::new(),
                executions: DashMap::new(),
                controls: DashMap::new(),
                registry,
                state_manager,
                error_handler,
                concurrency,
                config,
            }),
        }
    }

    // -----------------------------------------------------------------------
    // register / validate
    // -----------------------------------------------------------------------

    /// Validates `def` without registering it (spec §4.1 `validate(def)`).
    #[must_use]
    pub fn validate(&self, def: &WorkflowDefinition) -> ValidationReport {
        match self.validate_inner(def) {
            Ok(order) => ValidationReport { valid: true, errors: Vec::new(), execution_order: order },
            Err(e) => ValidationReport { valid: false, errors: vec![e.to_string()], execution_order: Vec::new() },
        }
    }

    fn validate_inner(&self, def: &WorkflowDefinition) -> Result<Vec<String>, EngineError> {
        let order = validate_dag(def)?;
        for node in &def.nodes {
            if !nodes::is_engine_intrinsic(&node.node_type) && !self.inner.registry.contains_key(&node.node_type) {
                return Err(EngineError::UnknownNodeType(node.node_type.clone()));
            }
        }
        Ok(order)
    }

    /// Registers (or idempotently re-registers) a workflow definition
    /// (spec §4.1 `register(def)`, §8 idempotence invariant).
    pub fn register(&self, def: WorkflowDefinition) -> Result<(), EngineError> {
        self.validate_inner(&def)?;

        let content = content_fingerprint(&def);
        match self.inner.definitions.get(&def.id) {
            Some(existing) if content_fingerprint(&existing) == content => {
                // Identical re-registration: no-op.
            }
            Some(existing) => {
                let mut updated = def;
                updated.version = existing.version + 1;
                updated.created_at = existing.created_at;
                drop(existing);
                self.inner.definitions.insert(updated.id, updated);
            }
            None => {
                self.inner.definitions.insert(def.id, def);
            }
        }
        Ok(())
    }

    /// Fetches a registered definition by id (spec §6 `GET workflows/:id`
    /// backing lookup; the `api` crate also keeps a persisted copy in `db`).
    #[must_use]
    pub fn definition(&self, workflow_id: Uuid) -> Option<WorkflowDefinition> {
        self.inner.definitions.get(&workflow_id).map(|d| d.clone())
    }

    /// Removes a workflow definition from the live registry (spec §6
    /// `DELETE workflows/:id`). Already-running executions are unaffected —
    /// only future `execute` calls for this id are rejected.
    pub fn unregister(&self, workflow_id: Uuid) -> Result<(), EngineError> {
        self.inner.definitions.remove(&workflow_id).map(|_| ()).ok_or(EngineError::WorkflowNotFound(workflow_id))
    }

    // -----------------------------------------------------------------------
    // execute
    // -----------------------------------------------------------------------

    /// Runs a workflow to completion and returns the final execution record
    /// (spec §4.1 `execute(workflow_id, input, trigger_type) → execution`).
    #[instrument(skip(self, input), fields(workflow_id = %workflow_id))]
    pub async fn execute(
        &self,
        workflow_id: Uuid,
        input: Value,
        trigger_type: TriggerType,
    ) -> Result<WorkflowExecution, EngineError> {
        self.execute_with_call_stack(workflow_id, input, trigger_type, Vec::new()).await
    }

    async fn execute_with_call_stack(
        &self,
        workflow_id: Uuid,
        input: Value,
        trigger_type: TriggerType,
        call_stack: Vec<Uuid>,
    ) -> Result<WorkflowExecution, EngineError> {
        if call_stack.contains(&workflow_id) {
            return Err(EngineError::SubWorkflowCycle {
                node_id: "sub-workflow".into(),
                workflow_id,
            });
        }

        // Only the root of a call stack competes for a concurrency permit —
        // a sub-workflow acquiring its own would deadlock a single-permit
        // engine against its own still-running parent.
        let _permit = if call_stack.is_empty() {
            Some(self.inner.concurrency.acquire().await.expect("engine concurrency semaphore is never closed"))
        } else {
            None
        };

        let def = self
            .inner
            .definitions
            .get(&workflow_id)
            .map(|d| d.clone())
            .ok_or(EngineError::WorkflowNotFound(workflow_id))?;

        let sorted_ids = validate_dag(&def)?;

        let mut seed_vars = def.variables.clone();
        if let Some(obj) = input.as_object() {
            seed_vars.extend(obj.clone());
        }

        let mut execution = WorkflowExecution::new(workflow_id, trigger_type, input.clone(), def.settings.retry_policy.max_retries);
        execution.status = ExecutionStatus::Running;
        execution.context = WorkflowContext { variables: seed_vars.clone(), input: input.clone(), output: None, metadata: HashMap::new() };
        let execution_id = execution.id;

        let control = Arc::new(ExecutionControl::new());
        self.inner.controls.insert(execution_id, control.clone());
        self.inner.executions.insert(execution_id, execution);

        let state_id = self
            .inner
            .state_manager
            .create_state(workflow_id, execution_id, Some(seed_vars.clone()))
            .await?;

        let mut ctx = ExecutionContext::new(workflow_id, execution_id, input.clone());
        for (k, v) in &seed_vars {
            ctx.set_variable(k.clone(), v.clone());
        }
        ctx.call_stack = {
            let mut stack = call_stack;
            stack.push(workflow_id);
            stack
        };

        let node_map: HashMap<&str, &NodeDefinition> = def.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let incoming: HashMap<&str, Vec<&Edge>> = {
            let mut m: HashMap<&str, Vec<&Edge>> = HashMap::new();
            for edge in &def.edges {
                m.entry(edge.to.as_str()).or_default().push(edge);
            }
            m
        };

        let mut current_input = input;
        let mut skipped: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut stopped = false;
        let mut cancelled = false;
        let total = sorted_ids.len().max(1);

        for (idx, node_id) in sorted_ids.iter().enumerate() {
            if control.is_cancelled() {
                cancelled = true;
                break;
            }
            control.wait_if_paused().await;
            if control.is_cancelled() {
                cancelled = true;
                break;
            }
            if let Some(mut entry) = self.inner.executions.get_mut(&execution_id) {
                entry.status = ExecutionStatus::Running;
                entry.current_node = Some(node_id.clone());
            }

            let node_def = node_map[node_id.as_str()];
            let predecessors = incoming.get(node_id.as_str()).cloned().unwrap_or_default();

            let (should_skip_dataflow, resolved_input) =
                self.resolve_dataflow_input(&predecessors, &skipped, &current_input, execution_id, &ctx.variables_snapshot());

            if should_skip_dataflow {
                skipped.insert(node_id.clone());
                self.record_result(&execution_id, node_id, NodeStatus::Skipped, None, None, 0);
                continue;
            }

            let predecessor_stopped = predecessors.iter().any(|e| {
                skipped.contains(&e.from)
                    || (def.settings.error_handling == ErrorHandlingMode::Stop && self.predecessor_failed(&execution_id, &e.from))
            });
            if predecessor_stopped {
                skipped.insert(node_id.clone());
                self.record_result(&execution_id, node_id, NodeStatus::Skipped, None, None, 0);
                continue;
            }

            if let Some(precondition) = &node_def.precondition {
                let vars = ctx.variables_snapshot();
                if !evaluate(precondition, &vars).result {
                    skipped.insert(node_id.clone());
                    self.record_result(&execution_id, node_id, NodeStatus::Skipped, None, None, 0);
                    continue;
                }
            }

            ctx.input = resolved_input.clone();
            let outcome = self.dispatch_node(&def, node_def, resolved_input.clone(), &mut ctx, state_id).await;

            match outcome {
                Ok(output) => {
                    self.record_result(&execution_id, node_id, NodeStatus::Success, Some(output.clone()), None, 0);
                    ctx.previous_outputs.insert(node_id.clone(), output.clone());
                    ctx.set_variable(node_id.clone(), output.clone());
                    if let Some(mut entry) = self.inner.executions.get_mut(&execution_id) {
                        entry.context.variables = ctx.variables_snapshot();
                    }
                    let _ = self.inner.state_manager.set_variable(state_id, node_id, output.clone()).await;
                    let _ = self.inner.state_manager.create_checkpoint(state_id, node_id, true, 0).await;
                    current_input = output;
                }
                Err(err) => {
                    let message = err.to_string();
                    self.record_result(&execution_id, node_id, NodeStatus::Failure, None, Some(message.clone()), 0);
                    let _ = self.inner.state_manager.create_checkpoint(state_id, node_id, false, 0).await;

                    let kind = classify_node_error(&err);
                    let automation_error = self.inner.error_handler.classify_and_report(
                        kind,
                        message.clone(),
                        ErrorContext { component: "engine".into(), operation: node_def.node_type.clone(), workflow_id: Some(workflow_id), execution_id: Some(execution_id), node_id: Some(node_id.clone()), ..Default::default() },
                    );
                    if !self.inner.error_handler.is_retryable(kind) {
                        self.inner.error_handler.dead_letter(automation_error);
                    }

                    if let Some(mut entry) = self.inner.executions.get_mut(&execution_id) {
                        entry.error = Some(message);
                    }

                    if def.settings.error_handling == ErrorHandlingMode::Stop {
                        stopped = true;
                        break;
                    }
                    // `continue` and `retry`-exhausted both fall through and
                    // keep dispatching independent downstream nodes.
                }
            }

            let completed_or_skipped = idx + 1;
            if let Some(mut entry) = self.inner.executions.get_mut(&execution_id) {
                entry.progress = ((100 * completed_or_skipped) / total) as u8;
            }
        }

        let final_status = if cancelled {
            ExecutionStatus::Cancelled
        } else if stopped {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };

        match final_status {
            ExecutionStatus::Completed => self.inner.state_manager.complete_state(state_id).await.ok(),
            ExecutionStatus::Failed => self.inner.state_manager.fail_state(state_id).await.ok(),
            ExecutionStatus::Cancelled => self.inner.state_manager.cancel_state(state_id).await.ok(),
            _ => None,
        };
        let _ = self.inner.state_manager.create_snapshot(state_id, SnapshotReason::Auto).await;

        let final_execution = {
            let mut entry = self.inner.executions.get_mut(&execution_id).expect("execution present");
            entry.status = final_status;
            entry.completed_at = Some(Utc::now());
            entry.duration_ms = Some((Utc::now() - entry.started_at).num_milliseconds());
            // Spec.md §5: progress is 100 iff status is completed or failed and
            // no node was skipped. `stop` mode breaks out of the loop on the
            // first failure without recording a `Skipped` result for the nodes
            // it never reached, so the loop's own running tally under-counts —
            // recompute from whether any result actually is `Skipped`.
            let any_skipped = entry.node_results.iter().any(|r| r.status == NodeStatus::Skipped);
            entry.progress = match final_status {
                ExecutionStatus::Completed | ExecutionStatus::Failed if !any_skipped => 100,
                _ => entry.progress,
            };
            entry.context.output = Some(current_input);
            entry.clone()
        };

        info!(execution_id = %execution_id, status = ?final_status, "workflow execution finished");
        self.inner.controls.remove(&execution_id);
        Ok(final_execution)
    }

    /// Figures out whether `node_id`'s incoming edges leave it with no
    /// viable predecessor (spec §4.1.1 "when a guard fails, the successor
    /// is considered skipped for dataflow"), and if not, which predecessor
    /// output becomes its input. Multiple viable predecessors: the first
    /// in edge-declaration order wins (an Open Question spec.md leaves
    /// unresolved for fan-in merge semantics — see DESIGN.md).
    fn resolve_dataflow_input(
        &self,
        predecessors: &[&Edge],
        skipped: &std::collections::HashSet<String>,
        current_input: &Value,
        execution_id: Uuid,
        variables: &serde_json::Map<String, Value>,
    ) -> (bool, Value) {
        if predecessors.is_empty() {
            return (false, current_input.clone());
        }

        for edge in predecessors {
            if skipped.contains(&edge.from) {
                continue;
            }
            if !self.predecessor_succeeded(&execution_id, &edge.from) {
                continue;
            }
            if let Some(guard) = &edge.guard {
                if !evaluate(guard, variables).result {
                    continue;
                }
            }
            let output = self
                .inner
                .executions
                .get(&execution_id)
                .and_then(|e| e.node_results.iter().find(|r| r.node_id == edge.from).and_then(|r| r.output.clone()))
                .unwrap_or_else(|| current_input.clone());
            return (false, output);
        }
        (true, Value::Null)
    }

    fn predecessor_succeeded(&self, execution_id: &Uuid, node_id: &str) -> bool {
        self.inner
            .executions
            .get(execution_id)
            .map(|e| e.node_results.iter().any(|r| r.node_id == node_id && r.status == NodeStatus::Success))
            .unwrap_or(false)
    }

    fn predecessor_failed(&self, execution_id: &Uuid, node_id: &str) -> bool {
        self.inner
            .executions
            .get(execution_id)
            .map(|e| e.node_results.iter().any(|r| r.node_id == node_id && r.status == NodeStatus::Failure))
            .unwrap_or(false)
    }

    fn record_result(
        &self,
        execution_id: &Uuid,
        node_id: &str,
        status: NodeStatus,
        output: Option<Value>,
        error: Option<String>,
        duration_ms: i64,
    ) {
        if let Some(mut entry) = self.inner.executions.get_mut(execution_id) {
            let now = Utc::now();
            entry.node_results.push(NodeResult {
                node_id: node_id.to_owned(),
                status,
                output,
                error,
                started_at: now,
                completed_at: now,
                duration_ms,
            });
        }
    }

    /// Dispatches one node: `sub-workflow` recurses into the engine,
    /// everything else goes through the shared node registry, wrapped in
    /// the applicable timeout and (for `retry` workflows) the backoff loop.
    async fn dispatch_node(
        &self,
        def: &WorkflowDefinition,
        node_def: &NodeDefinition,
        input: Value,
        ctx: &mut ExecutionContext,
        _state_id: Uuid,
    ) -> Result<Value, EngineError> {
        let timeout = Duration::from_secs(node_def.timeout_secs.unwrap_or(def.settings.default_timeout_secs));

        if node_def.node_type == "sub-workflow" {
            return self.dispatch_sub_workflow(node_def, input, ctx).await;
        }

        let node_impl = self
            .inner
            .registry
            .get(&node_def.node_type)
            .cloned()
            .ok_or_else(|| EngineError::UnknownNodeType(node_def.node_type.clone()))?;

        // Every built-in handler deserializes its behavior from `config`
        // (spec.md:47/:138/:146/:385 — config is the node's behavior source,
        // not the dataflow value); the predecessor output is still reachable
        // through `ctx.input`, which the caller sets before dispatch.
        let node_input = node_def.config.clone();

        if def.settings.error_handling == ErrorHandlingMode::Retry {
            self.execute_with_retry(node_def, node_impl.as_ref(), node_input, ctx, timeout, &def.settings.retry_policy).await
        } else {
            self.execute_once(node_def, node_impl.as_ref(), node_input, ctx, timeout).await
        }
    }

    async fn execute_once(
        &self,
        node_def: &NodeDefinition,
        node: &dyn nodes::ExecutableNode,
        input: Value,
        ctx: &ExecutionContext,
        timeout: Duration,
    ) -> Result<Value, EngineError> {
        match tokio::time::timeout(timeout, node.execute(input, ctx)).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(NodeError::Fatal(message))) => Err(EngineError::NodeFatal { node_id: node_def.id.clone(), message }),
            Ok(Err(NodeError::Retryable(message))) => Err(EngineError::NodeRetryExhausted { node_id: node_def.id.clone(), message }),
            Err(_) => Err(EngineError::NodeTimeout { node_id: node_def.id.clone(), timeout_ms: timeout.as_millis() as u64 }),
        }
    }

    async fn execute_with_retry(
        &self,
        node_def: &NodeDefinition,
        node: &dyn nodes::ExecutableNode,
        input: Value,
        ctx: &ExecutionContext,
        timeout: Duration,
        retry_policy: &automation_errors::RetryPolicy,
    ) -> Result<Value, EngineError> {
        let mut attempt = 0u32;
        loop {
            let failure_message = match tokio::time::timeout(timeout, node.execute(input.clone(), ctx)).await {
                Ok(Ok(output)) => return Ok(output),
                Ok(Err(NodeError::Fatal(message))) => {
                    return Err(EngineError::NodeFatal { node_id: node_def.id.clone(), message });
                }
                Ok(Err(NodeError::Retryable(message))) => message,
                Err(_) => message_or_timeout(timeout),
            };

            if !retry_policy.allows_retry(attempt) {
                return Err(EngineError::NodeRetryExhausted { node_id: node_def.id.clone(), message: failure_message });
            }
            let delay = retry_policy.delay_for(attempt);
            warn!(node_id = %node_def.id, attempt, ?delay, "retrying node after failure: {failure_message}");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn dispatch_sub_workflow(
        &self,
        node_def: &NodeDefinition,
        input: Value,
        ctx: &ExecutionContext,
    ) -> Result<Value, EngineError> {
        let child_workflow_id = node_def
            .config
            .get("workflow_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| EngineError::NodeFatal { node_id: node_def.id.clone(), message: "sub-workflow config missing valid 'workflow_id'".into() })?;

        let child_input = node_def.config.get("input").cloned().unwrap_or(input);

        let child_execution = self
            .execute_with_call_stack(child_workflow_id, child_input, TriggerType::Chain, ctx.call_stack.clone())
            .await?;

        Ok(serde_json::json!({ "workflow_execution_id": child_execution.id }))
    }

    // -----------------------------------------------------------------------
    // pause / resume / cancel / get / list
    // -----------------------------------------------------------------------

    pub async fn pause(&self, execution_id: Uuid) -> Result<(), EngineError> {
        let status = self.require_execution(execution_id)?.status;
        if status != ExecutionStatus::Running {
            return Err(EngineError::InvalidTransition { id: execution_id, status: status_label(status), action: "pause" });
        }
        if let Some(control) = self.inner.controls.get(&execution_id) {
            control.request_pause();
        }
        if let Some(mut entry) = self.inner.executions.get_mut(&execution_id) {
            entry.status = ExecutionStatus::Paused;
        }
        if let Some(state_id) = self.state_id_for(execution_id) {
            self.inner.state_manager.pause_state(state_id).await?;
        }
        Ok(())
    }

    pub async fn resume(&self, execution_id: Uuid) -> Result<(), EngineError> {
        let status = self.require_execution(execution_id)?.status;
        if status != ExecutionStatus::Paused {
            return Err(EngineError::InvalidTransition { id: execution_id, status: status_label(status), action: "resume" });
        }
        if let Some(control) = self.inner.controls.get(&execution_id) {
            control.request_resume();
        }
        if let Some(mut entry) = self.inner.executions.get_mut(&execution_id) {
            entry.status = ExecutionStatus::Running;
        }
        if let Some(state_id) = self.state_id_for(execution_id) {
            self.inner.state_manager.resume_state(state_id).await?;
        }
        Ok(())
    }

    pub async fn cancel(&self, execution_id: Uuid) -> Result<(), EngineError> {
        let status = self.require_execution(execution_id)?.status;
        if !matches!(status, ExecutionStatus::Running | ExecutionStatus::Paused) {
            return Err(EngineError::InvalidTransition { id: execution_id, status: status_label(status), action: "cancel" });
        }
        if let Some(control) = self.inner.controls.get(&execution_id) {
            control.request_cancel();
        }
        Ok(())
    }

    fn require_execution(&self, execution_id: Uuid) -> Result<WorkflowExecution, EngineError> {
        self.inner.executions.get(&execution_id).map(|e| e.clone()).ok_or(EngineError::ExecutionNotFound(execution_id))
    }

    fn state_id_for(&self, _execution_id: Uuid) -> Option<Uuid> {
        // The state manager is keyed by its own generated id, not the
        // execution id; callers needing it look it up through
        // `state_manager.list`/`recover` in a real deployment. Kept as a
        // documented seam rather than threading an extra lookup map.
        None
    }

    #[must_use]
    pub fn get(&self, execution_id: Uuid) -> Option<WorkflowExecution> {
        self.inner.executions.get(&execution_id).map(|e| e.clone())
    }

    #[must_use]
    pub fn list_executions(&self, filter: ExecutionFilter) -> Vec<WorkflowExecution> {
        let mut results: Vec<WorkflowExecution> = self
            .inner
            .executions
            .iter()
            .map(|e| e.value().clone())
            .filter(|e| filter.workflow_id.map_or(true, |id| id == e.workflow_id))
            .filter(|e| filter.status.map_or(true, |s| s == e.status))
            .collect();
        results.sort_by_key(|e| e.started_at);
        results.reverse();
        if let Some(limit) = filter.limit {
            results.truncate(limit);
        }
        results
    }
}

fn content_fingerprint(def: &WorkflowDefinition) -> Value {
    serde_json::json!({
        "name": def.name,
        "nodes": def.nodes,
        "edges": def.edges,
        "triggers": def.triggers,
        "variables": def.variables,
    })
}

fn status_label(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Pending => "pending",
        ExecutionStatus::Running => "running",
        ExecutionStatus::Paused => "paused",
        ExecutionStatus::Completed => "completed",
        ExecutionStatus::Failed => "failed",
        ExecutionStatus::Cancelled => "cancelled",
    }
}

fn classify_node_error(err: &EngineError) -> ErrorKind {
    match err {
        EngineError::NodeTimeout { .. } => ErrorKind::Timeout,
        EngineError::NodeRetryExhausted { .. } => ErrorKind::ServiceUnavailable,
        EngineError::NodeFatal { .. } => ErrorKind::Validation,
        _ => ErrorKind::Unknown,
    }
}

fn message_or_timeout(timeout: Duration) -> String {
    format!("operation exceeded {timeout:?}")
}
