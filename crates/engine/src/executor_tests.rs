//! Integration tests for `WorkflowEngine` against an in-memory stack: no
//! database, no real network — `state::MemoryPersistence` and
//! `nodes::mock::MockNode` stand in for the durable and external seams.

use std::collections::HashMap;
use std::sync::Arc;

use automation_errors::{ErrorHandler, ErrorHandlerConfig};
use nodes::flow_nodes::{ConditionNodeImpl, DelayNode};
use nodes::mock::MockNode;
use nodes::{ExecutableNode, NodeRegistry};
use serde_json::json;
use state::{MemoryPersistence, PersistenceStrategy, StateManager, StateManagerConfig};
use uuid::Uuid;

use crate::models::{Edge, ErrorHandlingMode, ExecutionStatus, NodeDefinition, NodeStatus, TriggerSpec, WorkflowDefinition};
use crate::{EngineConfig, WorkflowEngine};

fn node(id: &str) -> NodeDefinition {
    NodeDefinition { id: id.to_string(), node_type: id.to_string(), name: String::new(), config: serde_json::Value::Null, timeout_secs: None, precondition: None }
}

fn node_with_config(id: &str, node_type: &str, config: serde_json::Value) -> NodeDefinition {
    let mut n = node(id);
    n.node_type = node_type.to_string();
    n.config = config;
    n
}

fn edge(from: &str, to: &str) -> Edge {
    Edge { from: from.into(), to: to.into(), guard: None }
}

fn engine_with(registry: NodeRegistry) -> WorkflowEngine {
    let state_manager = Arc::new(StateManager::new(
        Arc::new(MemoryPersistence::default()),
        PersistenceStrategy::Memory,
        StateManagerConfig::default(),
    ));
    let error_handler = Arc::new(ErrorHandler::new(ErrorHandlerConfig::default()));
    WorkflowEngine::new(registry, state_manager, error_handler, EngineConfig::default())
}

fn registry_of<N: ExecutableNode + 'static>(nodes: Vec<(&str, Arc<N>)>) -> NodeRegistry {
    nodes.into_iter().map(|(k, v)| (k.to_string(), v as Arc<dyn ExecutableNode>)).collect()
}

#[tokio::test]
async fn three_node_pipeline_propagates_output_and_completes() {
    let a = Arc::new(MockNode::returning("a", json!({ "step": 1 })));
    let b = Arc::new(MockNode::returning("b", json!({ "step": 2 })));
    let c = Arc::new(MockNode::returning("c", json!({ "step": 3 })));
    let registry = registry_of(vec![("a", a.clone()), ("b", b.clone()), ("c", c.clone())]);
    let engine = engine_with(registry);

    let def = WorkflowDefinition::new(
        "linear",
        vec![TriggerSpec::Manual],
        vec![node("a"), node("b"), node("c")],
        vec![edge("a", "b"), edge("b", "c")],
    );
    let workflow_id = def.id;
    engine.register(def).unwrap();

    let execution = engine.execute(workflow_id, json!({ "origin": "trigger" }), crate::models::TriggerType::Manual).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.node_results.len(), 3);
    assert!(execution.node_results.iter().all(|r| r.status == NodeStatus::Success));
    assert_eq!(execution.context.output.unwrap()["node"], "c");
    assert_eq!(a.call_count(), 1);
    assert_eq!(b.call_count(), 1);
    assert_eq!(c.call_count(), 1);
}

#[tokio::test]
async fn stop_mode_aborts_at_first_failure() {
    let ok = Arc::new(MockNode::returning("ok", json!({})));
    let boom = Arc::new(MockNode::failing_fatal("boom", "something broke irreparably"));
    let never = Arc::new(MockNode::returning("never", json!({ "should": "not run" })));
    let registry = registry_of(vec![("ok", ok.clone()), ("boom", boom.clone()), ("never", never.clone())]);
    let engine = engine_with(registry);

    let mut def = WorkflowDefinition::new(
        "stop-on-failure",
        vec![TriggerSpec::Manual],
        vec![node("ok"), node("boom"), node("never")],
        vec![edge("ok", "boom"), edge("boom", "never")],
    );
    def.settings.error_handling = ErrorHandlingMode::Stop;
    let workflow_id = def.id;
    engine.register(def).unwrap();

    let execution = engine.execute(workflow_id, json!({}), crate::models::TriggerType::Manual).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.node_results.len(), 2);
    assert_eq!(execution.node_results[1].status, NodeStatus::Failure);
    assert_eq!(never.call_count(), 0);
}

#[tokio::test]
async fn continue_mode_keeps_dispatching_independent_nodes_after_failure() {
    let a = Arc::new(MockNode::returning("a", json!({})));
    let b = Arc::new(MockNode::failing_fatal("b", "transient-looking but fatal"));
    let c = Arc::new(MockNode::returning("c", json!({ "ran": true })));
    let registry = registry_of(vec![("a", a.clone()), ("b", b.clone()), ("c", c.clone())]);
    let engine = engine_with(registry);

    // Diamond without a join: a → b, a → c. b fails but c does not depend on
    // it, so under `continue` it still runs.
    let mut def = WorkflowDefinition::new(
        "continue-on-failure",
        vec![TriggerSpec::Manual],
        vec![node("a"), node("b"), node("c")],
        vec![edge("a", "b"), edge("a", "c")],
    );
    def.settings.error_handling = ErrorHandlingMode::Continue;
    let workflow_id = def.id;
    engine.register(def).unwrap();

    let execution = engine.execute(workflow_id, json!({}), crate::models::TriggerType::Manual).await.unwrap();

    // Per spec.md §4.1 step 5, only `stop` mode fails the execution on a
    // node failure; `continue` still completes.
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(c.call_count(), 1);
    assert!(execution.node_results.iter().any(|r| r.node_id == "b" && r.status == NodeStatus::Failure));
    assert!(execution.node_results.iter().any(|r| r.node_id == "c" && r.status == NodeStatus::Success));
}

#[tokio::test]
async fn precondition_false_skips_node_without_failing_execution() {
    let a = Arc::new(MockNode::returning("a", json!({})));
    let b = Arc::new(MockNode::returning("b", json!({})));
    let registry = registry_of(vec![("a", a.clone()), ("b", b.clone())]);
    let engine = engine_with(registry);

    let mut node_b = node("b");
    node_b.precondition = Some(nodes::condition::ConditionNode::Leaf(nodes::condition::Condition {
        id: "always-false".into(),
        field: "never_set".into(),
        operator: nodes::condition::Operator::Exists,
        value: None,
    }));

    let def = WorkflowDefinition::new("precondition", vec![TriggerSpec::Manual], vec![node("a"), node_b], vec![edge("a", "b")]);
    let workflow_id = def.id;
    engine.register(def).unwrap();

    let execution = engine.execute(workflow_id, json!({}), crate::models::TriggerType::Manual).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(execution.node_results.iter().any(|r| r.node_id == "b" && r.status == NodeStatus::Skipped));
    assert_eq!(b.call_count(), 0);
}

#[tokio::test]
async fn register_accepts_identical_re_registration_and_content_changes() {
    let engine = engine_with(registry_of(vec![("a", Arc::new(MockNode::returning("a", json!({}))))]));

    let def = WorkflowDefinition::new("versioned", vec![TriggerSpec::Manual], vec![node("a")], vec![]);
    engine.register(def.clone()).unwrap();
    // Identical re-registration is a no-op (spec.md §8 idempotence invariant).
    engine.register(def.clone()).unwrap();

    let mut changed = def;
    changed.settings.notify_on_failure = true;
    engine.register(changed).unwrap();
}

#[tokio::test]
async fn validate_reports_unknown_node_type() {
    let engine = engine_with(registry_of::<MockNode>(vec![]));
    let def = WorkflowDefinition::new("unknown-type", vec![TriggerSpec::Manual], vec![node("ghost-type")], vec![]);
    let report = engine.validate(&def);
    assert!(!report.valid);
    assert!(report.errors[0].contains("ghost-type"));
}

#[tokio::test]
async fn pause_unknown_execution_is_not_found() {
    let engine = engine_with(registry_of::<MockNode>(vec![]));
    let err = engine.pause(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, crate::EngineError::ExecutionNotFound(_)));
}

#[tokio::test]
async fn cancel_completed_execution_is_an_invalid_transition() {
    let a = Arc::new(MockNode::returning("a", json!({})));
    let engine = engine_with(registry_of(vec![("a", a)]));
    let def = WorkflowDefinition::new("solo", vec![TriggerSpec::Manual], vec![node("a")], vec![]);
    let workflow_id = def.id;
    engine.register(def).unwrap();
    let execution = engine.execute(workflow_id, json!({}), crate::models::TriggerType::Manual).await.unwrap();

    let err = engine.cancel(execution.id).await.unwrap_err();
    assert!(matches!(err, crate::EngineError::InvalidTransition { action: "cancel", .. }));
}

#[tokio::test]
async fn sub_workflow_dispatches_into_a_child_execution() {
    let child_node = Arc::new(MockNode::returning("child-step", json!({ "done": true })));
    let engine = engine_with(registry_of(vec![("child-step", child_node)]));

    let child_def = WorkflowDefinition::new("child", vec![TriggerSpec::Manual], vec![node("child-step")], vec![]);
    let child_id = child_def.id;
    engine.register(child_def).unwrap();

    let mut sub_node = node("parent-step");
    sub_node.node_type = "sub-workflow".into();
    sub_node.config = json!({ "workflow_id": child_id.to_string() });

    let parent_def = WorkflowDefinition::new("parent", vec![TriggerSpec::Manual], vec![sub_node], vec![]);
    let parent_id = parent_def.id;
    engine.register(parent_def).unwrap();

    let execution = engine.execute(parent_id, json!({}), crate::models::TriggerType::Manual).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(execution.node_results[0].output.as_ref().unwrap().get("workflow_execution_id").is_some());

    let child_runs = engine.list_executions(crate::models::ExecutionFilter { workflow_id: Some(child_id), ..Default::default() });
    assert_eq!(child_runs.len(), 1);
    assert_eq!(child_runs[0].status, ExecutionStatus::Completed);
}

#[tokio::test]
async fn sub_workflow_self_reference_is_rejected() {
    let engine = engine_with(registry_of::<MockNode>(vec![]));

    let workflow_id = Uuid::new_v4();
    let mut sub_node = node("recurse");
    sub_node.node_type = "sub-workflow".into();
    sub_node.config = json!({ "workflow_id": workflow_id.to_string() });

    let mut def = WorkflowDefinition::new("self-referential", vec![TriggerSpec::Manual], vec![sub_node], vec![]);
    def.id = workflow_id;
    engine.register(def).unwrap();

    // The cycle surfaces as a failed node (and, under the default `stop`
    // mode, a failed execution) rather than an engine-level error: from the
    // top-level caller's point of view a runaway sub-workflow is just
    // another node failure.
    let execution = engine.execute(workflow_id, json!({}), crate::models::TriggerType::Manual).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.node_results[0].error.as_ref().unwrap().contains("already on the call stack"));
}

#[tokio::test]
async fn delay_node_reads_duration_from_node_config_not_dataflow() {
    // `delay`'s parameters live only in `NodeDefinition.config`; the
    // predecessor's dataflow output is unrelated JSON that would fail to
    // deserialize as `DelayConfig` if ever handed to the node instead.
    let registry = registry_of(vec![("delay", Arc::new(DelayNode))]);
    let engine = engine_with(registry);

    let delay = node_with_config("wait", "delay", json!({ "duration": 5, "unit": "milliseconds" }));
    let def = WorkflowDefinition::new("delay-config", vec![TriggerSpec::Manual], vec![delay], vec![]);
    let workflow_id = def.id;
    engine.register(def).unwrap();

    let execution = engine
        .execute(workflow_id, json!({ "not": "a delay config" }), crate::models::TriggerType::Manual)
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    let output = execution.node_results[0].output.as_ref().unwrap();
    assert_eq!(output["delayed"], json!(true));
    assert_eq!(output["duration"], json!(5));
}

#[tokio::test]
async fn condition_node_evaluates_tree_from_node_config() {
    let registry = registry_of(vec![("condition", Arc::new(ConditionNodeImpl))]);
    let engine = engine_with(registry);

    let condition = node_with_config(
        "gate",
        "condition",
        json!({ "id": "is-gold", "field": "tier", "operator": "eq", "value": "gold" }),
    );
    let def = WorkflowDefinition::new("condition-config", vec![TriggerSpec::Manual], vec![condition], vec![]);
    let workflow_id = def.id;
    engine.register(def).unwrap();

    let execution = engine
        .execute(workflow_id, json!({ "tier": "gold" }), crate::models::TriggerType::Manual)
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    let output = execution.node_results[0].output.as_ref().unwrap();
    assert_eq!(output["result"], json!(true));
}

#[tokio::test]
async fn stop_mode_failure_with_no_skipped_nodes_reports_full_progress() {
    let a = Arc::new(MockNode::returning("a", json!({})));
    let boom = Arc::new(MockNode::failing_fatal("boom", "unrecoverable"));
    let registry = registry_of(vec![("a", a), ("boom", boom)]);
    let engine = engine_with(registry);

    let mut def = WorkflowDefinition::new(
        "stop-progress",
        vec![TriggerSpec::Manual],
        vec![node("a"), node("boom")],
        vec![edge("a", "boom")],
    );
    def.settings.error_handling = ErrorHandlingMode::Stop;
    let workflow_id = def.id;
    engine.register(def).unwrap();

    let execution = engine.execute(workflow_id, json!({}), crate::models::TriggerType::Manual).await.unwrap();

    // Spec.md §5's progress invariant: 100 iff status is completed or failed
    // and no node was skipped — a stopped-on-failure run with every declared
    // node dispatched (none skipped) must still report full progress.
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(!execution.node_results.iter().any(|r| r.status == NodeStatus::Skipped));
    assert_eq!(execution.progress, 100);
}
