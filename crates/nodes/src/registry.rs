//! The default node-type → `ExecutableNode` registry.
//!
//! `sub-workflow` is deliberately absent: spec.md §2/§4.1 classifies it as an
//! engine-intrinsic operation, so `engine::WorkflowEngine` special-cases it
//! rather than looking it up here. `delay` is an ordinary registry node
//! (`DelayNode`, below) — its sleep runs to completion or times out like any
//! other node's dispatch, but is not abandonable by a running `cancel` the
//! way the per-node loop boundary is (see `DelayNode`'s own doc comment).

use std::collections::HashMap;
use std::sync::Arc;

use crate::action_nodes::{
    DatabaseActionNode, EmailActionNode, FileActionNode, HttpActionNode, JavascriptActionNode,
    NotificationActionNode, SocialActionNode,
};
use crate::flow_nodes::{ConditionNodeImpl, DataTransformNode, DelayNode, LoggerNode, SwitchConditionNode, VariableSetterNode};
use crate::trigger_nodes::ManualTriggerNode;
use crate::ExecutableNode;

pub type NodeRegistry = HashMap<String, Arc<dyn ExecutableNode>>;

/// Builds a registry containing every built-in node type except the
/// engine-intrinsic `sub-workflow` and the trigger-echo nodes that need
/// per-workflow configuration (`webhook-trigger`, `schedule-trigger`), which
/// callers register themselves once they know that configuration.
#[must_use]
pub fn default_registry() -> NodeRegistry {
    let mut registry: NodeRegistry = HashMap::new();

    registry.insert("manual-trigger".into(), Arc::new(ManualTriggerNode));
    registry.insert("http-action".into(), Arc::new(HttpActionNode::default()));
    registry.insert("email-action".into(), Arc::new(EmailActionNode::default()));
    registry.insert("database-action".into(), Arc::new(DatabaseActionNode::default()));
    registry.insert("social-action".into(), Arc::new(SocialActionNode::default()));
    registry.insert("javascript-action".into(), Arc::new(JavascriptActionNode));
    registry.insert("file-action".into(), Arc::new(FileActionNode::default()));
    registry.insert("notification-action".into(), Arc::new(NotificationActionNode::default()));
    registry.insert("condition".into(), Arc::new(ConditionNodeImpl));
    registry.insert("switch-condition".into(), Arc::new(SwitchConditionNode));
    registry.insert("delay".into(), Arc::new(DelayNode));
    registry.insert("data-transform".into(), Arc::new(DataTransformNode));
    registry.insert("variable-setter".into(), Arc::new(VariableSetterNode));
    registry.insert("logger".into(), Arc::new(LoggerNode));

    registry
}

/// Node types the engine must special-case rather than dispatch through a
/// [`NodeRegistry`] (spec §2 overview flow, §4.1 step 4).
#[must_use]
pub fn is_engine_intrinsic(node_type: &str) -> bool {
    matches!(node_type, "sub-workflow")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_covers_every_non_intrinsic_built_in_type() {
        let registry = default_registry();
        for ty in [
            "manual-trigger", "http-action", "email-action", "database-action",
            "social-action", "javascript-action", "file-action", "notification-action",
            "condition", "switch-condition", "delay", "data-transform",
            "variable-setter", "logger",
        ] {
            assert!(registry.contains_key(ty), "missing node type '{ty}'");
        }
        assert!(!registry.contains_key("sub-workflow"));
        assert!(is_engine_intrinsic("sub-workflow"));
    }
}
