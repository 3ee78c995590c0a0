//! DAG validation — run this before registering or executing a workflow.
//!
//! Rules enforced (spec.md §4.1 "Validation"):
//! 1. Non-empty node set.
//! 2. Node IDs must be unique within the workflow.
//! 3. Every edge must reference valid node IDs (both `from` and `to`).
//! 4. At least one start node (no incoming edge) exists.
//! 5. The directed graph must be acyclic (topological sort must succeed).
//!
//! Returns a topologically-sorted list of node IDs on success, with
//! unreached (disconnected) nodes appended at the end — disconnected
//! components are legal per spec.md §4.1 step 3.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::models::WorkflowDefinition;
use crate::EngineError;

/// Validate the workflow's DAG and return nodes in topological execution order.
///
/// # Errors
/// - [`EngineError::EmptyWorkflow`] if there are no nodes.
/// - [`EngineError::DuplicateNodeId`] if two nodes share an ID.
/// - [`EngineError::UnknownNodeReference`] if an edge references a missing node.
/// - [`EngineError::NoStartNode`] if every node has an incoming edge.
/// - [`EngineError::CycleDetected`] if the graph is not acyclic.
pub fn validate_dag(workflow: &WorkflowDefinition) -> Result<Vec<String>, EngineError> {
    if workflow.nodes.is_empty() {
        return Err(EngineError::EmptyWorkflow);
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in &workflow.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    let node_set: HashSet<&str> = workflow.nodes.iter().map(|n| n.id.as_str()).collect();

    for edge in &workflow.edges {
        if !node_set.contains(edge.from.as_str()) {
            return Err(EngineError::UnknownNodeReference { node_id: edge.from.clone(), side: "from" });
        }
        if !node_set.contains(edge.to.as_str()) {
            return Err(EngineError::UnknownNodeReference { node_id: edge.to.clone(), side: "to" });
        }
    }

    // Declaration order drives deterministic tie-breaks (spec.md §4.1.1
    // "Tie-breaks in the topological order are deterministic by the order
    // of node declaration").
    let declaration_order: Vec<&str> = workflow.nodes.iter().map(|n| n.id.as_str()).collect();

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();

    for &id in &declaration_order {
        adjacency.entry(id).or_default();
        in_degree.entry(id).or_insert(0);
    }

    for edge in &workflow.edges {
        adjacency.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
        *in_degree.entry(edge.to.as_str()).or_insert(0) += 1;
    }

    if workflow.nodes.len() > 1 && in_degree.values().all(|&d| d > 0) {
        return Err(EngineError::NoStartNode);
    }

    let mut queue: VecDeque<&str> = declaration_order
        .iter()
        .copied()
        .filter(|id| in_degree.get(id).copied().unwrap_or(0) == 0)
        .collect();

    let mut sorted: Vec<String> = Vec::with_capacity(workflow.nodes.len());

    while let Some(node_id) = queue.pop_front() {
        sorted.push(node_id.to_owned());

        if let Some(neighbours) = adjacency.get(node_id) {
            // Stable order: visit neighbours in declaration order, not
            // insertion order, so ties resolve deterministically.
            let mut ready: Vec<&str> = Vec::new();
            for &neighbour in neighbours {
                let deg = in_degree.entry(neighbour).or_insert(0);
                *deg -= 1;
                if *deg == 0 {
                    ready.push(neighbour);
                }
            }
            for id in declaration_order.iter().filter(|id| ready.contains(id)) {
                queue.push_back(id);
            }
        }
    }

    if sorted.len() != workflow.nodes.len() {
        let cycle_node = declaration_order
            .iter()
            .find(|id| !sorted.contains(&(**id).to_owned()))
            .copied()
            .unwrap_or("unknown");
        return Err(EngineError::CycleDetected(cycle_node.to_owned()));
    }

    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Edge, NodeDefinition, TriggerSpec};

    fn make_node(id: &str) -> NodeDefinition {
        NodeDefinition {
            id: id.to_string(),
            node_type: "mock".into(),
            name: String::new(),
            config: serde_json::Value::Null,
            timeout_secs: None,
            precondition: None,
        }
    }

    fn edge(from: &str, to: &str) -> Edge {
        Edge { from: from.into(), to: to.into(), guard: None }
    }

    fn make_workflow(nodes: Vec<NodeDefinition>, edges: Vec<Edge>) -> WorkflowDefinition {
        WorkflowDefinition::new("test", vec![TriggerSpec::Manual], nodes, edges)
    }

    #[test]
    fn valid_linear_dag_returns_sorted_order() {
        let workflow = make_workflow(
            vec![make_node("a"), make_node("b"), make_node("c")],
            vec![edge("a", "b"), edge("b", "c")],
        );
        let sorted = validate_dag(&workflow).expect("should be valid");
        assert_eq!(sorted, vec!["a", "b", "c"]);
    }

    #[test]
    fn valid_diamond_dag() {
        let workflow = make_workflow(
            vec![make_node("a"), make_node("b"), make_node("c"), make_node("d")],
            vec![edge("a", "b"), edge("a", "c"), edge("b", "d"), edge("c", "d")],
        );
        let sorted = validate_dag(&workflow).expect("should be valid");
        assert_eq!(sorted.first().unwrap(), "a");
        assert_eq!(sorted.last().unwrap(), "d");
        assert_eq!(sorted.len(), 4);
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let workflow = make_workflow(vec![make_node("a"), make_node("a")], vec![]);
        assert!(matches!(validate_dag(&workflow), Err(EngineError::DuplicateNodeId(id)) if id == "a"));
    }

    #[test]
    fn edge_referencing_missing_node_is_rejected() {
        let workflow = make_workflow(vec![make_node("a")], vec![edge("a", "ghost")]);
        assert!(matches!(
            validate_dag(&workflow),
            Err(EngineError::UnknownNodeReference { node_id, .. }) if node_id == "ghost"
        ));
    }

    #[test]
    fn cycle_is_detected() {
        let workflow = make_workflow(
            vec![make_node("a"), make_node("b"), make_node("c")],
            vec![edge("a", "b"), edge("b", "c"), edge("c", "a")],
        );
        assert!(matches!(validate_dag(&workflow), Err(EngineError::CycleDetected(_))));
    }

    #[test]
    fn single_node_no_edges_is_valid() {
        let workflow = make_workflow(vec![make_node("solo")], vec![]);
        let sorted = validate_dag(&workflow).expect("single node should be valid");
        assert_eq!(sorted, vec!["solo"]);
    }

    #[test]
    fn every_node_with_incoming_edge_is_rejected() {
        let workflow = make_workflow(vec![make_node("a"), make_node("b")], vec![edge("a", "b"), edge("b", "a")]);
        // This is actually a cycle (both have in-degree 1 via each other);
        // covered by cycle detection, not NoStartNode, since Kahn's queue
        // starts empty and nothing ever gets sorted.
        assert!(matches!(validate_dag(&workflow), Err(EngineError::CycleDetected(_))));
    }

    #[test]
    fn empty_workflow_is_rejected() {
        let workflow = make_workflow(vec![], vec![]);
        assert!(matches!(validate_dag(&workflow), Err(EngineError::EmptyWorkflow)));
    }
}
