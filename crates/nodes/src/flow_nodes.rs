//! Flow/control node types (spec §4.1.1): `condition`, `switch-condition`,
//! `delay`, `data-transform`, `variable-setter`, `logger`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::condition::{evaluate, ConditionNode};
use crate::{ExecutableNode, NodeError, traits::ExecutionContext};

// ---------------------------------------------------------------------------
// condition
// ---------------------------------------------------------------------------

/// `condition` — AND/OR tree of `ConditionRule`s (spec §4.1.1).
pub struct ConditionNodeImpl;

#[async_trait]
impl ExecutableNode for ConditionNodeImpl {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let tree: ConditionNode = serde_json::from_value(input)
            .map_err(|e| NodeError::Fatal(format!("condition node: invalid config: {e}")))?;

        let variables = ctx.variables_snapshot();
        let outcome = evaluate(&tree, &variables);

        Ok(json!({ "result": outcome.result, "evaluation": outcome.details }))
    }
}

// ---------------------------------------------------------------------------
// switch-condition
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SwitchCase {
    name: String,
    #[serde(rename = "when")]
    condition: ConditionNode,
}

#[derive(Debug, Deserialize)]
struct SwitchConfig {
    cases: Vec<SwitchCase>,
    #[serde(default)]
    default_case: Option<String>,
}

/// `switch-condition` — first matching case, or the configured default.
pub struct SwitchConditionNode;

#[async_trait]
impl ExecutableNode for SwitchConditionNode {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let config: SwitchConfig = serde_json::from_value(input)
            .map_err(|e| NodeError::Fatal(format!("switch-condition: invalid config: {e}")))?;

        let variables = ctx.variables_snapshot();

        for case in &config.cases {
            if evaluate(&case.condition, &variables).result {
                return Ok(json!({ "matched": true, "matched_case": case.name }));
            }
        }

        match config.default_case {
            Some(default_case) => Ok(json!({ "matched": false, "default_case": default_case })),
            None => Ok(json!({ "matched": false, "default_case": Value::Null })),
        }
    }
}

// ---------------------------------------------------------------------------
// delay
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DelayConfig {
    duration: u64,
    #[serde(default = "default_unit")]
    unit: String,
}

fn default_unit() -> String {
    "seconds".to_owned()
}

fn to_std_duration(amount: u64, unit: &str) -> Duration {
    match unit {
        "milliseconds" | "ms" => Duration::from_millis(amount),
        "minutes" => Duration::from_secs(amount * 60),
        "hours" => Duration::from_secs(amount * 3600),
        _ => Duration::from_secs(amount),
    }
}

/// `delay` — sleeps for the configured duration, a registry node like any
/// other. The engine only checks for a `cancel` between node dispatches
/// (spec §5), so a delay in progress runs to completion (or its own
/// per-node timeout) rather than being interrupted mid-sleep.
pub struct DelayNode;

#[async_trait]
impl ExecutableNode for DelayNode {
    async fn execute(&self, input: Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let config: DelayConfig = serde_json::from_value(input)
            .map_err(|e| NodeError::Fatal(format!("delay: invalid config: {e}")))?;

        tokio::time::sleep(to_std_duration(config.duration, &config.unit)).await;

        Ok(json!({ "delayed": true, "duration": config.duration }))
    }
}

// ---------------------------------------------------------------------------
// data-transform
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum TransformOp {
    /// Project a subset of fields, optionally renaming (`{from: to}`).
    Map { fields: std::collections::HashMap<String, String> },
    /// Keep only array elements whose `field` passes `equals`.
    Filter { field: String, equals: Value },
    /// Re-serialize to a different textual format. Only `json` is meaningful
    /// without a schema; kept for forward compatibility with richer formats.
    Format { as_type: String },
}

#[derive(Debug, Deserialize)]
struct DataTransformConfig {
    data: Value,
    #[serde(default)]
    ops: Vec<TransformOp>,
}

fn apply_op(data: Value, op: &TransformOp) -> Value {
    match op {
        TransformOp::Map { fields } => match data {
            Value::Object(obj) => {
                let mut out = serde_json::Map::new();
                for (from, to) in fields {
                    if let Some(v) = obj.get(from) {
                        out.insert(to.clone(), v.clone());
                    }
                }
                Value::Object(out)
            }
            other => other,
        },
        TransformOp::Filter { field, equals } => match data {
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .filter(|item| item.get(field) == Some(equals))
                    .collect(),
            ),
            other => other,
        },
        TransformOp::Format { as_type } => {
            if as_type == "string" {
                Value::String(data.to_string())
            } else {
                data
            }
        }
    }
}

/// `data-transform` — applies mapping/filter/format ops in sequence.
pub struct DataTransformNode;

#[async_trait]
impl ExecutableNode for DataTransformNode {
    async fn execute(&self, input: Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let config: DataTransformConfig = serde_json::from_value(input)
            .map_err(|e| NodeError::Fatal(format!("data-transform: invalid config: {e}")))?;

        let transformed = config.ops.iter().fold(config.data, |acc, op| apply_op(acc, op));

        Ok(json!({ "transformed": true, "data": transformed }))
    }
}

// ---------------------------------------------------------------------------
// variable-setter
// ---------------------------------------------------------------------------

/// `variable-setter` — merges constants into `context.variables`.
pub struct VariableSetterNode;

#[async_trait]
impl ExecutableNode for VariableSetterNode {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let constants = input
            .as_object()
            .cloned()
            .ok_or_else(|| NodeError::Fatal("variable-setter: config must be a JSON object".into()))?;

        let count = constants.len();
        for (key, value) in constants {
            ctx.set_variable(key, value);
        }

        Ok(json!({ "set": true, "count": count }))
    }
}

// ---------------------------------------------------------------------------
// logger
// ---------------------------------------------------------------------------

/// `logger` — appends a structured entry to the execution's trace log.
pub struct LoggerNode;

#[async_trait]
impl ExecutableNode for LoggerNode {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let message = input
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("(no message)");
        tracing::info!(execution_id = %ctx.execution_id, "{message}");
        Ok(json!({ "logged": true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_ctx;

    #[tokio::test]
    async fn condition_node_reports_result_and_evaluation() {
        let node = ConditionNodeImpl;
        let ctx = test_ctx();
        ctx.set_variable("active", json!(true));
        // `ConditionNode` is `#[serde(untagged)]`: a leaf is just the bare
        // `Condition` object (no variant-name wrapper).
        let config = json!({"id": "c1", "field": "active", "operator": "isTrue"});
        let out = node.execute(config, &ctx).await.unwrap();
        assert_eq!(out["result"], json!(true));
        assert!(out["evaluation"].is_array());
    }

    #[tokio::test]
    async fn switch_condition_first_match_wins() {
        let node = SwitchConditionNode;
        let ctx = test_ctx();
        ctx.set_variable("tier", json!("gold"));
        let config = json!({
            "cases": [
                {"name": "silver", "when": {"id": "s", "field": "tier", "operator": "eq", "value": "silver"}},
                {"name": "gold", "when": {"id": "g", "field": "tier", "operator": "eq", "value": "gold"}},
            ],
            "default_case": "none",
        });
        let out = node.execute(config, &ctx).await.unwrap();
        assert_eq!(out["matched_case"], json!("gold"));
    }

    #[tokio::test]
    async fn variable_setter_merges_and_counts() {
        let node = VariableSetterNode;
        let ctx = test_ctx();
        let out = node.execute(json!({"a": 1, "b": 2}), &ctx).await.unwrap();
        assert_eq!(out["count"], json!(2));
        assert_eq!(ctx.get_variable("a"), Some(json!(1)));
    }

    #[tokio::test]
    async fn data_transform_maps_fields() {
        let node = DataTransformNode;
        let config = json!({
            "data": {"first": "Ada", "last": "Lovelace"},
            "ops": [{"op": "map", "fields": {"first": "given_name"}}],
        });
        let out = node.execute(config, &test_ctx()).await.unwrap();
        assert_eq!(out["data"]["given_name"], json!("Ada"));
        assert!(out["data"].get("last").is_none());
    }

    #[tokio::test]
    async fn delay_sleeps_for_configured_duration() {
        let node = DelayNode;
        let start = std::time::Instant::now();
        node.execute(json!({"duration": 10, "unit": "milliseconds"}), &test_ctx())
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
