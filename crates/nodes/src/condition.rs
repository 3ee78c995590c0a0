//! `ConditionEvaluator` (spec §4.8) — a pure, side-effect-free expression
//! engine over an execution context. Lives in `nodes` (rather than `engine`)
//! because both the `condition`/`switch-condition` node types and the
//! engine's own edge-guard/precondition checks need it, and `nodes` has no
//! dependency on `engine`.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single leaf comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub id: String,
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Option<Value>,
}

/// How a [`ConditionGroup`] combines its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicOp {
    And,
    Or,
}

/// A tree of conditions: either a leaf [`Condition`] or a group combining
/// other nodes with AND/OR and an optional negation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionNode {
    Leaf(Condition),
    Group(ConditionGroup),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub op: LogicOp,
    pub nodes: Vec<ConditionNode>,
    #[serde(default)]
    pub negate: bool,
}

/// Supported comparison operators (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    StartsWith,
    EndsWith,
    Regex,
    Exists,
    Empty,
    In,
    NotIn,
    Between,
    IsNull,
    IsTrue,
    IsFalse,
    HasLength,
    HasKey,
    Match,
    Custom,
}

/// Per-leaf evaluation detail, returned alongside the overall result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationDetail {
    pub condition_id: String,
    pub field: String,
    pub operator: Operator,
    pub expected: Option<Value>,
    pub actual: Option<Value>,
    pub result: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub success: bool,
    pub result: bool,
    pub details: Vec<EvaluationDetail>,
    pub execution_time_ms: f64,
}

/// Resolves a dotted field path against a JSON context. Missing segments
/// yield `None`, which operators interpret per spec (`exists`/`isNull`
/// treat it meaningfully, most others short-circuit to `false`).
fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolves a value reference: a literal, `$name` (a variable lookup), or
/// `@fn(args)` (a registered pure function). Literals pass through unchanged.
///
/// Exposed at crate visibility so `javascript-action` can reuse the same
/// resolver instead of evaluating arbitrary code (spec.md §9 design note).
pub(crate) fn resolve_value(raw: &Value, variables: &serde_json::Map<String, Value>) -> Value {
    if let Value::String(s) = raw {
        if let Some(name) = s.strip_prefix('$') {
            return variables.get(name).cloned().unwrap_or(Value::Null);
        }
        if let Some(call) = s.strip_prefix('@') {
            return call_function(call, variables);
        }
    }
    raw.clone()
}

fn call_function(call: &str, variables: &serde_json::Map<String, Value>) -> Value {
    let (name, args_str) = match call.find('(') {
        Some(idx) if call.ends_with(')') => (&call[..idx], &call[idx + 1..call.len() - 1]),
        _ => (call, ""),
    };
    let args: Vec<&str> = if args_str.is_empty() {
        Vec::new()
    } else {
        args_str.split(',').map(str::trim).collect()
    };

    match name {
        "now" => Value::String(chrono::Utc::now().to_rfc3339()),
        "today" => Value::String(chrono::Utc::now().date_naive().to_string()),
        "tomorrow" => Value::String((chrono::Utc::now() + chrono::Duration::days(1)).date_naive().to_string()),
        "daysAgo" => {
            let n: i64 = args.first().and_then(|a| a.parse().ok()).unwrap_or(0);
            Value::String((chrono::Utc::now() - chrono::Duration::days(n)).date_naive().to_string())
        }
        "daysFromNow" => {
            let n: i64 = args.first().and_then(|a| a.parse().ok()).unwrap_or(0);
            Value::String((chrono::Utc::now() + chrono::Duration::days(n)).date_naive().to_string())
        }
        "toLowerCase" => {
            let v = args.first().and_then(|a| variables.get(a.trim_start_matches('$'))).cloned();
            Value::String(v.and_then(|v| v.as_str().map(str::to_lowercase)).unwrap_or_default())
        }
        "toUpperCase" => {
            let v = args.first().and_then(|a| variables.get(a.trim_start_matches('$'))).cloned();
            Value::String(v.and_then(|v| v.as_str().map(str::to_uppercase)).unwrap_or_default())
        }
        "trim" => {
            let v = args.first().and_then(|a| variables.get(a.trim_start_matches('$'))).cloned();
            Value::String(v.and_then(|v| v.as_str().map(str::trim).map(str::to_owned)).unwrap_or_default())
        }
        "length" => {
            let v = args.first().and_then(|a| variables.get(a.trim_start_matches('$'))).cloned();
            let len = match v {
                Some(Value::String(s)) => s.chars().count(),
                Some(Value::Array(a)) => a.len(),
                _ => 0,
            };
            Value::Number(len.into())
        }
        "count" | "sum" | "average" => {
            let arr = args.first().and_then(|a| variables.get(a.trim_start_matches('$'))).and_then(|v| v.as_array().cloned()).unwrap_or_default();
            let nums: Vec<f64> = arr.iter().filter_map(Value::as_f64).collect();
            match name {
                "count" => Value::Number(arr.len().into()),
                "sum" => serde_json::Number::from_f64(nums.iter().sum()).map(Value::Number).unwrap_or(Value::Null),
                _ => {
                    let avg = if nums.is_empty() { 0.0 } else { nums.iter().sum::<f64>() / nums.len() as f64 };
                    serde_json::Number::from_f64(avg).map(Value::Number).unwrap_or(Value::Null)
                }
            }
        }
        _ => Value::Null,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    v.as_f64()
}

/// Evaluates a single operator against a resolved actual/expected pair.
/// Exposed at crate-public visibility so other crates (e.g. `triggers`'
/// webhook condition gating) can reuse the same operator semantics instead
/// of re-implementing them.
pub fn eval_operator(op: Operator, actual: Option<&Value>, expected: Option<&Value>) -> Result<bool, String> {
    use Operator::*;
    Ok(match op {
        Exists => actual.is_some() && !actual.unwrap().is_null(),
        IsNull => actual.map(Value::is_null).unwrap_or(true),
        Empty => match actual {
            None => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(Value::Array(a)) => a.is_empty(),
            Some(Value::Object(o)) => o.is_empty(),
            Some(Value::Null) => true,
            _ => false,
        },
        IsTrue => matches!(actual, Some(Value::Bool(true))),
        IsFalse => matches!(actual, Some(Value::Bool(false))),
        _ => {
            let actual = match actual {
                Some(v) => v,
                None => return Ok(false),
            };
            match op {
                Eq => Some(actual) == expected,
                Neq => Some(actual) != expected,
                Gt => as_f64(actual).zip(expected.and_then(as_f64)).map(|(a, b)| a > b).unwrap_or(false),
                Gte => as_f64(actual).zip(expected.and_then(as_f64)).map(|(a, b)| a >= b).unwrap_or(false),
                Lt => as_f64(actual).zip(expected.and_then(as_f64)).map(|(a, b)| a < b).unwrap_or(false),
                Lte => as_f64(actual).zip(expected.and_then(as_f64)).map(|(a, b)| a <= b).unwrap_or(false),
                Contains => match (actual, expected) {
                    (Value::String(a), Some(Value::String(b))) => a.contains(b.as_str()),
                    (Value::Array(a), Some(b)) => a.contains(b),
                    _ => false,
                },
                StartsWith => matches!((actual, expected), (Value::String(a), Some(Value::String(b))) if a.starts_with(b.as_str())),
                EndsWith => matches!((actual, expected), (Value::String(a), Some(Value::String(b))) if a.ends_with(b.as_str())),
                Regex | Match => {
                    let (Value::String(a), Some(Value::String(pattern))) = (actual, expected) else {
                        return Ok(false);
                    };
                    let re = regex::Regex::new(pattern).map_err(|e| e.to_string())?;
                    re.is_match(a)
                }
                In => match expected {
                    Some(Value::Array(arr)) => arr.contains(actual),
                    _ => false,
                },
                NotIn => match expected {
                    Some(Value::Array(arr)) => !arr.contains(actual),
                    _ => true,
                },
                Between => match expected {
                    Some(Value::Array(bounds)) if bounds.len() == 2 => {
                        let (lo, hi) = (as_f64(&bounds[0]), as_f64(&bounds[1]));
                        match (as_f64(actual), lo, hi) {
                            (Some(a), Some(lo), Some(hi)) => a >= lo && a <= hi,
                            _ => false,
                        }
                    }
                    _ => false,
                },
                HasLength => {
                    let len = match actual {
                        Value::String(s) => s.chars().count(),
                        Value::Array(a) => a.len(),
                        _ => return Ok(false),
                    };
                    expected.and_then(as_f64).map(|n| len as f64 == n).unwrap_or(false)
                }
                HasKey => match (actual, expected) {
                    (Value::Object(o), Some(Value::String(k))) => o.contains_key(k),
                    _ => false,
                },
                Custom => false, // no untrusted-code path; custom functions must be registered by name via `@fn`.
                Exists | IsNull | Empty | IsTrue | IsFalse => unreachable!(),
            }
        }
    })
}

/// Evaluates a condition tree against `variables`. Field paths are resolved
/// against `variables` (the flattened execution context).
#[must_use]
pub fn evaluate(
    node: &ConditionNode,
    variables: &serde_json::Map<String, Value>,
) -> EvaluationOutcome {
    let started = Instant::now();
    let mut details = Vec::new();
    let root = Value::Object(variables.clone());
    let result = evaluate_node(node, &root, variables, &mut details);

    EvaluationOutcome {
        success: true,
        result,
        details,
        execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
    }
}

fn evaluate_node(
    node: &ConditionNode,
    root: &Value,
    variables: &serde_json::Map<String, Value>,
    details: &mut Vec<EvaluationDetail>,
) -> bool {
    match node {
        ConditionNode::Leaf(cond) => {
            let actual = resolve_path(root, &cond.field).cloned();
            let expected = cond.value.as_ref().map(|v| resolve_value(v, variables));
            let outcome = eval_operator(cond.operator, actual.as_ref(), expected.as_ref());

            let (result, error) = match outcome {
                Ok(r) => (r, None),
                Err(e) => (false, Some(e)),
            };

            details.push(EvaluationDetail {
                condition_id: cond.id.clone(),
                field: cond.field.clone(),
                operator: cond.operator,
                expected,
                actual,
                result,
                error,
            });

            result
        }
        ConditionNode::Group(group) => {
            let mut iter = group.nodes.iter().map(|n| evaluate_node(n, root, variables, details));
            let raw = match group.op {
                LogicOp::And => iter.all(|r| r),
                LogicOp::Or => iter.any(|r| r),
            };
            if group.negate {
                !raw
            } else {
                raw
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> serde_json::Map<String, Value> {
        let mut m = serde_json::Map::new();
        m.insert("status".into(), json!("active"));
        m.insert("count".into(), json!(7));
        m.insert("tags".into(), json!(["a", "b"]));
        m
    }

    fn leaf(field: &str, op: Operator, value: Option<Value>) -> ConditionNode {
        ConditionNode::Leaf(Condition { id: field.to_owned(), field: field.to_owned(), operator: op, value })
    }

    #[test]
    fn eq_matches() {
        let outcome = evaluate(&leaf("status", Operator::Eq, Some(json!("active"))), &vars());
        assert!(outcome.result);
    }

    #[test]
    fn gt_on_number() {
        let outcome = evaluate(&leaf("count", Operator::Gt, Some(json!(5))), &vars());
        assert!(outcome.result);
        let outcome = evaluate(&leaf("count", Operator::Gt, Some(json!(50))), &vars());
        assert!(!outcome.result);
    }

    #[test]
    fn exists_and_missing_field() {
        let outcome = evaluate(&leaf("nope", Operator::Exists, None), &vars());
        assert!(!outcome.result);
    }

    #[test]
    fn and_group_short_circuits_to_false_on_one_mismatch() {
        let group = ConditionNode::Group(ConditionGroup {
            op: LogicOp::And,
            negate: false,
            nodes: vec![
                leaf("status", Operator::Eq, Some(json!("active"))),
                leaf("count", Operator::Gt, Some(json!(100))),
            ],
        });
        let outcome = evaluate(&group, &vars());
        assert!(!outcome.result);
        assert_eq!(outcome.details.len(), 2);
    }

    #[test]
    fn negated_or_group() {
        let group = ConditionNode::Group(ConditionGroup {
            op: LogicOp::Or,
            negate: true,
            nodes: vec![leaf("status", Operator::Eq, Some(json!("inactive")))],
        });
        let outcome = evaluate(&group, &vars());
        assert!(outcome.result);
    }

    #[test]
    fn variable_reference_resolves() {
        let mut variables = vars();
        variables.insert("threshold".into(), json!(5));
        let cond = leaf("count", Operator::Gt, Some(json!("$threshold")));
        let outcome = evaluate(&cond, &variables);
        assert!(outcome.result);
    }

    #[test]
    fn contains_on_array() {
        let outcome = evaluate(&leaf("tags", Operator::Contains, Some(json!("a"))), &vars());
        assert!(outcome.result);
    }
}
