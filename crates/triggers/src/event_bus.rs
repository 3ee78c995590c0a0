//! In-process pub/sub (spec.md §4.5). Delivery is synchronous: `publish`
//! walks matching subscriptions in descending-priority order and invokes the
//! engine directly, rather than handing off to a background queue — matching
//! `TaskScheduler`'s own dispatch-is-the-return-value style.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use engine::{TriggerType, WorkflowEngine};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

/// Comparison operators available to `EventFilter` (spec.md §4.5), a subset
/// of `nodes::condition::Operator` scoped to what event filtering needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
    Contains,
    Regex,
    Exists,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFilter {
    pub path: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default = "default_case_sensitive")]
    pub case_sensitive: bool,
}

fn default_case_sensitive() -> bool {
    true
}

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

fn as_comparable_string(value: &Value, case_sensitive: bool) -> Option<String> {
    let s = value.as_str()?.to_owned();
    Some(if case_sensitive { s } else { s.to_lowercase() })
}

impl EventFilter {
    #[must_use]
    pub fn matches(&self, data: &Value) -> bool {
        let actual = resolve_path(data, &self.path);
        match self.operator {
            FilterOperator::Exists => actual.is_some() && !actual.unwrap().is_null(),
            _ => {
                let Some(actual) = actual else { return false };
                let expected = self.value.as_ref();
                match self.operator {
                    FilterOperator::Eq => match (as_comparable_string(actual, self.case_sensitive), expected.and_then(|e| as_comparable_string(e, self.case_sensitive))) {
                        (Some(a), Some(b)) => a == b,
                        _ => Some(actual) == expected,
                    },
                    FilterOperator::Neq => match (as_comparable_string(actual, self.case_sensitive), expected.and_then(|e| as_comparable_string(e, self.case_sensitive))) {
                        (Some(a), Some(b)) => a != b,
                        _ => Some(actual) != expected,
                    },
                    FilterOperator::Gt => actual.as_f64().zip(expected.and_then(Value::as_f64)).is_some_and(|(a, b)| a > b),
                    FilterOperator::Lt => actual.as_f64().zip(expected.and_then(Value::as_f64)).is_some_and(|(a, b)| a < b),
                    FilterOperator::Gte => actual.as_f64().zip(expected.and_then(Value::as_f64)).is_some_and(|(a, b)| a >= b),
                    FilterOperator::Lte => actual.as_f64().zip(expected.and_then(Value::as_f64)).is_some_and(|(a, b)| a <= b),
                    FilterOperator::Contains => match (actual, expected) {
                        (Value::String(a), Some(Value::String(b))) => {
                            if self.case_sensitive { a.contains(b.as_str()) } else { a.to_lowercase().contains(&b.to_lowercase()) }
                        }
                        (Value::Array(a), Some(b)) => a.contains(b),
                        _ => false,
                    },
                    FilterOperator::Regex => {
                        let (Value::String(a), Some(Value::String(pattern))) = (actual, expected) else {
                            return false;
                        };
                        regex::Regex::new(pattern).map(|re| re.is_match(a)).unwrap_or(false)
                    }
                    FilterOperator::Exists => unreachable!(),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub event_name: String,
    pub workflow_id: Uuid,
    pub filters: Vec<EventFilter>,
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    pub id: Uuid,
    pub event_name: String,
    pub data: Value,
    pub source: String,
    pub correlation_id: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// Outcome of one `publish` call: every subscription considered, and
/// whether it matched/fired/errored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReport {
    pub event: EventPayload,
    pub delivered: Vec<Uuid>,
    pub errors: Vec<(Uuid, String)>,
}

pub struct EventBusConfig {
    pub history_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { history_capacity: 10_000 }
    }
}

pub struct EventBus {
    engine: Arc<WorkflowEngine>,
    subscriptions: DashMap<Uuid, Subscription>,
    history: std::sync::Mutex<VecDeque<EventPayload>>,
    config: EventBusConfig,
}

impl EventBus {
    #[must_use]
    pub fn new(engine: Arc<WorkflowEngine>, config: EventBusConfig) -> Self {
        Self { engine, subscriptions: DashMap::new(), history: std::sync::Mutex::new(VecDeque::new()), config }
    }

    #[must_use]
    pub fn subscribe(&self, event_name: &str, workflow_id: Uuid, filters: Vec<EventFilter>, priority: i32) -> Uuid {
        let id = Uuid::new_v4();
        self.subscriptions.insert(
            id,
            Subscription { id, event_name: event_name.to_owned(), workflow_id, filters, priority },
        );
        id
    }

    pub fn unsubscribe(&self, subscription_id: Uuid) -> bool {
        self.subscriptions.remove(&subscription_id).is_some()
    }

    #[must_use]
    pub fn history(&self) -> Vec<EventPayload> {
        self.history.lock().unwrap().iter().cloned().collect()
    }

    /// Enqueues `data` under `event_name`, records it in the bounded
    /// history, then delivers synchronously to every matching subscription
    /// in descending-priority order (spec.md §4.5).
    pub async fn publish(&self, event_name: &str, data: Value, source: &str, correlation_id: Option<String>) -> PublishReport {
        let payload = EventPayload {
            id: Uuid::new_v4(),
            event_name: event_name.to_owned(),
            data,
            source: source.to_owned(),
            correlation_id,
            published_at: Utc::now(),
        };

        {
            let mut history = self.history.lock().unwrap();
            if history.len() >= self.config.history_capacity {
                history.pop_front();
            }
            history.push_back(payload.clone());
        }

        let mut matching: Vec<Subscription> = self
            .subscriptions
            .iter()
            .filter(|e| e.event_name == event_name && e.filters.iter().all(|f| f.matches(&payload.data)))
            .map(|e| e.value().clone())
            .collect();
        matching.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut report = PublishReport { event: payload.clone(), delivered: Vec::new(), errors: Vec::new() };
        for subscription in matching {
            match self.engine.execute(subscription.workflow_id, payload.data.clone(), TriggerType::Event).await {
                Ok(execution) => {
                    info!(subscription_id = %subscription.id, execution_id = %execution.id, "event delivered");
                    report.delivered.push(subscription.id);
                }
                Err(err) => {
                    error!(subscription_id = %subscription.id, error = %err, "event delivery failed");
                    report.errors.push((subscription.id, err.to_string()));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automation_errors::{ErrorHandler, ErrorHandlerConfig};
    use engine::{EngineConfig, NodeDefinition, TriggerSpec, WorkflowDefinition};
    use nodes::mock::MockNode;
    use nodes::{ExecutableNode, NodeRegistry};
    use state::{MemoryPersistence, PersistenceStrategy, StateManager, StateManagerConfig};

    fn test_engine(registry: NodeRegistry) -> Arc<WorkflowEngine> {
        let state_manager = Arc::new(StateManager::new(
            Arc::new(MemoryPersistence::default()),
            PersistenceStrategy::Memory,
            StateManagerConfig::default(),
        ));
        let error_handler = Arc::new(ErrorHandler::new(ErrorHandlerConfig::default()));
        Arc::new(WorkflowEngine::new(registry, state_manager, error_handler, EngineConfig::default()))
    }

    #[test]
    fn eq_filter_matches_dotted_path() {
        let filter = EventFilter { path: "order.status".into(), operator: FilterOperator::Eq, value: Some(serde_json::json!("paid")), case_sensitive: true };
        assert!(filter.matches(&serde_json::json!({"order": {"status": "paid"}})));
        assert!(!filter.matches(&serde_json::json!({"order": {"status": "pending"}})));
    }

    #[test]
    fn case_insensitive_eq() {
        let filter = EventFilter { path: "status".into(), operator: FilterOperator::Eq, value: Some(serde_json::json!("PAID")), case_sensitive: false };
        assert!(filter.matches(&serde_json::json!({"status": "paid"})));
    }

    #[tokio::test]
    async fn publish_delivers_to_matching_subscriptions_in_priority_order() {
        let node = Arc::new(MockNode::returning("step", serde_json::json!({})));
        let mut registry = NodeRegistry::new();
        registry.insert("step".into(), node as Arc<dyn ExecutableNode>);
        let engine = test_engine(registry);

        let def = WorkflowDefinition::new(
            "on-event",
            vec![TriggerSpec::Event { event_name: "order.created".into() }],
            vec![NodeDefinition { id: "step".into(), node_type: "step".into(), name: String::new(), config: serde_json::Value::Null, timeout_secs: None, precondition: None }],
            vec![],
        );
        let workflow_id = def.id;
        engine.register(def).unwrap();

        let bus = EventBus::new(engine, EventBusConfig::default());
        bus.subscribe("order.created", workflow_id, vec![], 0);
        let non_matching = bus.subscribe(
            "order.created",
            workflow_id,
            vec![EventFilter { path: "amount".into(), operator: FilterOperator::Gt, value: Some(serde_json::json!(1000)), case_sensitive: true }],
            10,
        );

        let report = bus.publish("order.created", serde_json::json!({"amount": 5}), "api", None).await;
        assert_eq!(report.delivered.len(), 1);
        assert!(!report.delivered.contains(&non_matching));
        assert_eq!(bus.history().len(), 1);
    }
}
