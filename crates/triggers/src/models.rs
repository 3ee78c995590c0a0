//! Trigger, subscription, and webhook data model (spec.md §4.2–§4.3, §4.5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The six trigger kinds unified by `TriggerService` (spec.md §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerKind {
    Time { schedule: TimeSchedule, timezone: String },
    Event { source: String, event_type: String, filters: Vec<crate::event_bus::EventFilter> },
    Condition { field: String, operator: nodes::condition::Operator, value: Option<Value>, check_interval_secs: u64 },
    Api { endpoint: String, method: String, interval_secs: u64 },
    Webhook { endpoint_id: Uuid },
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimeSchedule {
    Cron { expression: String },
    Interval { seconds: u64 },
    Once { at: DateTime<Utc> },
}

/// Rolling statistics kept per trigger (spec.md §4.2 "Fire semantics").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerStats {
    pub trigger_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_triggered: Option<DateTime<Utc>>,
    pub avg_response_time_ms: f64,
}

impl TriggerStats {
    /// Folds one firing's outcome and latency into the equal-weight rolling
    /// average (spec.md §4.2: "rolling `avg_response_time` (equal-weight)").
    pub fn record(&mut self, succeeded: bool, response_time_ms: f64, now: DateTime<Utc>) {
        let n = self.trigger_count as f64;
        self.avg_response_time_ms = (self.avg_response_time_ms * n + response_time_ms) / (n + 1.0);
        self.trigger_count += 1;
        if succeeded {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.last_triggered = Some(now);
    }

    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.trigger_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.trigger_count as f64
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerDefinition {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub name: String,
    pub kind: TriggerKind,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub stats: TriggerStats,
}

impl TriggerDefinition {
    #[must_use]
    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            TriggerKind::Time { .. } => "time",
            TriggerKind::Event { .. } => "event",
            TriggerKind::Condition { .. } => "condition",
            TriggerKind::Api { .. } => "api",
            TriggerKind::Webhook { .. } => "webhook",
            TriggerKind::Manual => "manual",
        }
    }
}

// ---------------------------------------------------------------------------
// WebhookService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    None,
    Bearer { token: String },
    Basic { username: String, password: String },
    ApiKey { header: String, key: String },
    Signature { secret: String, algorithm: SignatureAlgorithm, header: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    Sha256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { max_requests: 100, window_secs: 60 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    Uppercase,
    Lowercase,
    Trim,
    JsonParse,
    Number,
    Date,
}

impl Transform {
    #[must_use]
    pub fn apply(self, value: &Value) -> Value {
        match self {
            Transform::Uppercase => value.as_str().map(|s| Value::String(s.to_uppercase())).unwrap_or_else(|| value.clone()),
            Transform::Lowercase => value.as_str().map(|s| Value::String(s.to_lowercase())).unwrap_or_else(|| value.clone()),
            Transform::Trim => value.as_str().map(|s| Value::String(s.trim().to_owned())).unwrap_or_else(|| value.clone()),
            Transform::JsonParse => value
                .as_str()
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or_else(|| value.clone()),
            Transform::Number => value
                .as_str()
                .and_then(|s| s.parse::<f64>().ok())
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| value.clone()),
            Transform::Date => value
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| Value::String(d.to_rfc3339()))
                .unwrap_or_else(|| value.clone()),
        }
    }
}

/// Projects one field from `headers.*` / `body.*` / `query.*` of an inbound
/// webhook request into a flat key in the workflow input (spec.md §4.3 step
/// 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataMapping {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub transform: Option<Transform>,
    #[serde(default)]
    pub default_value: Option<Value>,
}

/// A filter condition gating whether a webhook binding fires at all
/// (distinct from `EventFilter`, which gates `EventBus` delivery).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookCondition {
    pub field: String,
    pub operator: nodes::condition::Operator,
    pub value: Option<Value>,
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub id: Uuid,
    pub path: String,
    pub method: String,
    pub active: bool,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub created_at: DateTime<Utc>,
}

/// A trigger bound to a webhook endpoint, carrying the endpoint-specific
/// filter/mapping/response configuration (spec.md §4.3 step 5–6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookBinding {
    pub trigger_id: Uuid,
    pub endpoint_id: Uuid,
    pub conditions: Vec<WebhookCondition>,
    pub data_mapping: Vec<DataMapping>,
    pub response: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub headers: std::collections::BTreeMap<String, String>,
    pub body: Value,
    pub query: std::collections::BTreeMap<String, String>,
    pub received_at: DateTime<Utc>,
}

/// Outcome of dispatching one inbound request across its bound triggers
/// (spec.md §4.3 step 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDispatchSummary {
    pub status_code: u16,
    pub per_trigger: Vec<TriggerDispatchOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerDispatchOutcome {
    pub trigger_id: Uuid,
    pub filtered_out: bool,
    pub succeeded: bool,
    pub error: Option<String>,
}
