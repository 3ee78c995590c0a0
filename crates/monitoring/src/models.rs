//! `MonitoringService` data model (spec.md §4.10).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use automation_errors::Severity;

/// Per-workflow rollup, updated on every recorded execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowMetrics {
    pub workflow_id: Uuid,
    pub execution_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    pub avg_duration_ms: f64,
    pub executed_at: Vec<DateTime<Utc>>,
}

impl WorkflowMetrics {
    #[must_use]
    pub fn new(workflow_id: Uuid) -> Self {
        Self {
            workflow_id,
            execution_count: 0,
            success_count: 0,
            failure_count: 0,
            min_duration_ms: f64::MAX,
            max_duration_ms: 0.0,
            avg_duration_ms: 0.0,
            executed_at: Vec::new(),
        }
    }

    pub fn record(&mut self, succeeded: bool, duration_ms: f64, at: DateTime<Utc>) {
        let n = self.execution_count as f64;
        self.avg_duration_ms = (self.avg_duration_ms * n + duration_ms) / (n + 1.0);
        self.min_duration_ms = self.min_duration_ms.min(duration_ms);
        self.max_duration_ms = self.max_duration_ms.max(duration_ms);
        self.execution_count += 1;
        if succeeded {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.executed_at.push(at);
    }

    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.execution_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.execution_count as f64
        }
    }

    /// Executions whose timestamp falls within the last hour.
    #[must_use]
    pub fn executions_per_hour(&self, now: DateTime<Utc>) -> u64 {
        let cutoff = now - chrono::Duration::hours(1);
        self.executed_at.iter().filter(|t| **t >= cutoff).count() as u64
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub network_bytes_per_sec: f64,
    pub process_count: u64,
    pub sampled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub component: String,
    pub active: u64,
    pub queued: u64,
    pub completed: u64,
    pub sampled_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Traces
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub tags: std::collections::BTreeMap<String, String>,
    pub logs: Vec<LogEntry>,
}

impl Span {
    #[must_use]
    pub fn new(name: &str, parent_id: Option<Uuid>) -> Self {
        Self { id: Uuid::new_v4(), parent_id, name: name.to_owned(), started_at: Utc::now(), ended_at: None, tags: std::collections::BTreeMap::new(), logs: Vec::new() }
    }

    pub fn finish(&mut self) {
        self.ended_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub spans: Vec<Span>,
    pub started_at: DateTime<Utc>,
}

impl Trace {
    #[must_use]
    pub fn new(execution_id: Uuid) -> Self {
        Self { id: Uuid::new_v4(), execution_id, spans: Vec::new(), started_at: Utc::now() }
    }
}

// ---------------------------------------------------------------------------
// Alerting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertOperator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
}

impl AlertOperator {
    #[must_use]
    pub fn evaluate(self, value: f64, threshold: f64) -> bool {
        match self {
            AlertOperator::Gt => value > threshold,
            AlertOperator::Gte => value >= threshold,
            AlertOperator::Lt => value < threshold,
            AlertOperator::Lte => value <= threshold,
            AlertOperator::Eq => (value - threshold).abs() < f64::EPSILON,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: Uuid,
    pub name: String,
    pub metric: String,
    pub operator: AlertOperator,
    pub threshold: f64,
    pub time_window: std::time::Duration,
    pub evaluation_interval: std::time::Duration,
    pub severity: Severity,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Active,
    Resolved,
    Silenced,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub state: AlertState,
    pub count: u64,
    pub first_triggered: DateTime<Utc>,
    pub last_triggered: DateTime<Utc>,
    pub silenced_until: Option<DateTime<Utc>>,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannelKind {
    Email,
    Slack,
    Webhook,
    Sms,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: Uuid,
    pub kind: NotificationChannelKind,
    pub target: String,
    pub severity_allow_list: Vec<Severity>,
}

impl NotificationChannel {
    #[must_use]
    pub fn accepts(&self, severity: Severity) -> bool {
        self.severity_allow_list.contains(&severity)
    }
}

/// One dispatched notification, retained for observation in place of an
/// actual outbound call (no network egress is attempted here; a concrete
/// channel integration would live behind a trait seam at the call site).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub channel_id: Uuid,
    pub alert_id: Uuid,
    pub severity: Severity,
    pub message: String,
    pub sent_at: DateTime<Utc>,
    pub payload: Value,
}
