//! Trigger-echo node types (spec §4.1.1). These don't *fire* triggers — that
//! is `triggers`' job — they surface trigger metadata into the execution
//! when a workflow graph starts with one of them as its first node.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{ExecutableNode, NodeError, traits::ExecutionContext};

/// `manual-trigger` — echoes the trigger input verbatim.
pub struct ManualTriggerNode;

#[async_trait]
impl ExecutableNode for ManualTriggerNode {
    async fn execute(&self, input: Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
        Ok(json!({
            "triggered": true,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "data": input,
        }))
    }
}

/// `webhook-trigger` — surfaces the configured method/path alongside the
/// received webhook body.
pub struct WebhookTriggerNode {
    pub method: String,
    pub path: String,
}

#[async_trait]
impl ExecutableNode for WebhookTriggerNode {
    async fn execute(&self, input: Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
        Ok(json!({
            "webhook": true,
            "method": self.method,
            "path": self.path,
            "received_data": input,
        }))
    }
}

/// `schedule-trigger` — reports the cron/timezone and the computed next
/// firing time. `next_run` is supplied by the caller (`scheduler::CronSchedule`)
/// since cron math doesn't belong in a leaf node crate.
pub struct ScheduleTriggerNode {
    pub cron: String,
    pub timezone: String,
    pub next_run: chrono::DateTime<chrono::Utc>,
}

#[async_trait]
impl ExecutableNode for ScheduleTriggerNode {
    async fn execute(&self, _input: Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
        Ok(json!({
            "scheduled": true,
            "cron": self.cron,
            "timezone": self.timezone,
            "next_run": self.next_run.to_rfc3339(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_ctx;

    #[tokio::test]
    async fn manual_trigger_echoes_input() {
        let node = ManualTriggerNode;
        let out = node.execute(json!({"k": 1}), &test_ctx()).await.unwrap();
        assert_eq!(out["triggered"], json!(true));
        assert_eq!(out["data"], json!({"k": 1}));
    }

    #[tokio::test]
    async fn webhook_trigger_reports_method_and_path() {
        let node = WebhookTriggerNode { method: "POST".into(), path: "/hooks/x".into() };
        let out = node.execute(json!({"topic": "x"}), &test_ctx()).await.unwrap();
        assert_eq!(out["method"], json!("POST"));
        assert_eq!(out["path"], json!("/hooks/x"));
    }
}
