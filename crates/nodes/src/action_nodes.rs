//! Action node types (spec §4.1.1). These are the node kinds the engine
//! dispatches through `ActionExecutor` in a full deployment; here each
//! implements `ExecutableNode` directly so the engine can also run them
//! inline (e.g. from `cli validate`/tests) without a queue in front of them.
//!
//! `email-action`, `database-action`, `social-action`, `file-action`, and
//! `notification-action` hand off to external systems that spec.md §1
//! explicitly places out of scope ("third-party integrations"). Each is
//! implemented against a small provider trait with a deterministic default
//! provider, so the shape of the output and the retry/error contract are
//! real even though no network call happens by default — a real deployment
//! swaps the provider in.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{ExecutableNode, NodeError, traits::ExecutionContext};

fn config_str(config: &Value, key: &str) -> Option<String> {
    config.get(key).and_then(Value::as_str).map(str::to_owned)
}

// ---------------------------------------------------------------------------
// http-action
// ---------------------------------------------------------------------------

/// `http-action` — issues a real HTTP call via `reqwest`. `config` carries
/// `{method, url, headers?, body?, timeout_ms?}`.
pub struct HttpActionNode {
    pub client: reqwest::Client,
}

impl Default for HttpActionNode {
    fn default() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

#[async_trait]
impl ExecutableNode for HttpActionNode {
    async fn execute(&self, input: Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let method = config_str(&input, "method").unwrap_or_else(|| "GET".to_owned());
        let url = config_str(&input, "url")
            .ok_or_else(|| NodeError::Fatal("http-action config missing 'url'".into()))?;
        let timeout_ms = input.get("timeout_ms").and_then(Value::as_u64).unwrap_or(30_000);

        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|e| NodeError::Fatal(format!("invalid HTTP method: {e}")))?;

        let mut builder = self.client.request(method, &url).timeout(Duration::from_millis(timeout_ms));

        if let Some(headers) = input.get("headers").and_then(Value::as_object) {
            for (k, v) in headers {
                if let Some(v) = v.as_str() {
                    builder = builder.header(k, v);
                }
            }
        }
        if let Some(body) = input.get("body") {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                NodeError::Retryable(format!("http-action timed out: {e}"))
            } else {
                NodeError::Retryable(format!("http-action request failed: {e}"))
            }
        })?;

        let status = response.status().as_u16();
        let headers: serde_json::Map<String, Value> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v.to_str().unwrap_or_default())))
            .collect();
        let body_text = response.text().await.unwrap_or_default();
        let body: Value = serde_json::from_str(&body_text).unwrap_or(Value::String(body_text));

        if status >= 500 {
            return Err(NodeError::Retryable(format!("http-action upstream status {status}")));
        }

        Ok(json!({ "status": status, "headers": headers, "body": body }))
    }
}

// ---------------------------------------------------------------------------
// email-action
// ---------------------------------------------------------------------------

/// Provider seam for `email-action`; the default logs and fabricates a
/// deterministic message id.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<String, NodeError>;
}

pub struct LoggingEmailProvider;

#[async_trait]
impl EmailProvider for LoggingEmailProvider {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<String, NodeError> {
        tracing::info!(to, subject, "email-action: sending via logging provider");
        Ok(format!("msg_{}", uuid::Uuid::new_v4()))
    }
}

pub struct EmailActionNode {
    pub provider: Box<dyn EmailProvider>,
}

impl Default for EmailActionNode {
    fn default() -> Self {
        Self { provider: Box::new(LoggingEmailProvider) }
    }
}

#[async_trait]
impl ExecutableNode for EmailActionNode {
    async fn execute(&self, input: Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let to = config_str(&input, "to")
            .ok_or_else(|| NodeError::Fatal("email-action config missing 'to'".into()))?;
        let subject = config_str(&input, "subject").unwrap_or_default();
        let body = config_str(&input, "body").unwrap_or_default();

        let message_id = self.provider.send(&to, &subject, &body).await?;
        Ok(json!({ "message_id": message_id, "delivered_at": chrono::Utc::now().to_rfc3339() }))
    }
}

// ---------------------------------------------------------------------------
// database-action
// ---------------------------------------------------------------------------

/// Provider seam for `database-action`. `operation` is one of
/// `{select, insert, update, delete}`.
#[async_trait]
pub trait DatabaseProvider: Send + Sync {
    async fn run(&self, operation: &str, table: &str, payload: &Value) -> Result<(u64, Option<Value>), NodeError>;
}

pub struct NullDatabaseProvider;

#[async_trait]
impl DatabaseProvider for NullDatabaseProvider {
    async fn run(&self, operation: &str, table: &str, _payload: &Value) -> Result<(u64, Option<Value>), NodeError> {
        tracing::debug!(operation, table, "database-action: no provider configured, returning no-op result");
        match operation {
            "select" => Ok((0, Some(json!([])))),
            _ => Ok((0, None)),
        }
    }
}

pub struct DatabaseActionNode {
    pub provider: Box<dyn DatabaseProvider>,
}

impl Default for DatabaseActionNode {
    fn default() -> Self {
        Self { provider: Box::new(NullDatabaseProvider) }
    }
}

#[async_trait]
impl ExecutableNode for DatabaseActionNode {
    async fn execute(&self, input: Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let operation = config_str(&input, "operation")
            .ok_or_else(|| NodeError::Fatal("database-action config missing 'operation'".into()))?;
        if !matches!(operation.as_str(), "select" | "insert" | "update" | "delete") {
            return Err(NodeError::Fatal(format!("unsupported database operation '{operation}'")));
        }
        let table = config_str(&input, "table")
            .ok_or_else(|| NodeError::Fatal("database-action config missing 'table'".into()))?;

        let (rows_affected, data) = self.provider.run(&operation, &table, &input).await?;
        let mut out = json!({ "rows_affected": rows_affected });
        if let Some(data) = data {
            out["data"] = data;
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// social-action
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SocialProvider: Send + Sync {
    async fn publish(&self, platform: &str, content: &str) -> Result<(String, String), NodeError>;
}

pub struct LoggingSocialProvider;

#[async_trait]
impl SocialProvider for LoggingSocialProvider {
    async fn publish(&self, platform: &str, _content: &str) -> Result<(String, String), NodeError> {
        let post_id = format!("post_{}", uuid::Uuid::new_v4());
        let url = format!("https://{platform}.example/posts/{post_id}");
        Ok((post_id, url))
    }
}

pub struct SocialActionNode {
    pub provider: Box<dyn SocialProvider>,
}

impl Default for SocialActionNode {
    fn default() -> Self {
        Self { provider: Box::new(LoggingSocialProvider) }
    }
}

#[async_trait]
impl ExecutableNode for SocialActionNode {
    async fn execute(&self, input: Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let platform = config_str(&input, "platform")
            .ok_or_else(|| NodeError::Fatal("social-action config missing 'platform'".into()))?;
        let content = config_str(&input, "content").unwrap_or_default();

        let (post_id, url) = self.provider.publish(&platform, &content).await?;
        Ok(json!({ "post_id": post_id, "url": url, "published_at": chrono::Utc::now().to_rfc3339() }))
    }
}

// ---------------------------------------------------------------------------
// javascript-action
// ---------------------------------------------------------------------------

/// `javascript-action` — spec.md allows replacing "evaluate user code via a
/// constructed function" with a safe embedded expression language. This
/// reuses the same leaf-expression resolver as `ConditionEvaluator`
/// (`@fn(args)` / `$name`) rather than executing arbitrary code.
pub struct JavascriptActionNode;

#[async_trait]
impl ExecutableNode for JavascriptActionNode {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let expression = config_str(&input, "expression")
            .ok_or_else(|| NodeError::Fatal("javascript-action config missing 'expression'".into()))?;

        let variables = ctx.variables_snapshot();
        let result = crate::condition::resolve_value(&json!(expression), &variables);

        Ok(json!({ "executed": true, "result": result }))
    }
}

// ---------------------------------------------------------------------------
// file-action
// ---------------------------------------------------------------------------

#[async_trait]
pub trait FileProvider: Send + Sync {
    async fn run(&self, operation: &str, path: &str, payload: Option<&Value>) -> Result<u64, NodeError>;
}

pub struct InMemoryFileProvider {
    pub store: std::sync::Mutex<std::collections::HashMap<String, Vec<u8>>>,
}

impl Default for InMemoryFileProvider {
    fn default() -> Self {
        Self { store: std::sync::Mutex::new(std::collections::HashMap::new()) }
    }
}

#[async_trait]
impl FileProvider for InMemoryFileProvider {
    async fn run(&self, operation: &str, path: &str, payload: Option<&Value>) -> Result<u64, NodeError> {
        let mut store = self.store.lock().unwrap();
        match operation {
            "write" => {
                let bytes = payload.map(|v| v.to_string().into_bytes()).unwrap_or_default();
                let len = bytes.len() as u64;
                store.insert(path.to_owned(), bytes);
                Ok(len)
            }
            "read" => Ok(store.get(path).map(Vec::len).unwrap_or(0) as u64),
            "copy" => {
                let data = store.get(path).cloned().unwrap_or_default();
                let len = data.len() as u64;
                let dest = payload.and_then(Value::as_str).unwrap_or_default().to_owned();
                store.insert(dest, data);
                Ok(len)
            }
            "delete" => Ok(store.remove(path).map(|b| b.len() as u64).unwrap_or(0)),
            other => Err(NodeError::Fatal(format!("unsupported file operation '{other}'"))),
        }
    }
}

pub struct FileActionNode {
    pub provider: Box<dyn FileProvider>,
}

impl Default for FileActionNode {
    fn default() -> Self {
        Self { provider: Box::new(InMemoryFileProvider::default()) }
    }
}

#[async_trait]
impl ExecutableNode for FileActionNode {
    async fn execute(&self, input: Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let operation = config_str(&input, "operation")
            .ok_or_else(|| NodeError::Fatal("file-action config missing 'operation'".into()))?;
        let path = config_str(&input, "path")
            .ok_or_else(|| NodeError::Fatal("file-action config missing 'path'".into()))?;

        let size = self.provider.run(&operation, &path, input.get("data")).await?;
        Ok(json!({ "operation": operation, "path": path, "size": size }))
    }
}

// ---------------------------------------------------------------------------
// notification-action
// ---------------------------------------------------------------------------

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn notify(&self, channel: &str, message: &str) -> Result<(), NodeError>;
}

pub struct LoggingNotificationChannel;

#[async_trait]
impl NotificationChannel for LoggingNotificationChannel {
    async fn notify(&self, channel: &str, message: &str) -> Result<(), NodeError> {
        tracing::info!(channel, message, "notification-action: dispatched");
        Ok(())
    }
}

pub struct NotificationActionNode {
    pub channel: Box<dyn NotificationChannel>,
}

impl Default for NotificationActionNode {
    fn default() -> Self {
        Self { channel: Box::new(LoggingNotificationChannel) }
    }
}

#[async_trait]
impl ExecutableNode for NotificationActionNode {
    async fn execute(&self, input: Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let channel = config_str(&input, "channel").unwrap_or_else(|| "default".to_owned());
        let message = config_str(&input, "message").unwrap_or_default();

        self.channel.notify(&channel, &message).await?;
        Ok(json!({ "sent": true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_ctx;

    #[tokio::test]
    async fn email_action_returns_message_id_and_timestamp() {
        let node = EmailActionNode::default();
        let out = node
            .execute(json!({"to": "a@example.com", "subject": "hi"}), &test_ctx())
            .await
            .unwrap();
        assert!(out["message_id"].as_str().unwrap().starts_with("msg_"));
        assert!(out["delivered_at"].is_string());
    }

    #[tokio::test]
    async fn database_action_rejects_unknown_operation() {
        let node = DatabaseActionNode::default();
        let err = node
            .execute(json!({"operation": "drop", "table": "x"}), &test_ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Fatal(_)));
    }

    #[tokio::test]
    async fn file_action_write_then_read_roundtrips_size() {
        let node = FileActionNode::default();
        let write = node
            .execute(json!({"operation": "write", "path": "/tmp/x", "data": "hello"}), &test_ctx())
            .await
            .unwrap();
        assert_eq!(write["operation"], json!("write"));

        let read = node
            .execute(json!({"operation": "read", "path": "/tmp/x"}), &test_ctx())
            .await
            .unwrap();
        assert_eq!(read["size"], write["size"]);
    }

    #[tokio::test]
    async fn javascript_action_resolves_variable_reference() {
        let node = JavascriptActionNode;
        let ctx = test_ctx();
        ctx.set_variable("x", json!(42));
        let out = node.execute(json!({"expression": "$x"}), &ctx).await.unwrap();
        assert_eq!(out["result"], json!(42));
    }
}
