//! `ActionExecutor` — runs side-effect actions independently of the
//! workflow engine (spec.md §4.7): priority queue, bounded worker pool,
//! per-action rate limiting, retry via the shared [`RetryPolicy`], and
//! cooperative cancellation.

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use automation_errors::RetryPolicy;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::QueueError;
use crate::models::{ActionDefinition, ActionStatus, QueuedAction, RetryAttemptRecord};
use crate::models::QueueEntry;
use crate::validation;

/// An action's side-effect implementation, keyed by `ActionDefinition::handler_key`.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn run(&self, input: Value) -> Result<Value, String>;
}

pub struct ExecutorConfig {
    pub max_concurrent_executions: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_concurrent_executions: 20 }
    }
}

struct RateWindow {
    window_start: std::time::Instant,
    count: u32,
}

pub struct ActionExecutor {
    definitions: DashMap<Uuid, ActionDefinition>,
    handlers: DashMap<String, Arc<dyn ActionHandler>>,
    actions: DashMap<Uuid, QueuedAction>,
    cancel_flags: DashMap<Uuid, Arc<AtomicBool>>,
    queue: Mutex<BinaryHeap<QueueEntry>>,
    rate_windows: DashMap<Uuid, RateWindow>,
    semaphore: Arc<Semaphore>,
    notify: tokio::sync::Notify,
}

impl ActionExecutor {
    #[must_use]
    pub fn new(config: ExecutorConfig) -> Arc<Self> {
        Arc::new(Self {
            definitions: DashMap::new(),
            handlers: DashMap::new(),
            actions: DashMap::new(),
            cancel_flags: DashMap::new(),
            queue: Mutex::new(BinaryHeap::new()),
            rate_windows: DashMap::new(),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_executions)),
            notify: tokio::sync::Notify::new(),
        })
    }

    pub fn register_definition(&self, definition: ActionDefinition) {
        self.definitions.insert(definition.id, definition);
    }

    pub fn register_handler(&self, handler_key: &str, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(handler_key.to_owned(), handler);
    }

    /// Validates `input` against the definition's schema, then enqueues it.
    pub fn submit(&self, definition_id: Uuid, input: Value, priority: i32) -> Result<Uuid, QueueError> {
        let definition = self.definitions.get(&definition_id).ok_or(QueueError::DefinitionNotFound(definition_id))?;
        validation::validate(&definition, &input).map_err(QueueError::Validation)?;
        drop(definition);

        let action = QueuedAction::new(definition_id, input, priority);
        let id = action.id;
        self.enqueue(&action);
        self.actions.insert(id, action);
        self.notify.notify_one();
        Ok(id)
    }

    fn enqueue(&self, action: &QueuedAction) {
        self.queue.lock().unwrap().push(QueueEntry { action_id: action.id, priority: action.priority, submitted_at: action.submitted_at });
    }

    #[must_use]
    pub fn get(&self, action_id: Uuid) -> Option<QueuedAction> {
        self.actions.get(&action_id).map(|a| a.clone())
    }

    #[must_use]
    pub fn list(&self) -> Vec<QueuedAction> {
        self.actions.iter().map(|e| e.value().clone()).collect()
    }

    /// Valid in `pending` (dequeues; the entry is skipped when later popped)
    /// or `running` (flips the cooperative cancellation flag the handler
    /// task observes) (spec.md §4.7).
    pub fn cancel(&self, action_id: Uuid) -> Result<(), QueueError> {
        let mut action = self.actions.get_mut(&action_id).ok_or(QueueError::ActionNotFound(action_id))?;
        match action.status {
            ActionStatus::Pending => {
                action.status = ActionStatus::Cancelled;
                action.finished_at = Some(Utc::now());
                Ok(())
            }
            ActionStatus::Running => {
                if let Some(flag) = self.cancel_flags.get(&action_id) {
                    flag.store(true, Ordering::SeqCst);
                }
                Ok(())
            }
            other => Err(QueueError::InvalidCancellation { action_id, status: format!("{other:?}") }),
        }
    }

    fn check_rate_limit(&self, definition: &ActionDefinition) -> bool {
        let Some(limit) = &definition.rate_limit else { return true };
        let now = std::time::Instant::now();
        let mut window = self.rate_windows.entry(definition.id).or_insert_with(|| RateWindow { window_start: now, count: 0 });
        if now.duration_since(window.window_start).as_secs() >= limit.window_secs {
            window.window_start = now;
            window.count = 0;
        }
        if window.count >= limit.max_requests {
            return false;
        }
        window.count += 1;
        true
    }

    /// Pops the next runnable entry, skipping cancelled/missing actions.
    fn pop_runnable(&self) -> Option<Uuid> {
        loop {
            let entry = self.queue.lock().unwrap().pop()?;
            match self.actions.get(&entry.action_id).map(|a| a.status) {
                Some(ActionStatus::Pending) => return Some(entry.action_id),
                _ => continue,
            }
        }
    }

    /// Runs one dispatch: acquires a worker permit, pops the highest
    /// priority runnable action, and drives it to completion (including
    /// retries). Returns `false` when the queue was empty so the caller can
    /// back off.
    async fn dispatch_one(self: &Arc<Self>) -> bool {
        let Some(action_id) = self.pop_runnable() else { return false };

        let Some(definition) = self.actions.get(&action_id).and_then(|a| self.definitions.get(&a.definition_id).map(|d| d.clone())) else {
            return true;
        };

        if !self.check_rate_limit(&definition) {
            if let Some(mut action) = self.actions.get_mut(&action_id) {
                action.status = ActionStatus::Failed;
                action.error = Some("rate limit exceeded".into());
                action.finished_at = Some(Utc::now());
            }
            warn!(%action_id, "action rejected: rate limit exceeded");
            return true;
        }

        let Some(handler) = self.handlers.get(&definition.handler_key).map(|h| h.clone()) else {
            if let Some(mut action) = self.actions.get_mut(&action_id) {
                action.status = ActionStatus::Failed;
                action.error = Some(format!("no handler registered for '{}'", definition.handler_key));
                action.finished_at = Some(Utc::now());
            }
            return true;
        };

        let permit = self.semaphore.clone().acquire_owned().await.expect("semaphore not closed");
        let executor = self.clone();
        tokio::spawn(async move {
            executor.run_with_retries(action_id, definition, handler).await;
            drop(permit);
        });
        true
    }

    async fn run_with_retries(self: Arc<Self>, action_id: Uuid, definition: ActionDefinition, handler: Arc<dyn ActionHandler>) {
        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.cancel_flags.insert(action_id, cancel_flag.clone());

        let input = match self.actions.get(&action_id) {
            Some(a) => a.input.clone(),
            None => return,
        };

        if let Some(mut action) = self.actions.get_mut(&action_id) {
            action.status = ActionStatus::Running;
            action.started_at = Some(Utc::now());
        }

        let outcome = tokio::time::timeout(definition.timeout, handler.run(input.clone())).await;

        if cancel_flag.load(Ordering::SeqCst) {
            if let Some(mut action) = self.actions.get_mut(&action_id) {
                action.status = ActionStatus::Cancelled;
                action.finished_at = Some(Utc::now());
            }
            self.cancel_flags.remove(&action_id);
            return;
        }

        match outcome {
            Ok(Ok(output)) => {
                info!(%action_id, "action succeeded");
                if let Some(mut action) = self.actions.get_mut(&action_id) {
                    action.status = ActionStatus::Succeeded;
                    action.output = Some(output);
                    action.finished_at = Some(Utc::now());
                }
            }
            Ok(Err(message)) => self.handle_failure(action_id, &definition, message).await,
            Err(_elapsed) => self.handle_failure(action_id, &definition, "action timed out".into()).await,
        }

        self.cancel_flags.remove(&action_id);
    }

    async fn handle_failure(self: &Arc<Self>, action_id: Uuid, definition: &ActionDefinition, message: String) {
        let attempts = self.actions.get(&action_id).map(|a| a.attempts).unwrap_or(0);
        let policy: &RetryPolicy = &definition.retry_policy;

        if let Some(mut action) = self.actions.get_mut(&action_id) {
            action.attempts += 1;
            action.retry_history.push(RetryAttemptRecord { attempt: action.attempts, error: message.clone(), at: Utc::now() });
        }

        if policy.allows_retry(attempts) {
            let delay = policy.delay_for(attempts + 1);
            warn!(%action_id, attempt = attempts + 1, delay_ms = delay.as_millis() as u64, "action failed, retrying");
            if let Some(mut action) = self.actions.get_mut(&action_id) {
                action.status = ActionStatus::Pending;
                action.error = Some(message);
            }
            let executor = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Some(action) = executor.actions.get(&action_id).map(|a| a.clone()) {
                    if action.status == ActionStatus::Pending {
                        executor.enqueue(&action);
                        executor.notify.notify_one();
                    }
                }
            });
        } else {
            error!(%action_id, "action failed permanently");
            if let Some(mut action) = self.actions.get_mut(&action_id) {
                action.status = ActionStatus::Failed;
                action.error = Some(message);
                action.finished_at = Some(Utc::now());
            }
        }
    }

    /// Spawns the worker loop: wakes on submission/requeue and whenever a
    /// permit is likely free, draining runnable entries until the queue is
    /// empty.
    #[must_use]
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                while self.dispatch_one().await {}
                self.notify.notified().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldConstraint, InputFieldSpec};
    use std::sync::atomic::AtomicU32;

    fn definition(id: Uuid, handler_key: &str, retry_policy: RetryPolicy) -> ActionDefinition {
        ActionDefinition {
            id,
            name: "test".into(),
            handler_key: handler_key.into(),
            timeout: std::time::Duration::from_secs(1),
            rate_limit: None,
            retry_policy,
            input_schema: vec![InputFieldSpec { name: "x".into(), field_type: crate::models::FieldType::Number, required: true, constraint: FieldConstraint::default() }],
        }
    }

    struct AlwaysOk;
    #[async_trait]
    impl ActionHandler for AlwaysOk {
        async fn run(&self, input: Value) -> Result<Value, String> {
            Ok(input)
        }
    }

    struct AlwaysFail;
    #[async_trait]
    impl ActionHandler for AlwaysFail {
        async fn run(&self, _input: Value) -> Result<Value, String> {
            Err("boom".into())
        }
    }

    struct FailNTimes(AtomicU32, u32);
    #[async_trait]
    impl ActionHandler for FailNTimes {
        async fn run(&self, input: Value) -> Result<Value, String> {
            let attempt = self.0.fetch_add(1, Ordering::SeqCst);
            if attempt < self.1 {
                Err("not yet".into())
            } else {
                Ok(input)
            }
        }
    }

    async fn wait_for_terminal(executor: &Arc<ActionExecutor>, action_id: Uuid) -> QueuedAction {
        for _ in 0..200 {
            if let Some(action) = executor.get(action_id) {
                if matches!(action.status, ActionStatus::Succeeded | ActionStatus::Failed | ActionStatus::Cancelled) {
                    return action;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("action {action_id} never reached a terminal state");
    }

    #[tokio::test]
    async fn submission_rejects_invalid_input() {
        let executor = ActionExecutor::new(ExecutorConfig::default());
        let def_id = Uuid::new_v4();
        executor.register_definition(definition(def_id, "noop", RetryPolicy { enabled: false, ..RetryPolicy::default() }));
        let err = executor.submit(def_id, serde_json::json!({}), 0).unwrap_err();
        assert!(matches!(err, QueueError::Validation(_)));
    }

    #[tokio::test]
    async fn successful_action_completes() {
        let executor = ActionExecutor::new(ExecutorConfig::default());
        let def_id = Uuid::new_v4();
        executor.register_definition(definition(def_id, "ok", RetryPolicy { enabled: false, ..RetryPolicy::default() }));
        executor.register_handler("ok", Arc::new(AlwaysOk));
        let action_id = executor.submit(def_id, serde_json::json!({"x": 1}), 0).unwrap();

        executor.clone().spawn();
        let action = wait_for_terminal(&executor, action_id).await;
        assert_eq!(action.status, ActionStatus::Succeeded);
    }

    #[tokio::test]
    async fn exhausted_retries_end_in_failure() {
        let executor = ActionExecutor::new(ExecutorConfig::default());
        let def_id = Uuid::new_v4();
        let policy = RetryPolicy { enabled: true, max_retries: 2, backoff: automation_errors::BackoffStrategy::Fixed, initial_delay: std::time::Duration::from_millis(5), max_delay: std::time::Duration::from_millis(5), multiplier: 1.0, jitter: false };
        executor.register_definition(definition(def_id, "fail", policy));
        executor.register_handler("fail", Arc::new(AlwaysFail));
        let action_id = executor.submit(def_id, serde_json::json!({"x": 1}), 0).unwrap();

        executor.clone().spawn();
        let action = wait_for_terminal(&executor, action_id).await;
        assert_eq!(action.status, ActionStatus::Failed);
        assert_eq!(action.attempts, 3);
    }

    #[tokio::test]
    async fn retry_eventually_succeeds() {
        let executor = ActionExecutor::new(ExecutorConfig::default());
        let def_id = Uuid::new_v4();
        let policy = RetryPolicy { enabled: true, max_retries: 5, backoff: automation_errors::BackoffStrategy::Fixed, initial_delay: std::time::Duration::from_millis(5), max_delay: std::time::Duration::from_millis(5), multiplier: 1.0, jitter: false };
        executor.register_definition(definition(def_id, "flaky", policy));
        executor.register_handler("flaky", Arc::new(FailNTimes(AtomicU32::new(0), 2)));
        let action_id = executor.submit(def_id, serde_json::json!({"x": 1}), 0).unwrap();

        executor.clone().spawn();
        let action = wait_for_terminal(&executor, action_id).await;
        assert_eq!(action.status, ActionStatus::Succeeded);
    }

    #[tokio::test]
    async fn pending_cancel_prevents_dispatch() {
        let executor = ActionExecutor::new(ExecutorConfig::default());
        let def_id = Uuid::new_v4();
        executor.register_definition(definition(def_id, "ok", RetryPolicy { enabled: false, ..RetryPolicy::default() }));
        executor.register_handler("ok", Arc::new(AlwaysOk));
        let action_id = executor.submit(def_id, serde_json::json!({"x": 1}), 0).unwrap();

        executor.cancel(action_id).unwrap();
        assert_eq!(executor.get(action_id).unwrap().status, ActionStatus::Cancelled);
    }

    #[tokio::test]
    async fn priority_queue_breaks_ties_fifo() {
        let executor = ActionExecutor::new(ExecutorConfig::default());
        let def_id = Uuid::new_v4();
        executor.register_definition(definition(def_id, "ok", RetryPolicy { enabled: false, ..RetryPolicy::default() }));

        let first = executor.submit(def_id, serde_json::json!({"x": 1}), 5).unwrap();
        let second = executor.submit(def_id, serde_json::json!({"x": 2}), 5).unwrap();
        let urgent = executor.submit(def_id, serde_json::json!({"x": 3}), 10).unwrap();

        assert_eq!(executor.pop_runnable(), Some(urgent));
        assert_eq!(executor.pop_runnable(), Some(first));
        assert_eq!(executor.pop_runnable(), Some(second));
    }
}
