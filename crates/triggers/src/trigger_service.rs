//! Unifies every trigger kind behind one CRUD + observation surface
//! (spec.md §4.2). `time` triggers delegate to `scheduler::TaskScheduler`;
//! `event` triggers register an `EventBus` subscription; `webhook` triggers
//! are registered here but fire through `WebhookService`; `condition` and
//! `api` triggers run their own sampling loop; `manual` fires only via
//! `fire_manual`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use engine::{TriggerType, WorkflowEngine};
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::TriggerError;
use crate::event_bus::EventBus;
use crate::models::{TriggerDefinition, TriggerKind, TriggerStats, TimeSchedule};
use crate::webhook_service::WebhookService;
use scheduler::TaskScheduler;

/// External sampling source for `condition` triggers — the field a
/// condition polls is owned by application state the `triggers` crate has
/// no visibility into, so callers inject how to read it.
#[async_trait]
pub trait ConditionSampler: Send + Sync {
    async fn sample(&self, field: &str) -> Option<Value>;
}

pub struct TriggerService {
    engine: Arc<WorkflowEngine>,
    scheduler: Arc<TaskScheduler>,
    event_bus: Arc<EventBus>,
    webhook_service: Arc<WebhookService>,
    http_client: reqwest::Client,
    triggers: DashMap<Uuid, TriggerDefinition>,
    scheduled_task_ids: DashMap<Uuid, Uuid>,
    subscription_ids: DashMap<Uuid, Uuid>,
}

impl TriggerService {
    #[must_use]
    pub fn new(
        engine: Arc<WorkflowEngine>,
        scheduler: Arc<TaskScheduler>,
        event_bus: Arc<EventBus>,
        webhook_service: Arc<WebhookService>,
    ) -> Self {
        Self {
            engine,
            scheduler,
            event_bus,
            webhook_service,
            http_client: reqwest::Client::new(),
            triggers: DashMap::new(),
            scheduled_task_ids: DashMap::new(),
            subscription_ids: DashMap::new(),
        }
    }

    /// Registers a trigger and wires it into the owning subsystem for its
    /// kind.
    pub fn create(&self, workflow_id: Uuid, name: &str, kind: TriggerKind) -> Result<Uuid, TriggerError> {
        let id = Uuid::new_v4();

        match &kind {
            TriggerKind::Time { schedule: TimeSchedule::Cron { expression }, timezone } => {
                let task_id = self.scheduler.schedule_workflow(workflow_id, expression, timezone, None)?;
                self.scheduled_task_ids.insert(id, task_id);
            }
            TriggerKind::Time { schedule: TimeSchedule::Interval { .. } | TimeSchedule::Once { .. }, .. } => {
                // Interval/once timers are driven by `spawn_pollers`, keyed by trigger id directly.
            }
            TriggerKind::Event { event_type, filters, .. } => {
                let sub_id = self.event_bus.subscribe(event_type, workflow_id, filters.clone(), 0);
                self.subscription_ids.insert(id, sub_id);
            }
            TriggerKind::Webhook { endpoint_id } => {
                self.webhook_service.bind_trigger(
                    *endpoint_id,
                    crate::models::WebhookBinding { trigger_id: id, endpoint_id: *endpoint_id, conditions: vec![], data_mapping: vec![], response: None },
                )?;
            }
            TriggerKind::Condition { .. } | TriggerKind::Api { .. } | TriggerKind::Manual => {}
        }

        let definition = TriggerDefinition {
            id,
            workflow_id,
            name: name.to_owned(),
            kind,
            active: true,
            created_at: Utc::now(),
            stats: TriggerStats::default(),
        };
        self.triggers.insert(id, definition);
        Ok(id)
    }

    pub fn update(&self, trigger_id: Uuid, kind: TriggerKind) -> Result<(), TriggerError> {
        let mut trigger = self.triggers.get_mut(&trigger_id).ok_or(TriggerError::NotFound(trigger_id))?;
        trigger.kind = kind;
        Ok(())
    }

    pub fn delete(&self, trigger_id: Uuid) -> Result<(), TriggerError> {
        self.triggers.remove(&trigger_id).ok_or(TriggerError::NotFound(trigger_id))?;
        if let Some((_, task_id)) = self.scheduled_task_ids.remove(&trigger_id) {
            let _ = self.scheduler.remove_task(task_id);
        }
        if let Some((_, sub_id)) = self.subscription_ids.remove(&trigger_id) {
            self.event_bus.unsubscribe(sub_id);
        }
        Ok(())
    }

    pub fn activate(&self, trigger_id: Uuid) -> Result<(), TriggerError> {
        let mut trigger = self.triggers.get_mut(&trigger_id).ok_or(TriggerError::NotFound(trigger_id))?;
        trigger.active = true;
        if let Some(task_id) = self.scheduled_task_ids.get(&trigger_id) {
            let _ = self.scheduler.activate_task(*task_id);
        }
        Ok(())
    }

    pub fn deactivate(&self, trigger_id: Uuid) -> Result<(), TriggerError> {
        let mut trigger = self.triggers.get_mut(&trigger_id).ok_or(TriggerError::NotFound(trigger_id))?;
        trigger.active = false;
        if let Some(task_id) = self.scheduled_task_ids.get(&trigger_id) {
            let _ = self.scheduler.deactivate_task(*task_id);
        }
        Ok(())
    }

    /// Fires a trigger on demand, bypassing its normal activation mechanism.
    /// Records stats identically to an organically-fired trigger (spec.md
    /// §4.2 "Fire semantics").
    pub async fn fire_manual(&self, trigger_id: Uuid, input: Value) -> Result<engine::WorkflowExecution, TriggerError> {
        let workflow_id = self.triggers.get(&trigger_id).ok_or(TriggerError::NotFound(trigger_id))?.workflow_id;

        let started = std::time::Instant::now();
        let result = self.engine.execute(workflow_id, input, TriggerType::Manual).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        if let Some(mut trigger) = self.triggers.get_mut(&trigger_id) {
            trigger.stats.record(result.is_ok(), elapsed_ms, Utc::now());
        }

        match result {
            Ok(execution) => {
                info!(%trigger_id, execution_id = %execution.id, "manual trigger fired");
                Ok(execution)
            }
            Err(err) => {
                error!(%trigger_id, error = %err, "manual trigger failed");
                Err(TriggerError::Engine(err))
            }
        }
    }

    #[must_use]
    pub fn get(&self, trigger_id: Uuid) -> Option<TriggerDefinition> {
        self.triggers.get(&trigger_id).map(|t| t.clone())
    }

    #[must_use]
    pub fn list(&self) -> Vec<TriggerDefinition> {
        self.triggers.iter().map(|e| e.value().clone()).collect()
    }

    #[must_use]
    pub fn by_workflow(&self, workflow_id: Uuid) -> Vec<TriggerDefinition> {
        self.triggers.iter().filter(|e| e.workflow_id == workflow_id).map(|e| e.value().clone()).collect()
    }

    #[must_use]
    pub fn by_type(&self, kind_label: &str) -> Vec<TriggerDefinition> {
        self.triggers.iter().filter(|e| e.kind_label() == kind_label).map(|e| e.value().clone()).collect()
    }

    #[must_use]
    pub fn stats(&self, trigger_id: Uuid) -> Option<TriggerStats> {
        self.triggers.get(&trigger_id).map(|t| t.stats.clone())
    }

    /// Samples every active `condition` trigger once via `sampler`, firing
    /// those whose field evaluates truthy against the configured operator.
    /// Intended to be called on `check_interval_secs`-spaced ticks by the
    /// caller's own scheduling loop.
    pub async fn poll_condition_triggers(&self, sampler: &dyn ConditionSampler) {
        let candidates: Vec<TriggerDefinition> = self
            .triggers
            .iter()
            .filter(|e| e.active)
            .filter(|e| matches!(e.kind, TriggerKind::Condition { .. }))
            .map(|e| e.value().clone())
            .collect();

        for trigger in candidates {
            let TriggerKind::Condition { field, operator, value, .. } = &trigger.kind else { continue };
            let actual = sampler.sample(field).await;
            let matched = nodes::condition::eval_operator(*operator, actual.as_ref(), value.as_ref()).unwrap_or(false);
            if matched {
                let input = serde_json::json!({ "field": field, "value": actual });
                let _ = self.fire_manual(trigger.id, input).await;
            }
        }
    }

    /// Polls every active `api` trigger whose `interval_secs` has elapsed,
    /// feeding the whole HTTP response as workflow input. Tracks per-trigger
    /// last-poll times internally via `last_polled`.
    pub async fn poll_api_triggers(&self, last_polled: &DashMap<Uuid, chrono::DateTime<Utc>>) {
        let candidates: Vec<TriggerDefinition> = self
            .triggers
            .iter()
            .filter(|e| e.active)
            .filter(|e| matches!(e.kind, TriggerKind::Api { .. }))
            .map(|e| e.value().clone())
            .collect();

        let now = Utc::now();
        for trigger in candidates {
            let TriggerKind::Api { endpoint, interval_secs, .. } = &trigger.kind else { continue };
            let due = last_polled
                .get(&trigger.id)
                .map(|t| (now - *t).num_seconds() as u64 >= *interval_secs)
                .unwrap_or(true);
            if !due {
                continue;
            }
            last_polled.insert(trigger.id, now);

            match self.http_client.get(endpoint).send().await {
                Ok(response) => {
                    let body: Value = response.json().await.unwrap_or(Value::Null);
                    let _ = self.fire_manual(trigger.id, body).await;
                }
                Err(err) => {
                    error!(trigger_id = %trigger.id, error = %err, "api trigger poll failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automation_errors::{ErrorHandler, ErrorHandlerConfig};
    use engine::{EngineConfig, NodeDefinition, TriggerSpec, WorkflowDefinition};
    use nodes::mock::MockNode;
    use nodes::{ExecutableNode, NodeRegistry};
    use scheduler::TaskSchedulerConfig;
    use state::{MemoryPersistence, PersistenceStrategy, StateManager, StateManagerConfig};

    fn harness() -> (Arc<WorkflowEngine>, Uuid) {
        let node = Arc::new(MockNode::returning("step", serde_json::json!({})));
        let mut registry: NodeRegistry = NodeRegistry::new();
        registry.insert("step".into(), node as Arc<dyn ExecutableNode>);

        let state_manager = Arc::new(StateManager::new(
            Arc::new(MemoryPersistence::default()),
            PersistenceStrategy::Memory,
            StateManagerConfig::default(),
        ));
        let error_handler = Arc::new(ErrorHandler::new(ErrorHandlerConfig::default()));
        let engine = Arc::new(WorkflowEngine::new(registry, state_manager, error_handler, EngineConfig::default()));

        let def = WorkflowDefinition::new(
            "triggered",
            vec![TriggerSpec::Manual],
            vec![NodeDefinition { id: "step".into(), node_type: "step".into(), name: String::new(), config: serde_json::Value::Null, timeout_secs: None, precondition: None }],
            vec![],
        );
        let workflow_id = def.id;
        engine.register(def).unwrap();
        (engine, workflow_id)
    }

    fn service(engine: Arc<WorkflowEngine>) -> TriggerService {
        let scheduler = Arc::new(TaskScheduler::new(engine.clone(), TaskSchedulerConfig::default()));
        let event_bus = Arc::new(EventBus::new(engine.clone(), crate::event_bus::EventBusConfig::default()));
        let webhook_service = Arc::new(WebhookService::new(engine.clone(), crate::webhook_service::WebhookServiceConfig::default()));
        TriggerService::new(engine, scheduler, event_bus, webhook_service)
    }

    #[tokio::test]
    async fn manual_trigger_fires_and_records_stats() {
        let (engine, workflow_id) = harness();
        let svc = service(engine);
        let trigger_id = svc.create(workflow_id, "run-now", TriggerKind::Manual).unwrap();

        let execution = svc.fire_manual(trigger_id, serde_json::json!({})).await.unwrap();
        assert_eq!(execution.status, engine::ExecutionStatus::Completed);

        let stats = svc.stats(trigger_id).unwrap();
        assert_eq!(stats.trigger_count, 1);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.success_rate(), 1.0);
    }

    #[tokio::test]
    async fn by_workflow_and_by_type_filter_correctly() {
        let (engine, workflow_id) = harness();
        let svc = service(engine);
        svc.create(workflow_id, "a", TriggerKind::Manual).unwrap();
        svc.create(workflow_id, "b", TriggerKind::Time { schedule: TimeSchedule::Cron { expression: "* * * * *".into() }, timezone: "UTC".into() }).unwrap();

        assert_eq!(svc.by_workflow(workflow_id).len(), 2);
        assert_eq!(svc.by_type("manual").len(), 1);
        assert_eq!(svc.by_type("time").len(), 1);
    }

    #[tokio::test]
    async fn deactivate_then_delete_round_trips_cleanly() {
        let (engine, workflow_id) = harness();
        let svc = service(engine);
        let trigger_id = svc.create(workflow_id, "a", TriggerKind::Manual).unwrap();
        svc.deactivate(trigger_id).unwrap();
        assert!(!svc.get(trigger_id).unwrap().active);
        svc.delete(trigger_id).unwrap();
        assert!(svc.get(trigger_id).is_none());
    }
}
