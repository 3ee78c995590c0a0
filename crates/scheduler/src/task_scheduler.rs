//! `TaskScheduler` — master tick loop firing `ScheduledTask`s into the
//! `WorkflowEngine` and running free-standing `CronJob` callbacks
//! (spec.md §4.4).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use engine::{TriggerType, WorkflowEngine};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cron::CronSchedule;
use crate::error::SchedulerError;
use crate::models::{CronJob, ScheduledTask, TickReport};

/// A free-standing callback run by the master tick, independent of the
/// workflow engine (e.g. housekeeping jobs).
#[async_trait]
pub trait CronCallback: Send + Sync {
    async fn run(&self) -> Result<(), String>;
}

/// Default tick interval (spec.md §4.4: "a 60-second master tick").
pub const MASTER_TICK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

pub struct TaskSchedulerConfig {
    pub tick_interval: std::time::Duration,
}

impl Default for TaskSchedulerConfig {
    fn default() -> Self {
        Self { tick_interval: MASTER_TICK_INTERVAL }
    }
}

pub struct TaskScheduler {
    engine: Arc<WorkflowEngine>,
    tasks: DashMap<Uuid, ScheduledTask>,
    schedules: DashMap<Uuid, CronSchedule>,
    jobs: DashMap<Uuid, CronJob>,
    job_schedules: DashMap<Uuid, CronSchedule>,
    job_callbacks: DashMap<Uuid, Arc<dyn CronCallback>>,
    config: TaskSchedulerConfig,
}

impl TaskScheduler {
    #[must_use]
    pub fn new(engine: Arc<WorkflowEngine>, config: TaskSchedulerConfig) -> Self {
        Self {
            engine,
            tasks: DashMap::new(),
            schedules: DashMap::new(),
            jobs: DashMap::new(),
            job_schedules: DashMap::new(),
            job_callbacks: DashMap::new(),
            config,
        }
    }

    /// Registers a recurring workflow invocation, returning its id.
    pub fn schedule_workflow(
        &self,
        workflow_id: Uuid,
        cron_expression: &str,
        timezone: &str,
        max_executions: Option<u64>,
    ) -> Result<Uuid, SchedulerError> {
        let schedule = CronSchedule::parse(cron_expression)?;
        let next_execution = schedule.next_after(Utc::now()).ok_or_else(|| SchedulerError::InvalidCronExpression {
            expression: cron_expression.to_owned(),
            reason: "no future firing time within the lookahead window".into(),
        })?;

        let task = ScheduledTask {
            id: Uuid::new_v4(),
            workflow_id,
            cron_expression: cron_expression.to_owned(),
            timezone: timezone.to_owned(),
            next_execution,
            last_execution: None,
            execution_count: 0,
            max_executions,
            active: true,
            created_at: Utc::now(),
        };
        let id = task.id;
        self.schedules.insert(id, schedule);
        self.tasks.insert(id, task);
        Ok(id)
    }

    pub fn deactivate_task(&self, task_id: Uuid) -> Result<(), SchedulerError> {
        let mut task = self.tasks.get_mut(&task_id).ok_or(SchedulerError::TaskNotFound(task_id))?;
        task.active = false;
        Ok(())
    }

    pub fn activate_task(&self, task_id: Uuid) -> Result<(), SchedulerError> {
        let mut task = self.tasks.get_mut(&task_id).ok_or(SchedulerError::TaskNotFound(task_id))?;
        task.active = true;
        Ok(())
    }

    pub fn remove_task(&self, task_id: Uuid) -> Result<(), SchedulerError> {
        self.tasks.remove(&task_id).ok_or(SchedulerError::TaskNotFound(task_id))?;
        self.schedules.remove(&task_id);
        Ok(())
    }

    #[must_use]
    pub fn task(&self, task_id: Uuid) -> Option<ScheduledTask> {
        self.tasks.get(&task_id).map(|t| t.clone())
    }

    #[must_use]
    pub fn list_tasks(&self) -> Vec<ScheduledTask> {
        self.tasks.iter().map(|e| e.value().clone()).collect()
    }

    /// Registers a free-standing callback fired on its own cron schedule.
    pub fn register_job(
        &self,
        name: &str,
        cron_expression: &str,
        callback: Arc<dyn CronCallback>,
    ) -> Result<Uuid, SchedulerError> {
        let schedule = CronSchedule::parse(cron_expression)?;
        let next_execution = schedule.next_after(Utc::now()).ok_or_else(|| SchedulerError::InvalidCronExpression {
            expression: cron_expression.to_owned(),
            reason: "no future firing time within the lookahead window".into(),
        })?;
        let job = CronJob {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            cron_expression: cron_expression.to_owned(),
            next_execution,
            last_execution: None,
            run_count: 0,
            active: true,
        };
        let id = job.id;
        self.job_schedules.insert(id, schedule);
        self.job_callbacks.insert(id, callback);
        self.jobs.insert(id, job);
        Ok(id)
    }

    pub fn remove_job(&self, job_id: Uuid) -> Result<(), SchedulerError> {
        self.jobs.remove(&job_id).ok_or(SchedulerError::JobNotFound(job_id))?;
        self.job_schedules.remove(&job_id);
        self.job_callbacks.remove(&job_id);
        Ok(())
    }

    #[must_use]
    pub fn list_jobs(&self) -> Vec<CronJob> {
        self.jobs.iter().map(|e| e.value().clone()).collect()
    }

    /// Runs one master-tick pass: fires every due task and job whose
    /// `next_execution` has arrived, then advances each to its next firing
    /// time. Tasks that exhaust `max_executions` are deactivated rather than
    /// removed, so their history stays visible via `list_tasks`.
    pub async fn tick(&self) -> TickReport {
        let now = Utc::now();
        let mut report = TickReport::default();

        let due_tasks: Vec<Uuid> = self
            .tasks
            .iter()
            .filter(|e| e.active && e.next_execution <= now)
            .map(|e| *e.key())
            .collect();

        for task_id in due_tasks {
            let (workflow_id, schedule) = {
                let task = match self.tasks.get(&task_id) {
                    Some(t) => t,
                    None => continue,
                };
                let schedule = match self.schedules.get(&task_id) {
                    Some(s) => s.clone(),
                    None => continue,
                };
                (task.workflow_id, schedule)
            };

            match self.engine.execute(workflow_id, Value::Null, TriggerType::Scheduled).await {
                Ok(execution) => {
                    info!(%task_id, %workflow_id, execution_id = %execution.id, "scheduled task fired");
                    report.tasks_fired += 1;
                }
                Err(err) => {
                    error!(%task_id, %workflow_id, error = %err, "scheduled task failed to fire");
                    report.errors.push(format!("task {task_id}: {err}"));
                }
            }

            if let Some(mut task) = self.tasks.get_mut(&task_id) {
                task.execution_count += 1;
                task.last_execution = Some(now);
                if !task.has_remaining_executions() {
                    task.active = false;
                    report.tasks_deactivated += 1;
                    warn!(%task_id, "scheduled task reached max_executions and was deactivated");
                } else if let Some(next) = schedule.next_after(now) {
                    task.next_execution = next;
                } else {
                    task.active = false;
                    report.tasks_deactivated += 1;
                }
            }
        }

        let due_jobs: Vec<Uuid> = self
            .jobs
            .iter()
            .filter(|e| e.active && e.next_execution <= now)
            .map(|e| *e.key())
            .collect();

        for job_id in due_jobs {
            let (schedule, callback) = {
                let schedule = match self.job_schedules.get(&job_id) {
                    Some(s) => s.clone(),
                    None => continue,
                };
                let callback = match self.job_callbacks.get(&job_id) {
                    Some(c) => c.clone(),
                    None => continue,
                };
                (schedule, callback)
            };

            match callback.run().await {
                Ok(()) => {
                    report.jobs_fired += 1;
                }
                Err(msg) => {
                    error!(%job_id, error = %msg, "cron job callback failed");
                    report.errors.push(format!("job {job_id}: {msg}"));
                }
            }

            if let Some(mut job) = self.jobs.get_mut(&job_id) {
                job.run_count += 1;
                job.last_execution = Some(now);
                if let Some(next) = schedule.next_after(now) {
                    job.next_execution = next;
                } else {
                    job.active = false;
                }
            }
        }

        report
    }

    /// Spawns the master-tick loop on the current tokio runtime, returning a
    /// handle the caller can abort on shutdown.
    #[must_use]
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = self.config.tick_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let report = self.tick().await;
                if report.tasks_fired > 0 || report.jobs_fired > 0 || !report.errors.is_empty() {
                    info!(
                        tasks_fired = report.tasks_fired,
                        jobs_fired = report.jobs_fired,
                        tasks_deactivated = report.tasks_deactivated,
                        errors = report.errors.len(),
                        "master tick complete"
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automation_errors::{ErrorHandler, ErrorHandlerConfig};
    use engine::{EngineConfig, TriggerSpec, WorkflowDefinition};
    use nodes::mock::MockNode;
    use nodes::{ExecutableNode, NodeRegistry};
    use state::{MemoryPersistence, PersistenceStrategy, StateManager, StateManagerConfig};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_engine(registry: NodeRegistry) -> Arc<WorkflowEngine> {
        let state_manager = Arc::new(StateManager::new(
            Arc::new(MemoryPersistence::default()),
            PersistenceStrategy::Memory,
            StateManagerConfig::default(),
        ));
        let error_handler = Arc::new(ErrorHandler::new(ErrorHandlerConfig::default()));
        Arc::new(WorkflowEngine::new(registry, state_manager, error_handler, EngineConfig::default()))
    }

    #[tokio::test]
    async fn scheduling_a_task_computes_its_first_next_execution() {
        let engine = test_engine(NodeRegistry::new());
        let scheduler = TaskScheduler::new(engine, TaskSchedulerConfig::default());
        let id = scheduler.schedule_workflow(Uuid::new_v4(), "*/5 * * * *", "UTC", None).unwrap();
        let task = scheduler.task(id).unwrap();
        assert!(task.next_execution > Utc::now());
        assert!(task.active);
    }

    #[tokio::test]
    async fn tick_fires_due_task_and_advances_schedule() {
        let node = Arc::new(MockNode::returning("step", serde_json::json!({})));
        let mut registry = NodeRegistry::new();
        registry.insert("step".into(), node as Arc<dyn ExecutableNode>);
        let engine = test_engine(registry);

        let def = WorkflowDefinition::new(
            "scheduled-flow",
            vec![TriggerSpec::Cron { expression: "* * * * *".into() }],
            vec![engine::NodeDefinition {
                id: "step".into(),
                node_type: "step".into(),
                name: String::new(),
                config: serde_json::Value::Null,
                timeout_secs: None,
                precondition: None,
            }],
            vec![],
        );
        let workflow_id = def.id;
        engine.register(def).unwrap();

        let scheduler = TaskScheduler::new(engine.clone(), TaskSchedulerConfig::default());
        let task_id = scheduler.schedule_workflow(workflow_id, "* * * * *", "UTC", None).unwrap();

        {
            let mut task = scheduler.tasks.get_mut(&task_id).unwrap();
            task.next_execution = Utc::now() - chrono::Duration::seconds(1);
        }

        let report = scheduler.tick().await;
        assert_eq!(report.tasks_fired, 1);
        let task = scheduler.task(task_id).unwrap();
        assert_eq!(task.execution_count, 1);
        assert!(task.next_execution > Utc::now());
    }

    #[tokio::test]
    async fn task_deactivates_after_max_executions() {
        let node = Arc::new(MockNode::returning("step", serde_json::json!({})));
        let mut registry = NodeRegistry::new();
        registry.insert("step".into(), node as Arc<dyn ExecutableNode>);
        let engine = test_engine(registry);

        let def = WorkflowDefinition::new(
            "capped",
            vec![TriggerSpec::Cron { expression: "* * * * *".into() }],
            vec![engine::NodeDefinition {
                id: "step".into(),
                node_type: "step".into(),
                name: String::new(),
                config: serde_json::Value::Null,
                timeout_secs: None,
                precondition: None,
            }],
            vec![],
        );
        let workflow_id = def.id;
        engine.register(def).unwrap();

        let scheduler = TaskScheduler::new(engine, TaskSchedulerConfig::default());
        let task_id = scheduler.schedule_workflow(workflow_id, "* * * * *", "UTC", Some(1)).unwrap();
        {
            let mut task = scheduler.tasks.get_mut(&task_id).unwrap();
            task.next_execution = Utc::now() - chrono::Duration::seconds(1);
        }

        let report = scheduler.tick().await;
        assert_eq!(report.tasks_fired, 1);
        assert_eq!(report.tasks_deactivated, 1);
        assert!(!scheduler.task(task_id).unwrap().active);
    }

    struct CountingCallback(AtomicU32);

    #[async_trait]
    impl CronCallback for CountingCallback {
        async fn run(&self) -> Result<(), String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn cron_job_runs_independently_of_the_engine() {
        let engine = test_engine(NodeRegistry::new());
        let scheduler = TaskScheduler::new(engine, TaskSchedulerConfig::default());
        let callback = Arc::new(CountingCallback(AtomicU32::new(0)));
        let job_id = scheduler.register_job("housekeeping", "* * * * *", callback.clone()).unwrap();

        {
            let mut job = scheduler.jobs.get_mut(&job_id).unwrap();
            job.next_execution = Utc::now() - chrono::Duration::seconds(1);
        }

        let report = scheduler.tick().await;
        assert_eq!(report.jobs_fired, 1);
        assert_eq!(callback.0.load(Ordering::SeqCst), 1);
    }
}
