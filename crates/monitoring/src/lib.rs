//! `MonitoringService`: metrics, traces, and alerting (spec.md §4.10).

pub mod alerting;
pub mod error;
pub mod metrics;
pub mod models;
pub mod system_sampler;

pub use alerting::{AlertManager, MetricSource, ALERT_EVALUATION_INTERVAL};
pub use error::MonitoringError;
pub use metrics::{MetricsCollector, MetricsConfig, SystemSampler, SYSTEM_METRICS_INTERVAL};
pub use system_sampler::HostSampler;
pub use models::{
    Alert, AlertOperator, AlertRule, AlertState, LogEntry, NotificationChannel, NotificationChannelKind,
    NotificationRecord, PerformanceMetrics, Span, SystemMetrics, Trace, WorkflowMetrics,
};

/// Aggregates the metrics collector and alert manager behind one handle,
/// mirroring how `TriggerService` bundles its own sub-services.
pub struct MonitoringService {
    pub metrics: MetricsCollector,
    pub alerts: AlertManager,
}

impl Default for MonitoringService {
    fn default() -> Self {
        Self::new(MetricsConfig::default())
    }
}

impl MonitoringService {
    #[must_use]
    pub fn new(config: MetricsConfig) -> Self {
        Self { metrics: MetricsCollector::new(config), alerts: AlertManager::new() }
    }

    /// Spawns the 30-second system-metrics collector (spec.md §4.10).
    #[must_use]
    pub fn spawn_system_collector(self: std::sync::Arc<Self>, sampler: std::sync::Arc<dyn SystemSampler>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SYSTEM_METRICS_INTERVAL);
            loop {
                interval.tick().await;
                self.metrics.collect_system_metrics(sampler.as_ref());
            }
        })
    }

    /// Spawns the 60-second alert-rule evaluator (spec.md §4.10).
    #[must_use]
    pub fn spawn_alert_evaluator(self: std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(alerting::ALERT_EVALUATION_INTERVAL);
            loop {
                interval.tick().await;
                self.alerts.evaluate(&self.metrics);
            }
        })
    }
}
