//! Metrics and trace collection (spec.md §4.10).

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::{LogEntry, PerformanceMetrics, Span, SystemMetrics, Trace, WorkflowMetrics};

pub const SYSTEM_METRICS_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub system_metrics_history: usize,
    pub trace_history: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { system_metrics_history: 500, trace_history: 1_000 }
    }
}

/// Source of system-level samples. Production deployments plug in a real
/// `/proc`-reading or platform-API implementation; tests use a fake.
pub trait SystemSampler: Send + Sync {
    fn sample(&self) -> SystemMetrics;
}

/// Collects per-workflow execution metrics, traces, and periodic
/// system/performance snapshots.
pub struct MetricsCollector {
    workflow_metrics: DashMap<Uuid, WorkflowMetrics>,
    traces: DashMap<Uuid, Trace>,
    system_history: Mutex<VecDeque<SystemMetrics>>,
    performance_history: Mutex<VecDeque<PerformanceMetrics>>,
    config: MetricsConfig,
}

impl MetricsCollector {
    #[must_use]
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            workflow_metrics: DashMap::new(),
            traces: DashMap::new(),
            system_history: Mutex::new(VecDeque::new()),
            performance_history: Mutex::new(VecDeque::new()),
            config,
        }
    }

    pub fn record_execution(&self, workflow_id: Uuid, succeeded: bool, duration_ms: f64) {
        let mut entry = self.workflow_metrics.entry(workflow_id).or_insert_with(|| WorkflowMetrics::new(workflow_id));
        entry.record(succeeded, duration_ms, Utc::now());
    }

    #[must_use]
    pub fn workflow_metrics(&self, workflow_id: Uuid) -> Option<WorkflowMetrics> {
        self.workflow_metrics.get(&workflow_id).map(|m| m.clone())
    }

    #[must_use]
    pub fn all_workflow_metrics(&self) -> Vec<WorkflowMetrics> {
        self.workflow_metrics.iter().map(|m| m.clone()).collect()
    }

    pub fn start_trace(&self, execution_id: Uuid) -> Uuid {
        let trace = Trace::new(execution_id);
        let id = trace.id;
        self.traces.insert(id, trace);
        self.bound_traces();
        id
    }

    pub fn start_span(&self, trace_id: Uuid, name: &str, parent_id: Option<Uuid>) -> Option<Uuid> {
        let mut trace = self.traces.get_mut(&trace_id)?;
        let span = Span::new(name, parent_id);
        let id = span.id;
        trace.spans.push(span);
        Some(id)
    }

    pub fn finish_span(&self, trace_id: Uuid, span_id: Uuid) {
        if let Some(mut trace) = self.traces.get_mut(&trace_id) {
            if let Some(span) = trace.spans.iter_mut().find(|s| s.id == span_id) {
                span.finish();
            }
        }
    }

    pub fn tag_span(&self, trace_id: Uuid, span_id: Uuid, key: &str, value: &str) {
        if let Some(mut trace) = self.traces.get_mut(&trace_id) {
            if let Some(span) = trace.spans.iter_mut().find(|s| s.id == span_id) {
                span.tags.insert(key.to_owned(), value.to_owned());
            }
        }
    }

    pub fn log_span(&self, trace_id: Uuid, span_id: Uuid, level: &str, message: &str) {
        if let Some(mut trace) = self.traces.get_mut(&trace_id) {
            if let Some(span) = trace.spans.iter_mut().find(|s| s.id == span_id) {
                span.logs.push(LogEntry { timestamp: Utc::now(), level: level.to_owned(), message: message.to_owned() });
            }
        }
    }

    #[must_use]
    pub fn trace(&self, trace_id: Uuid) -> Option<Trace> {
        self.traces.get(&trace_id).map(|t| t.clone())
    }

    fn bound_traces(&self) {
        while self.traces.len() > self.config.trace_history {
            if let Some(oldest) = self.traces.iter().min_by_key(|t| t.started_at).map(|t| t.id) {
                self.traces.remove(&oldest);
            } else {
                break;
            }
        }
    }

    pub fn record_system_sample(&self, sample: SystemMetrics) {
        let mut history = self.system_history.lock().unwrap_or_else(|p| p.into_inner());
        history.push_back(sample);
        while history.len() > self.config.system_metrics_history {
            history.pop_front();
        }
    }

    #[must_use]
    pub fn latest_system_sample(&self) -> Option<SystemMetrics> {
        self.system_history.lock().unwrap_or_else(|p| p.into_inner()).back().cloned()
    }

    #[must_use]
    pub fn system_history(&self) -> Vec<SystemMetrics> {
        self.system_history.lock().unwrap_or_else(|p| p.into_inner()).iter().cloned().collect()
    }

    pub fn record_performance_sample(&self, sample: PerformanceMetrics) {
        let mut history = self.performance_history.lock().unwrap_or_else(|p| p.into_inner());
        history.push_back(sample);
        while history.len() > self.config.system_metrics_history {
            history.pop_front();
        }
    }

    #[must_use]
    pub fn performance_history(&self, component: &str) -> Vec<PerformanceMetrics> {
        self.performance_history
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|p| p.component == component)
            .cloned()
            .collect()
    }

    /// Pulls one sample from `sampler` and records it with the current timestamp.
    pub fn collect_system_metrics(&self, sampler: &dyn SystemSampler) {
        let mut sample = sampler.sample();
        sample.sampled_at = Some(Utc::now());
        self.record_system_sample(sample);
    }
}

impl crate::alerting::MetricSource for MetricsCollector {
    /// Resolves the well-known system-metric names plus
    /// `workflow:<id>:success_rate` / `workflow:<id>:avg_duration_ms` for
    /// per-workflow alert rules.
    fn current_value(&self, metric: &str) -> Option<f64> {
        if let Some(rest) = metric.strip_prefix("workflow:") {
            let (id, field) = rest.split_once(':')?;
            let workflow_id = uuid::Uuid::parse_str(id).ok()?;
            let metrics = self.workflow_metrics(workflow_id)?;
            return match field {
                "success_rate" => Some(metrics.success_rate()),
                "avg_duration_ms" => Some(metrics.avg_duration_ms),
                "execution_count" => Some(metrics.execution_count as f64),
                _ => None,
            };
        }

        let sample = self.latest_system_sample()?;
        match metric {
            "cpu_percent" => Some(sample.cpu_percent),
            "memory_percent" => Some(sample.memory_percent),
            "disk_percent" => Some(sample.disk_percent),
            "network_bytes_per_sec" => Some(sample.network_bytes_per_sec),
            "process_count" => Some(sample.process_count as f64),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::MetricSource;

    #[test]
    fn metric_source_resolves_system_and_per_workflow_metrics() {
        let collector = MetricsCollector::new(MetricsConfig::default());
        collector.record_system_sample(SystemMetrics { cpu_percent: 42.0, ..Default::default() });
        assert_eq!(collector.current_value("cpu_percent"), Some(42.0));
        assert_eq!(collector.current_value("unknown_metric"), None);

        let workflow_id = Uuid::new_v4();
        collector.record_execution(workflow_id, true, 50.0);
        let key = format!("workflow:{workflow_id}:success_rate");
        assert_eq!(collector.current_value(&key), Some(1.0));
    }

    #[test]
    fn workflow_metrics_track_min_max_avg_and_rates() {
        let collector = MetricsCollector::new(MetricsConfig::default());
        let workflow_id = Uuid::new_v4();
        collector.record_execution(workflow_id, true, 100.0);
        collector.record_execution(workflow_id, false, 300.0);
        collector.record_execution(workflow_id, true, 200.0);

        let metrics = collector.workflow_metrics(workflow_id).unwrap();
        assert_eq!(metrics.execution_count, 3);
        assert_eq!(metrics.success_count, 2);
        assert_eq!(metrics.failure_count, 1);
        assert!((metrics.min_duration_ms - 100.0).abs() < f64::EPSILON);
        assert!((metrics.max_duration_ms - 300.0).abs() < f64::EPSILON);
        assert!((metrics.avg_duration_ms - 200.0).abs() < 1e-6);
        assert!((metrics.success_rate() - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn traces_hold_nested_spans_with_tags_and_logs() {
        let collector = MetricsCollector::new(MetricsConfig::default());
        let execution_id = Uuid::new_v4();
        let trace_id = collector.start_trace(execution_id);
        let root = collector.start_span(trace_id, "execute", None).unwrap();
        let child = collector.start_span(trace_id, "node:http_request", Some(root)).unwrap();
        collector.tag_span(trace_id, child, "node_type", "http_request");
        collector.log_span(trace_id, child, "info", "dispatching request");
        collector.finish_span(trace_id, child);

        let trace = collector.trace(trace_id).unwrap();
        assert_eq!(trace.spans.len(), 2);
        let child_span = trace.spans.iter().find(|s| s.id == child).unwrap();
        assert_eq!(child_span.parent_id, Some(root));
        assert_eq!(child_span.tags.get("node_type").map(String::as_str), Some("http_request"));
        assert!(child_span.ended_at.is_some());
    }

    #[test]
    fn system_history_is_bounded() {
        let collector = MetricsCollector::new(MetricsConfig { system_metrics_history: 2, trace_history: 10 });
        for i in 0..5 {
            collector.record_system_sample(SystemMetrics { cpu_percent: i as f64, ..Default::default() });
        }
        let history = collector.system_history();
        assert_eq!(history.len(), 2);
        assert!((history[0].cpu_percent - 3.0).abs() < f64::EPSILON);
        assert!((history[1].cpu_percent - 4.0).abs() < f64::EPSILON);
    }
}
