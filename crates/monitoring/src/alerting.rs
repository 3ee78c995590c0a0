//! Alert rule evaluation and notification dispatch (spec.md §4.10).

use std::sync::Mutex;

use automation_errors::Severity;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::MonitoringError;
use crate::models::{Alert, AlertRule, AlertState, NotificationChannel, NotificationRecord};

pub const ALERT_EVALUATION_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

/// Resolves a metric name to its current numeric value. `MetricsCollector`
/// does not know about alert rules, so this trait is the seam between them.
pub trait MetricSource: Send + Sync {
    fn current_value(&self, metric: &str) -> Option<f64>;
}

pub struct AlertManager {
    rules: DashMap<Uuid, AlertRule>,
    alerts: DashMap<Uuid, Alert>,
    channels: DashMap<Uuid, NotificationChannel>,
    notifications: Mutex<Vec<NotificationRecord>>,
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertManager {
    #[must_use]
    pub fn new() -> Self {
        Self { rules: DashMap::new(), alerts: DashMap::new(), channels: DashMap::new(), notifications: Mutex::new(Vec::new()) }
    }

    pub fn add_rule(&self, rule: AlertRule) -> Uuid {
        let id = rule.id;
        self.rules.insert(id, rule);
        id
    }

    pub fn remove_rule(&self, rule_id: Uuid) -> Result<(), MonitoringError> {
        self.rules.remove(&rule_id).map(|_| ()).ok_or(MonitoringError::RuleNotFound(rule_id))
    }

    #[must_use]
    pub fn rules(&self) -> Vec<AlertRule> {
        self.rules.iter().map(|r| r.clone()).collect()
    }

    pub fn register_channel(&self, channel: NotificationChannel) -> Uuid {
        let id = channel.id;
        self.channels.insert(id, channel);
        id
    }

    #[must_use]
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.iter().map(|a| a.clone()).collect()
    }

    #[must_use]
    pub fn alert(&self, alert_id: Uuid) -> Option<Alert> {
        self.alerts.get(&alert_id).map(|a| a.clone())
    }

    pub fn resolve(&self, alert_id: Uuid) -> Result<(), MonitoringError> {
        let mut alert = self.alerts.get_mut(&alert_id).ok_or(MonitoringError::AlertNotFound(alert_id))?;
        alert.state = AlertState::Resolved;
        Ok(())
    }

    pub fn silence(&self, alert_id: Uuid, duration: chrono::Duration) -> Result<(), MonitoringError> {
        let mut alert = self.alerts.get_mut(&alert_id).ok_or(MonitoringError::AlertNotFound(alert_id))?;
        alert.state = AlertState::Silenced;
        alert.silenced_until = Some(Utc::now() + duration);
        Ok(())
    }

    /// Lapsed silences revert to `Active` so a later breach re-fires notifications.
    fn reactivate_lapsed_silences(&self) {
        let now = Utc::now();
        for mut alert in self.alerts.iter_mut() {
            if alert.state == AlertState::Silenced {
                if let Some(until) = alert.silenced_until {
                    if now >= until {
                        alert.state = AlertState::Active;
                        alert.silenced_until = None;
                    }
                }
            }
        }
    }

    /// Evaluates every active rule against `source`, raising or bumping
    /// alerts, then dispatches notifications for alerts that became or
    /// remain active this round. Returns the ids of alerts touched.
    pub fn evaluate(&self, source: &dyn MetricSource) -> Vec<Uuid> {
        self.reactivate_lapsed_silences();
        let mut touched = Vec::new();
        for rule in self.rules.iter() {
            if !rule.active {
                continue;
            }
            let Some(value) = source.current_value(&rule.metric) else { continue };
            if !rule.operator.evaluate(value, rule.threshold) {
                continue;
            }

            let existing = self.alerts.iter().find(|a| a.rule_id == rule.id && a.state != AlertState::Resolved).map(|a| a.id);
            let alert_id = match existing {
                Some(id) => {
                    let mut alert = self.alerts.get_mut(&id).expect("entry located by the scan above");
                    alert.count += 1;
                    alert.last_triggered = Utc::now();
                    alert.value = value;
                    id
                }
                None => {
                    let alert = Alert {
                        id: Uuid::new_v4(),
                        rule_id: rule.id,
                        state: AlertState::Active,
                        count: 1,
                        first_triggered: Utc::now(),
                        last_triggered: Utc::now(),
                        silenced_until: None,
                        value,
                    };
                    let id = alert.id;
                    self.alerts.insert(id, alert);
                    id
                }
            };
            touched.push(alert_id);
            self.notify(alert_id, rule.severity, &rule.name, value, rule.threshold);
        }
        touched
    }

    fn notify(&self, alert_id: Uuid, severity: Severity, rule_name: &str, value: f64, threshold: f64) {
        let Some(alert) = self.alerts.get(&alert_id) else { return };
        if alert.state != AlertState::Active {
            return;
        }
        drop(alert);

        let message = format!("alert '{rule_name}' breached threshold: value={value} threshold={threshold}");
        let mut sent = self.notifications.lock().unwrap_or_else(|p| p.into_inner());
        for channel in self.channels.iter() {
            if channel.accepts(severity) {
                sent.push(NotificationRecord {
                    channel_id: channel.id,
                    alert_id,
                    severity,
                    message: message.clone(),
                    sent_at: Utc::now(),
                    payload: serde_json::json!({ "rule": rule_name, "value": value, "threshold": threshold }),
                });
            }
        }
    }

    #[must_use]
    pub fn notifications(&self) -> Vec<NotificationRecord> {
        self.notifications.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertOperator, NotificationChannelKind};
    use std::collections::HashMap;

    struct FixedSource(HashMap<&'static str, f64>);

    impl MetricSource for FixedSource {
        fn current_value(&self, metric: &str) -> Option<f64> {
            self.0.get(metric).copied()
        }
    }

    fn rule(metric: &str, operator: AlertOperator, threshold: f64, severity: Severity) -> AlertRule {
        AlertRule {
            id: Uuid::new_v4(),
            name: format!("{metric} rule"),
            metric: metric.to_owned(),
            operator,
            threshold,
            time_window: std::time::Duration::from_secs(300),
            evaluation_interval: ALERT_EVALUATION_INTERVAL,
            severity,
            active: true,
        }
    }

    #[test]
    fn breach_raises_a_new_alert_and_notifies_matching_channels() {
        let manager = AlertManager::new();
        manager.add_rule(rule("cpu_percent", AlertOperator::Gt, 90.0, Severity::High));
        manager.register_channel(NotificationChannel {
            id: Uuid::new_v4(),
            kind: NotificationChannelKind::Slack,
            target: "#ops".into(),
            severity_allow_list: vec![Severity::High, Severity::Critical],
        });
        let source = FixedSource(HashMap::from([("cpu_percent", 95.0)]));

        let touched = manager.evaluate(&source);
        assert_eq!(touched.len(), 1);
        assert_eq!(manager.alerts().len(), 1);
        assert_eq!(manager.notifications().len(), 1);
    }

    #[test]
    fn repeated_breach_increments_existing_alert_instead_of_duplicating() {
        let manager = AlertManager::new();
        manager.add_rule(rule("queue_depth", AlertOperator::Gte, 100.0, Severity::Medium));
        let source = FixedSource(HashMap::from([("queue_depth", 150.0)]));

        manager.evaluate(&source);
        manager.evaluate(&source);
        let alerts = manager.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].count, 2);
    }

    #[test]
    fn severity_allow_list_filters_out_non_matching_channels() {
        let manager = AlertManager::new();
        manager.add_rule(rule("error_rate", AlertOperator::Gt, 0.1, Severity::Low));
        manager.register_channel(NotificationChannel {
            id: Uuid::new_v4(),
            kind: NotificationChannelKind::Email,
            target: "oncall@example.com".into(),
            severity_allow_list: vec![Severity::Critical],
        });
        let source = FixedSource(HashMap::from([("error_rate", 0.5)]));

        manager.evaluate(&source);
        assert!(manager.notifications().is_empty());
    }

    #[test]
    fn resolve_and_silence_transition_alert_state() {
        let manager = AlertManager::new();
        manager.add_rule(rule("disk_percent", AlertOperator::Gt, 80.0, Severity::Medium));
        let source = FixedSource(HashMap::from([("disk_percent", 85.0)]));
        manager.evaluate(&source);
        let alert_id = manager.alerts()[0].id;

        manager.silence(alert_id, chrono::Duration::minutes(10)).unwrap();
        assert_eq!(manager.alert(alert_id).unwrap().state, AlertState::Silenced);

        manager.resolve(alert_id).unwrap();
        assert_eq!(manager.alert(alert_id).unwrap().state, AlertState::Resolved);
    }

    #[test]
    fn silenced_alert_suppresses_notifications_until_it_lapses() {
        let manager = AlertManager::new();
        manager.add_rule(rule("mem_percent", AlertOperator::Gt, 80.0, Severity::Medium));
        manager.register_channel(NotificationChannel {
            id: Uuid::new_v4(),
            kind: NotificationChannelKind::Webhook,
            target: "https://example.com/hook".into(),
            severity_allow_list: vec![Severity::Medium],
        });
        let source = FixedSource(HashMap::from([("mem_percent", 90.0)]));
        manager.evaluate(&source);
        let alert_id = manager.alerts()[0].id;

        manager.silence(alert_id, chrono::Duration::minutes(10)).unwrap();
        manager.evaluate(&source);
        assert_eq!(manager.notifications().len(), 1, "no new notification while silenced");
    }
}
