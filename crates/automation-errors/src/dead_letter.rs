//! Dead-letter queue for errors whose retries were exhausted or that were
//! classified non-retryable (spec §4.9, §8: expired items are not reprocessed).

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AutomationError;

/// How a batch of dead-lettered items is handled once picked up by the
/// processing timer (spec.md names the concept without enumerating values;
/// SPEC_FULL.md fixes this closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReprocessingStrategy {
    /// Re-submit the original operation.
    Requeue,
    /// Drop the item after logging.
    Discard,
    /// Leave the item queued but only emit a notification.
    NotifyOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterItem {
    pub id: Uuid,
    pub error: AutomationError,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
}

impl DeadLetterItem {
    fn is_expired(&self, retention: Duration, now: DateTime<Utc>) -> bool {
        let age = now - self.enqueued_at;
        age > chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DeadLetterConfig {
    pub retention: Duration,
    pub batch_size: usize,
    pub processing_interval: Duration,
    pub reprocessing_strategy: ReprocessingStrategy,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(7 * 24 * 3600),
            batch_size: 50,
            processing_interval: Duration::from_secs(60),
            reprocessing_strategy: ReprocessingStrategy::Requeue,
        }
    }
}

/// FIFO dead-letter queue, bounded by age (not by count — unbounded growth
/// within the retention window is accepted since items are pruned on the
/// same timer that reprocesses them).
pub struct DeadLetterQueue {
    config: DeadLetterConfig,
    items: Mutex<VecDeque<DeadLetterItem>>,
}

impl DeadLetterQueue {
    #[must_use]
    pub fn new(config: DeadLetterConfig) -> Self {
        Self { config, items: Mutex::new(VecDeque::new()) }
    }

    pub fn push(&self, error: AutomationError) {
        let mut items = self.items.lock().unwrap();
        items.push_back(DeadLetterItem {
            id: Uuid::new_v4(),
            error,
            enqueued_at: Utc::now(),
            attempts: 0,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains expired items (discarding them) and returns up to `batch_size`
    /// surviving items for reprocessing, per `reprocessing_strategy`.
    pub fn take_batch(&self) -> Vec<DeadLetterItem> {
        let now = Utc::now();
        let mut items = self.items.lock().unwrap();

        items.retain(|item| !item.is_expired(self.config.retention, now));

        let drained = items.len().min(self.config.batch_size);
        items.drain(..drained).collect()
    }

    #[must_use]
    pub fn strategy(&self) -> ReprocessingStrategy {
        self.config.reprocessing_strategy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorKind;
    use crate::error::ErrorContext;

    fn sample_error() -> AutomationError {
        AutomationError::new(ErrorKind::Timeout, "boom", ErrorContext::default())
    }

    #[test]
    fn push_and_take_batch_respects_batch_size() {
        let dlq = DeadLetterQueue::new(DeadLetterConfig { batch_size: 2, ..Default::default() });
        for _ in 0..5 {
            dlq.push(sample_error());
        }
        assert_eq!(dlq.len(), 5);
        let batch = dlq.take_batch();
        assert_eq!(batch.len(), 2);
        assert_eq!(dlq.len(), 3);
    }

    #[test]
    fn expired_items_are_not_reprocessed() {
        let dlq = DeadLetterQueue::new(DeadLetterConfig {
            retention: Duration::from_millis(10),
            ..Default::default()
        });
        dlq.push(sample_error());
        std::thread::sleep(Duration::from_millis(20));
        let batch = dlq.take_batch();
        assert!(batch.is_empty());
        assert!(dlq.is_empty());
    }
}
