//! `scheduler` error type.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("scheduled task '{0}' not found")]
    TaskNotFound(Uuid),

    #[error("cron job '{0}' not found")]
    JobNotFound(Uuid),

    #[error("engine error: {0}")]
    Engine(#[from] engine::EngineError),
}
