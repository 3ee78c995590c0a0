//! `queue` error type.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("action definition '{0}' not found")]
    DefinitionNotFound(Uuid),

    #[error("action '{0}' not found")]
    ActionNotFound(Uuid),

    #[error("action '{action_id}' cannot be cancelled from status {status}")]
    InvalidCancellation { action_id: Uuid, status: String },

    #[error("rate limit exceeded for action definition '{0}'")]
    RateLimited(Uuid),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("no handler registered for '{0}'")]
    NoHandler(String),
}
