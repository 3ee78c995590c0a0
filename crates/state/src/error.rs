//! Typed error type for the `state` crate.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state '{0}' not found")]
    NotFound(Uuid),

    #[error("checkpoint '{0}' not found")]
    CheckpointNotFound(Uuid),

    #[error("snapshot '{0}' not found")]
    SnapshotNotFound(Uuid),

    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("persistence provider error: {0}")]
    Persistence(String),

    #[error("persistence strategy '{0}' is not implemented")]
    StrategyNotImplemented(&'static str),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}
