//! `queue` crate — `ActionExecutor` (spec.md §4.7).

pub mod error;
pub mod executor;
pub mod models;
pub mod validation;

pub use error::QueueError;
pub use executor::{ActionExecutor, ActionHandler, ExecutorConfig};
pub use models::{
    ActionDefinition, ActionStatus, FieldConstraint, FieldType, InputFieldSpec, QueuedAction, RateLimitConfig,
    RetryAttemptRecord,
};
