//! `triggers` error type, covering `TriggerService`, `EventBus`, and
//! `WebhookService` (spec.md §4.2–§4.3, §4.5).

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("trigger '{0}' not found")]
    NotFound(Uuid),

    #[error("subscription '{0}' not found")]
    SubscriptionNotFound(Uuid),

    #[error("webhook endpoint '{0}' not found")]
    EndpointNotFound(Uuid),

    #[error("invalid trigger configuration: {0}")]
    InvalidConfig(String),

    #[error("engine error: {0}")]
    Engine(#[from] engine::EngineError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] scheduler::SchedulerError),
}

/// HTTP-facing outcome of an inbound webhook request (spec.md §4.3 step
/// numbering maps directly onto response codes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookRejection {
    EndpointNotFound,
    EndpointInactive,
    MethodMismatch,
    RateLimited,
    Unauthorized,
    InvalidPayload,
}

impl WebhookRejection {
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            WebhookRejection::EndpointNotFound => 404,
            WebhookRejection::EndpointInactive => 503,
            WebhookRejection::MethodMismatch => 405,
            WebhookRejection::RateLimited => 429,
            WebhookRejection::Unauthorized => 401,
            WebhookRejection::InvalidPayload => 400,
        }
    }
}
