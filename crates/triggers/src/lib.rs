//! `triggers` crate — `TriggerService`, `EventBus`, and `WebhookService`
//! (spec.md §4.2, §4.3, §4.5).

pub mod error;
pub mod event_bus;
pub mod models;
pub mod trigger_service;
pub mod webhook_service;

pub use error::{TriggerError, WebhookRejection};
pub use event_bus::{EventBus, EventBusConfig, EventFilter, EventPayload, FilterOperator, PublishReport, Subscription};
pub use models::{
    AuthConfig, DataMapping, RateLimitConfig, SignatureAlgorithm, TimeSchedule, Transform, TriggerDefinition,
    TriggerDispatchOutcome, TriggerKind, TriggerStats, WebhookBinding, WebhookCondition, WebhookDispatchSummary,
    WebhookEndpoint, WebhookPayload,
};
pub use trigger_service::{ConditionSampler, TriggerService};
pub use webhook_service::{InboundRequest, WebhookService, WebhookServiceConfig};
