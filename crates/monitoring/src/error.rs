//! `monitoring` error type.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MonitoringError {
    #[error("alert rule '{0}' not found")]
    RuleNotFound(Uuid),

    #[error("alert '{0}' not found")]
    AlertNotFound(Uuid),

    #[error("notification channel '{0}' not found")]
    ChannelNotFound(Uuid),
}
