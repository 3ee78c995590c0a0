//! Deterministic error classification (spec §7: taxonomy + severity).

use serde::{Deserialize, Serialize};

/// The closed taxonomy of error kinds the engine, triggers, and actions
/// report through. New kinds are never synthesized ad hoc — everything not
/// otherwise matched falls through to [`ErrorKind::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Timeout,
    Authentication,
    Authorization,
    Validation,
    RateLimit,
    ResourceExhausted,
    ServiceUnavailable,
    InternalServer,
    BadRequest,
    NotFound,
    Conflict,
    Unknown,
}

/// Severity derived from [`ErrorKind`]; never set independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorKind {
    /// Maps an HTTP status code directly onto a kind (spec §7).
    #[must_use]
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 => Self::BadRequest,
            401 => Self::Authentication,
            403 => Self::Authorization,
            404 => Self::NotFound,
            409 => Self::Conflict,
            429 => Self::RateLimit,
            503 => Self::ServiceUnavailable,
            500..=599 => Self::InternalServer,
            _ => Self::Unknown,
        }
    }

    /// Falls back to name/message heuristics when there is no status code to
    /// key off of (e.g. a node handler's own error string).
    #[must_use]
    pub fn from_heuristic(name: &str, message: &str) -> Self {
        let haystack = format!("{name} {message}").to_lowercase();
        let contains_any = |needles: &[&str]| needles.iter().any(|n| haystack.contains(n));

        if contains_any(&["timeout", "timed out", "deadline exceeded"]) {
            Self::Timeout
        } else if contains_any(&["connection refused", "dns", "unreachable", "network"]) {
            Self::Network
        } else if contains_any(&["unauthorized", "authentication", "invalid credentials"]) {
            Self::Authentication
        } else if contains_any(&["forbidden", "not allowed", "authorization"]) {
            Self::Authorization
        } else if contains_any(&["rate limit", "too many requests", "throttle"]) {
            Self::RateLimit
        } else if contains_any(&["exhausted", "out of memory", "quota"]) {
            Self::ResourceExhausted
        } else if contains_any(&["unavailable", "circuit open", "no healthy upstream"]) {
            Self::ServiceUnavailable
        } else if contains_any(&["validation", "invalid input", "malformed"]) {
            Self::Validation
        } else if contains_any(&["not found", "no such", "missing"]) {
            Self::NotFound
        } else if contains_any(&["conflict", "already exists", "duplicate"]) {
            Self::Conflict
        } else if contains_any(&["internal", "panic", "unexpected"]) {
            Self::InternalServer
        } else {
            Self::Unknown
        }
    }

    /// Severity implied by this kind (spec §7).
    #[must_use]
    pub fn severity(self) -> Severity {
        match self {
            Self::InternalServer | Self::ResourceExhausted => Severity::Critical,
            Self::ServiceUnavailable | Self::Authentication | Self::Authorization => {
                Severity::High
            }
            Self::Network | Self::Timeout | Self::RateLimit => Severity::Medium,
            Self::Validation
            | Self::BadRequest
            | Self::NotFound
            | Self::Conflict
            | Self::Unknown => Severity::Low,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_maps_directly() {
        assert_eq!(ErrorKind::from_http_status(404), ErrorKind::NotFound);
        assert_eq!(ErrorKind::from_http_status(503), ErrorKind::ServiceUnavailable);
        assert_eq!(ErrorKind::from_http_status(502), ErrorKind::InternalServer);
        assert_eq!(ErrorKind::from_http_status(200), ErrorKind::Unknown);
    }

    #[test]
    fn heuristic_classification() {
        assert_eq!(
            ErrorKind::from_heuristic("ConnectTimeout", "operation timed out"),
            ErrorKind::Timeout
        );
        assert_eq!(
            ErrorKind::from_heuristic("Error", "connection refused by peer"),
            ErrorKind::Network
        );
    }

    #[test]
    fn severity_follows_kind() {
        assert_eq!(ErrorKind::InternalServer.severity(), Severity::Critical);
        assert_eq!(ErrorKind::Authentication.severity(), Severity::High);
        assert_eq!(ErrorKind::Timeout.severity(), Severity::Medium);
        assert_eq!(ErrorKind::NotFound.severity(), Severity::Low);
    }
}
