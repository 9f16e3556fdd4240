//! Provider error types

use std::time::Duration;
use thiserror::Error;

/// Failure from the remote model call, with a classification kept for logs.
///
/// Every kind renders through the same user-facing message class; the kind
/// only matters for diagnostics.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Network, message)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ProviderErrorKind::Timeout,
            format!("Request timed out after {:?}", after),
        )
    }

    pub fn cancelled() -> Self {
        Self::new(ProviderErrorKind::Cancelled, "Request cancelled")
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::RateLimit, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Auth, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::InvalidRequest, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Server, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::MalformedResponse, message)
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Blocked, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unknown, message)
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400 | 404 => Self::invalid_request(format!("Invalid request: {}", message)),
            401 | 403 => Self::auth(format!("Authentication failed: {}", message)),
            429 => Self::rate_limit(format!("Quota exceeded: {}", message)),
            500..=599 => Self::server_error(format!("Server error: {}", message)),
            _ => Self::unknown(format!("HTTP {}: {}", status, message)),
        }
    }

    /// The single message class shown to the user for any provider failure.
    pub fn user_message(&self) -> String {
        format!("An error occurred: {}", self.message)
    }
}

impl From<anyhow::Error> for ProviderError {
    fn from(err: anyhow::Error) -> Self {
        Self::unknown(format!("{:#}", err))
    }
}

/// Failure classification, for logs only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Connection failures, unreadable body
    Network,
    /// Caller-supplied deadline elapsed
    Timeout,
    /// Caller cancelled the request
    Cancelled,
    /// 429, quota exhausted
    RateLimit,
    /// 401, 403
    Auth,
    /// 400, 404
    InvalidRequest,
    /// 5xx
    Server,
    /// Body did not parse or carried no text
    MalformedResponse,
    /// Prompt or candidate stopped by the provider's safety filter
    Blocked,
    Unknown,
}

impl ProviderErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::RateLimit => "rate_limit",
            Self::Auth => "auth",
            Self::InvalidRequest => "invalid_request",
            Self::Server => "server",
            Self::MalformedResponse => "malformed_response",
            Self::Blocked => "blocked",
            Self::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_classified() {
        assert_eq!(
            ProviderError::from_status(429, "slow down").kind,
            ProviderErrorKind::RateLimit
        );
        assert_eq!(
            ProviderError::from_status(403, "bad key").kind,
            ProviderErrorKind::Auth
        );
        assert_eq!(
            ProviderError::from_status(503, "busy").kind,
            ProviderErrorKind::Server
        );
        assert_eq!(
            ProviderError::from_status(400, "bad").kind,
            ProviderErrorKind::InvalidRequest
        );
        assert_eq!(
            ProviderError::from_status(418, "teapot").kind,
            ProviderErrorKind::Unknown
        );
    }

    #[test]
    fn every_kind_shares_one_user_message_class() {
        let errors = [
            ProviderError::network("connection refused"),
            ProviderError::timeout(Duration::from_secs(30)),
            ProviderError::cancelled(),
            ProviderError::from_status(429, "quota"),
        ];
        for err in errors {
            let shown = err.user_message();
            assert!(shown.starts_with("An error occurred: "));
            assert!(shown.ends_with(&err.message));
        }
    }

    #[test]
    fn sub_second_timeouts_keep_their_unit() {
        let err = ProviderError::timeout(Duration::from_millis(250));
        assert_eq!(err.kind, ProviderErrorKind::Timeout);
        assert_eq!(err.message, "Request timed out after 250ms");
    }

    #[test]
    fn anyhow_errors_become_unknown() {
        let err: ProviderError = anyhow::anyhow!("boom").into();
        assert_eq!(err.kind, ProviderErrorKind::Unknown);
        assert_eq!(err.to_string(), "boom");
    }
}
