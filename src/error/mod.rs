//! Error types for civic-link.

pub mod envelope;

pub use envelope::{ErrorBody, ErrorEnvelope, SuccessEnvelope};

use std::fmt;

use thiserror::Error;

/// Wire code used when a failure cannot be classified any further.
pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";

/// Broad failure class, used for retry and recovery decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No response reached us (connection refused, DNS, reset, timeout).
    Network,
    /// The server answered with an error status.
    Http { status: u16 },
    /// The refresh token was rejected; the session is gone.
    AuthExpired,
    /// Caller-supplied data rejected before dispatch.
    Validation,
    /// Anything else, including malformed response bodies.
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => f.write_str("NETWORK_ERROR"),
            Self::Http { status } => write!(f, "HTTP_{status}"),
            Self::AuthExpired => f.write_str("AUTH_EXPIRED"),
            Self::Validation => f.write_str("VALIDATION_ERROR"),
            Self::Unknown => f.write_str(UNKNOWN_ERROR),
        }
    }
}

/// Primary error type for every request made through the client.
///
/// Built once from the failure and never mutated; `Clone` so a single refresh
/// failure can be handed to every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("[{code}] {message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    pub status_code: Option<u16>,
    pub retryable: bool,
}

impl ApiError {
    /// No response was received. Always safe to retry.
    pub fn network(message: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::Network, message, true)
    }

    /// The request timed out. The server may have acted on it, so only
    /// idempotent requests are retried.
    pub fn timeout(after_ms: u64, idempotent: bool) -> Self {
        Self::from_kind(
            ErrorKind::Network,
            format!("Request timed out after {after_ms}ms"),
            idempotent,
        )
    }

    /// The server responded with an error status.
    pub fn http(status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Http { status },
            code: code.unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
            message: message.into(),
            status_code: Some(status),
            retryable: is_retryable_status(status),
        }
    }

    pub fn auth_expired(message: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::AuthExpired, message, false)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::Validation, message, false)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::Unknown, message, false)
    }

    /// A 2xx response whose body could not be decoded.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::unknown(format!("Malformed response body: {}", message.into()))
    }

    fn from_kind(kind: ErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            code: kind.to_string(),
            message: message.into(),
            status_code: None,
            retryable,
        }
    }

    /// `true` for 401 responses, which the refresh coordinator handles.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.kind, ErrorKind::Http { status: 401 })
    }

    pub fn is_network(&self) -> bool {
        self.kind == ErrorKind::Network
    }

    pub fn is_auth_expired(&self) -> bool {
        self.kind == ErrorKind::AuthExpired
    }
}

/// Statuses worth re-attempting: 408, 429 and every 5xx.
///
/// 401 is deliberately absent; it goes through token refresh instead.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429) || status >= 500
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_builder() {
            return Self::validation(error.to_string());
        }
        if error.is_decode() {
            return Self::malformed(error.to_string());
        }
        if let Some(status) = error.status() {
            return Self::http(status.as_u16(), None, error.to_string());
        }
        Self::network(error.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(error: serde_json::Error) -> Self {
        Self::malformed(error.to_string())
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_and_throttling_statuses_are_retryable() {
        for status in [500, 502, 503, 504, 408, 429] {
            let err = ApiError::http(status, None, "boom");
            assert!(err.retryable, "status {status} should be retryable");
        }
    }

    #[test]
    fn other_client_errors_are_fatal() {
        for status in (400..500).filter(|s| ![401, 408, 429].contains(s)) {
            let err = ApiError::http(status, None, "nope");
            assert!(!err.retryable, "status {status} should not be retryable");
        }
        assert!(!ApiError::http(401, None, "expired").retryable);
    }

    #[test]
    fn unparsed_http_error_uses_unknown_code() {
        let err = ApiError::http(503, None, "unavailable");
        assert_eq!(err.code, "UNKNOWN_ERROR");
        assert_eq!(err.kind.to_string(), "HTTP_503");
        assert_eq!(err.status_code, Some(503));
    }

    #[test]
    fn timeouts_retry_only_when_idempotent() {
        assert!(ApiError::timeout(30_000, true).retryable);
        assert!(!ApiError::timeout(30_000, false).retryable);
        assert!(ApiError::timeout(30_000, false).is_network());
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = ApiError::auth_expired("Session expired");
        assert_eq!(err.to_string(), "[AUTH_EXPIRED] Session expired");
        assert!(err.is_auth_expired());
    }

    #[test]
    fn malformed_body_is_not_retryable() {
        let err: ApiError = serde_json::from_str::<serde_json::Value>("{oops")
            .unwrap_err()
            .into();
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert!(!err.retryable);
    }
}
