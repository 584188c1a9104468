//! JSON envelopes wrapped around every backend response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ApiError;

/// `{ "success": true, "data": ..., "timestamp": ... }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope {
    pub success: bool,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// `{ "success": false, "error": { code, message, statusCode } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorBody,
}

/// Structured error details returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
    pub status_code: Option<u16>,
}

/// Build an [`ApiError`] from an error response.
///
/// The HTTP status always wins over the `statusCode` echoed in the body; a
/// body that does not parse as an error envelope yields `UNKNOWN_ERROR`.
pub fn error_from_body(status: u16, body: &str) -> ApiError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.success => {
            let message = envelope
                .error
                .message
                .unwrap_or_else(|| format!("Request failed with status {status}"));
            ApiError::http(status, envelope.error.code, message)
        }
        _ => {
            let message = if body.trim().is_empty() {
                format!("Request failed with status {status}")
            } else {
                body.trim().to_string()
            };
            ApiError::http(status, None, message)
        }
    }
}
