use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{envelope, ApiError, Result, SuccessEnvelope};

/// A successful response with the success envelope already unwrapped.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub data: Value,
    pub timestamp: Option<DateTime<Utc>>,
    pub from_cache: bool,
}

impl ApiResponse {
    /// Decode a 2xx body.
    ///
    /// `{success: true, data}` yields `data`; any other JSON is returned whole
    /// and an empty body becomes `null`. A body that is not JSON is malformed.
    pub fn from_body(status: u16, body: &str) -> Result<Self> {
        if body.trim().is_empty() {
            return Ok(Self::new(status, Value::Null));
        }

        let value: Value = serde_json::from_str(body)?;
        match value.get("success").and_then(Value::as_bool) {
            Some(true) => {
                let envelope: SuccessEnvelope = serde_json::from_value(value)?;
                Ok(Self {
                    status,
                    data: envelope.data,
                    timestamp: envelope.timestamp,
                    from_cache: false,
                })
            }
            Some(false) => Err(envelope::error_from_body(status, body)),
            None => Ok(Self::new(status, value)),
        }
    }

    pub fn new(status: u16, data: Value) -> Self {
        Self {
            status,
            data,
            timestamp: None,
            from_cache: false,
        }
    }

    pub(crate) fn cached(data: Value) -> Self {
        Self {
            status: 200,
            data,
            timestamp: None,
            from_cache: true,
        }
    }

    /// Deserialize `data` into a domain type.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| ApiError::malformed(format!("Unexpected response shape: {e}")))
    }
}
