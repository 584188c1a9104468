//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::{ApiError, Result};

/// Wrap a future with a timeout.
///
/// `idempotent` decides whether the resulting timeout error may be retried.
pub async fn with_timeout<T>(
    duration: Duration,
    idempotent: bool,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::timeout(duration.as_millis() as u64, idempotent)),
    }
}
