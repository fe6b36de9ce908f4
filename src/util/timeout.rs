//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::AgentryError;

/// Wrap a future with a timeout.
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, AgentryError>>,
) -> Result<T, AgentryError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(AgentryError::Timeout(duration.as_millis() as u64)),
    }
}
