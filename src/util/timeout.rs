//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::ProviderError;

/// Wrap a provider future with an optional idle timeout.
///
/// A `None` duration waits forever. Expiry is reported as a timed-out
/// [`ProviderError`], which the retry policy treats as transient.
pub async fn with_idle_timeout<T>(
    duration: Option<Duration>,
    future: impl Future<Output = T>,
) -> Result<T, ProviderError> {
    let Some(duration) = duration else {
        return Ok(future.await);
    };
    tokio::time::timeout(duration, future).await.map_err(|_| {
        ProviderError::timeout(format!(
            "stream idle for {}ms",
            duration.as_millis()
        ))
    })
}
