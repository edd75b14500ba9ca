//! Async timeout wrappers with named defaults.

use crate::error::{ProtocolError, Result};
use std::future::Future;
use std::time::Duration;

/// Default timeout for individual I/O operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Run a future with a deadline, mapping expiry to [`ProtocolError::Timeout`].
pub async fn with_timeout_error<F, T>(future: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_within_deadline() {
        let value = with_timeout_error(async { Ok(42) }, Duration::from_secs(1))
            .await
            .expect("in time");
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn maps_expiry_to_timeout_error() {
        let result = with_timeout_error(
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            Duration::from_millis(10),
        )
        .await;
        assert!(matches!(result, Err(ProtocolError::Timeout)));
    }
}
