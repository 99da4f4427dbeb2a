//! Timeout enforcement.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation timed out after {0:?}")]
pub struct TimeoutError(pub Duration);

/// Race `fut` against a timer. The future is dropped on expiry.
pub async fn with_timeout<F>(limit: Duration, fut: F) -> Result<F::Output, TimeoutError>
where
    F: Future,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| TimeoutError(limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_expires() {
        let result = with_timeout(Duration::from_millis(100), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            1
        })
        .await;
        assert_eq!(result, Err(TimeoutError(Duration::from_millis(100))));
    }

    #[tokio::test]
    async fn test_fast_future_completes() {
        let result = with_timeout(Duration::from_secs(1), async { 7 }).await;
        assert_eq!(result, Ok(7));
    }
}
