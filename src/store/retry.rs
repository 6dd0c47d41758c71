//! Bounded exponential backoff for retryable store errors.

use std::future::Future;
use std::time::Duration;

use super::{StoreError, StoreResult};

/// Retries `op` on [`Throttled`](StoreError::Throttled) /
/// [`Transient`](StoreError::Transient) errors with exponential backoff.
///
/// Non-retryable errors and exhaustion return the last error unchanged.
///
/// # Errors
///
/// Returns the final [`StoreError`] after `attempts` tries.
pub async fn with_backoff<T, F, Fut>(
    op_name: &str,
    attempts: u32,
    base_delay: Duration,
    op: F,
) -> StoreResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut delay = base_delay;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < attempts => {
                tracing::warn!(op = op_name, attempt, err = %e, "retrying store operation");
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_backoff("test", 3, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(StoreError::Throttled)
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert!(matches!(result, Ok(42)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_concurrency_errors() {
        let calls = AtomicU32::new(0);
        let result: StoreResult<()> = with_backoff("test", 3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Conflict("id".to_string())) }
        })
        .await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let result: StoreResult<()> = with_backoff("test", 2, Duration::from_millis(1), || async {
            Err(StoreError::Transient("io".to_string()))
        })
        .await;
        assert!(matches!(result, Err(StoreError::Transient(_))));
    }
}
