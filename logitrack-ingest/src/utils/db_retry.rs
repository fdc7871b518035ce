//! Database Retry Logic
//!
//! Exponential backoff retry for transient store errors (locked or busy
//! database, pool timeout, I/O). Anything else fails on the first attempt.

use logitrack_common::Result;
use std::time::{Duration, Instant};

const INITIAL_BACKOFF_MS: u64 = 10;
const MAX_BACKOFF_MS: u64 = 1000;

/// Retry a database operation up to `max_attempts` times.
///
/// **Backoff Strategy:**
/// - Initial delay: 10ms
/// - Max delay: 1000ms
/// - Multiplier: 2.0 (exponential)
///
/// # Arguments
/// * `operation_name` - Name for logging (e.g., "event upsert")
/// * `max_attempts` - Total attempts including the first (values below 1 act as 1)
/// * `operation` - Async closure that performs the database operation
///
/// # Returns
/// Result from the operation, or the last error once attempts are exhausted
pub async fn retry_transient<F, Fut, T>(
    operation_name: &str,
    max_attempts: u32,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let start_time = Instant::now();
    let mut attempt = 0u32;
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(operation = operation_name, attempt, "Retrying database operation");
        }

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Database operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_transient() {
                    return Err(err);
                }

                if attempt >= max_attempts {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        error = %err,
                        "Database operation failed: retries exhausted"
                    );
                    return Err(err);
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms,
                    error = %err,
                    "Transient database error, will retry after backoff"
                );

                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logitrack_common::Error;

    fn transient() -> Error {
        Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk busy"))
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_attempt() {
        let result = retry_transient("test_op", 3, || async { Ok::<i32, Error>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_errors() {
        let mut attempts = 0;

        let result = retry_transient("test_op", 3, || {
            attempts += 1;
            let current = attempts;
            async move {
                if current < 3 {
                    Err(transient())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let mut attempts = 0;

        let result = retry_transient("test_op", 2, || {
            attempts += 1;
            async { Err::<i32, Error>(transient()) }
        })
        .await;

        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_non_transient_error_fails_immediately() {
        let mut attempts = 0;

        let result = retry_transient("test_op", 5, || {
            attempts += 1;
            async { Err::<i32, Error>(Error::Internal("other error".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }
}
