//! Upper bounds for database round trips.

use std::{future::Future, time::Duration};
use tokio::time::timeout;

use super::{StoreError, StoreResult};

/// Default timeout for single-row queries (5 seconds)
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for scans such as key listing (30 seconds)
pub const LONG_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Run a query, failing with [`StoreError::Timeout`] after `duration`.
///
/// # Errors
///
/// Driver errors are passed through as [`StoreError::Database`].
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> StoreResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match timeout(duration, future).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(StoreError::Database(e)),
        Err(_) => Err(StoreError::Timeout(duration)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_slow_query_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, sqlx::Error>(1)
        };
        let result = with_timeout(DEFAULT_QUERY_TIMEOUT, slow).await;
        assert!(matches!(result, Err(StoreError::Timeout(d)) if d == DEFAULT_QUERY_TIMEOUT));
    }

    #[tokio::test]
    async fn test_driver_error_is_passed_through() {
        let failing = async { Err::<(), _>(sqlx::Error::RowNotFound) };
        let result = with_timeout(DEFAULT_QUERY_TIMEOUT, failing).await;
        assert!(matches!(result, Err(StoreError::Database(_))));
    }
}
