use crate::error::Error;
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use std::future::Future;
use std::time::Duration;

/// Retries `op` with exponential backoff while it returns a transient
/// error, giving up after `max_elapsed`. Permanent errors (already-alive,
/// not-found, unauthorized, circuit-open) are returned immediately.
pub async fn with_retry<T, F, Fut>(max_elapsed: Duration, op: F) -> Result<T, Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(200))
        .with_max_interval(Duration::from_secs(10))
        .with_max_elapsed_time(Some(max_elapsed))
        .build();

    retry(backoff, || async {
        op().await.map_err(|e| {
            if e.is_transient() {
                backoff::Error::transient(e)
            } else {
                backoff::Error::permanent(e)
            }
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_until_success() {
        let attempts = AtomicU32::new(0);
        let result = with_retry(Duration::from_secs(5), || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(Error::Transient("not yet".into()))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), Error> = with_retry(Duration::from_secs(5), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::AlreadyAlive("t1".into()))
        })
        .await;
        assert!(matches!(result, Err(Error::AlreadyAlive(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
