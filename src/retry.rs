//! Bounded retry for optimistic-concurrency conflicts.
//!
//! Every state mutation touching bookings or inventory goes through
//! [`with_txn_retry`]. Only conflict-class store errors are retried;
//! anything else propagates immediately.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::store::StoreError;

/// Maximum retries after the initial attempt.
pub const MAX_TXN_RETRIES: u32 = 5;

/// Initial backoff; doubles on each retry (50, 100, 200, 400, 800ms).
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(50);

/// Retry a transactional operation on conflict with exponential backoff.
///
/// The operation runs once plus up to `MAX_TXN_RETRIES` retries. Non-conflict
/// errors propagate on the first occurrence. Once the budget is spent the
/// caller gets [`StoreError::RetriesExhausted`] wrapping the last conflict,
/// with `attempts` counting total executions, so logs can distinguish "gave
/// up" from the underlying cause.
pub async fn with_txn_retry<F, Fut, T>(operation: F, context: &str) -> Result<T, StoreError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut backoff = INITIAL_BACKOFF;

    for attempt in 0..=MAX_TXN_RETRIES {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::debug!(context, attempt, "transaction succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_conflict() => {
                if attempt == MAX_TXN_RETRIES {
                    tracing::warn!(
                        context,
                        attempts = attempt + 1,
                        error = %e,
                        "transaction conflict, retries exhausted"
                    );
                    return Err(StoreError::RetriesExhausted {
                        attempts: attempt + 1,
                        source: Box::new(e),
                    });
                }

                tracing::debug!(
                    context,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "transaction conflict, retrying"
                );
                sleep(backoff).await;
                backoff *= 2;
            }
            Err(e) => return Err(e),
        }
    }

    unreachable!("retry loop returns within the attempt bound")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn succeeds_first_attempt() {
        let result = with_txn_retry(|| async { Ok::<_, StoreError>(42) }, "test").await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_conflicts_then_succeeds() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result = with_txn_retry(
            || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(StoreError::Conflict("contended row".into()))
                    } else {
                        Ok(7)
                    }
                }
            },
            "test",
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_conflict_errors_propagate_without_retry() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<(), _> = with_txn_retry(
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(StoreError::Backend("boom".into()))
                }
            },
            "test",
        )
        .await;

        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_runs_initial_attempt_plus_all_retries() {
        let executions = Arc::new(AtomicU32::new(0));
        let counter = executions.clone();
        let started = tokio::time::Instant::now();

        let result: Result<(), _> = with_txn_retry(
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(StoreError::Conflict("hot event".into()))
                }
            },
            "test",
        )
        .await;

        match result {
            Err(StoreError::RetriesExhausted { attempts, .. }) => {
                assert_eq!(attempts, MAX_TXN_RETRIES + 1)
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(executions.load(Ordering::SeqCst), MAX_TXN_RETRIES + 1);
        // Full backoff schedule: 50 + 100 + 200 + 400 + 800ms.
        assert!(started.elapsed() >= Duration::from_millis(1550));
    }
}
