use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Ceiling on remote calls in flight within a single batch
pub const MAX_IN_FLIGHT: usize = 5;

/// A single independent remote operation
pub type Operation<E> = BoxFuture<'static, Result<(), E>>;

#[derive(Debug, thiserror::Error)]
pub enum BatchError<E> {
    #[error(transparent)]
    Operation(E),
    #[error("operation cancelled")]
    Cancelled,
    #[error("operation task failed: {0}")]
    Join(#[from] JoinError),
}

/// Runs batches of independent operations with bounded parallelism.
///
/// A failure never cancels its siblings: every dispatched operation runs
///  to completion, and the first failure observed is reported for the
///  batch. Nothing already applied is rolled back.
///
/// Cancelling the token resolves pending and in-flight operations to
///  `BatchError::Cancelled`, which is aggregated like any other failure.
#[derive(Debug, Clone)]
pub struct BoundedExecutor {
    limit: usize,
    cancel: CancellationToken,
}

impl BoundedExecutor {
    pub fn new(limit: usize, cancel: CancellationToken) -> Self {
        Self {
            limit: limit.max(1),
            cancel,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run every operation and wait for all of them.
    ///
    /// Returns the number of operations run if all succeeded.
    pub async fn run<E>(&self, operations: Vec<Operation<E>>) -> Result<usize, BatchError<E>>
    where
        E: Send + 'static,
    {
        let total = operations.len();
        if total == 0 {
            return Ok(0);
        }

        let semaphore = Arc::new(Semaphore::new(self.limit));
        let mut tasks = JoinSet::new();

        for operation in operations {
            let semaphore = Arc::clone(&semaphore);
            let cancel = self.cancel.clone();
            let span = tracing::Span::current();

            tasks.spawn(
                async move {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(BatchError::Cancelled),
                        result = async {
                            let Ok(_permit) = semaphore.acquire_owned().await else {
                                return Err(BatchError::Cancelled);
                            };
                            operation.await.map_err(BatchError::Operation)
                        } => result,
                    }
                }
                .instrument(span),
            );
        }

        let mut first_error = None;
        let mut failed = 0usize;

        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(BatchError::from).and_then(|r| r);
            if let Err(e) = result {
                failed += 1;
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => {
                tracing::warn!(total, failed, "batch finished with failures");
                Err(e)
            }
            None => Ok(total),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Eq)]
    struct Failed(usize);

    fn counting_op(
        i: usize,
        in_flight: Arc<AtomicUsize>,
        high_water: Arc<AtomicUsize>,
        ran: Arc<AtomicUsize>,
        fail: bool,
    ) -> Operation<Failed> {
        Box::pin(async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            high_water.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            ran.fetch_add(1, Ordering::SeqCst);
            if fail {
                Err(Failed(i))
            } else {
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let executor = BoundedExecutor::new(MAX_IN_FLIGHT, CancellationToken::new());
        let result = executor.run::<Failed>(Vec::new()).await;
        assert_eq!(result.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_never_exceeds_limit() {
        let executor = BoundedExecutor::new(MAX_IN_FLIGHT, CancellationToken::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let high_water = Arc::new(AtomicUsize::new(0));
        let ran = Arc::new(AtomicUsize::new(0));

        let ops = (0..20)
            .map(|i| {
                counting_op(
                    i,
                    in_flight.clone(),
                    high_water.clone(),
                    ran.clone(),
                    false,
                )
            })
            .collect();

        let count = executor.run(ops).await.unwrap();
        assert_eq!(count, 20);
        assert_eq!(ran.load(Ordering::SeqCst), 20);
        assert!(high_water.load(Ordering::SeqCst) <= MAX_IN_FLIGHT);
        assert!(high_water.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_failure_does_not_cancel_siblings() {
        let executor = BoundedExecutor::new(MAX_IN_FLIGHT, CancellationToken::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let high_water = Arc::new(AtomicUsize::new(0));
        let ran = Arc::new(AtomicUsize::new(0));

        let ops = (0..12)
            .map(|i| {
                counting_op(
                    i,
                    in_flight.clone(),
                    high_water.clone(),
                    ran.clone(),
                    i == 3,
                )
            })
            .collect();

        let err = executor.run(ops).await.unwrap_err();
        assert!(matches!(err, BatchError::Operation(Failed(3))));
        assert_eq!(ran.load(Ordering::SeqCst), 12);
    }

    #[tokio::test]
    async fn test_reports_one_of_many_failures() {
        let executor = BoundedExecutor::new(2, CancellationToken::new());
        let ops: Vec<Operation<Failed>> = (0..6)
            .map(|i| Box::pin(async move { Err::<(), _>(Failed(i)) }) as Operation<Failed>)
            .collect();

        match executor.run(ops).await {
            Err(BatchError::Operation(Failed(i))) => assert!(i < 6),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_panicking_operation_fails_batch() {
        let executor = BoundedExecutor::new(MAX_IN_FLIGHT, CancellationToken::new());
        let ops = vec![
            Box::pin(async { Ok::<(), Failed>(()) }) as Operation<Failed>,
            Box::pin(async {
                if true {
                    panic!("boom");
                }
                Ok::<(), Failed>(())
            }) as Operation<Failed>,
        ];

        assert!(matches!(executor.run(ops).await, Err(BatchError::Join(_))));
    }

    #[tokio::test]
    async fn test_cancelled_token_fails_batch() {
        let cancel = CancellationToken::new();
        let executor = BoundedExecutor::new(MAX_IN_FLIGHT, cancel.clone());
        cancel.cancel();

        let ran = Arc::new(AtomicUsize::new(0));
        let ops = (0..3)
            .map(|_| {
                let ran = ran.clone();
                Box::pin(async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), Failed>(())
                }) as Operation<Failed>
            })
            .collect();

        assert!(matches!(executor.run(ops).await, Err(BatchError::Cancelled)));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_zero_limit_clamped() {
        let executor = BoundedExecutor::new(0, CancellationToken::new());
        assert_eq!(executor.limit(), 1);
    }
}
