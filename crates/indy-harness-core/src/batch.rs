//! Bounded worker pool for homogeneous transfer jobs.
//!
//! # Design
//! - One worker runs items in order and, by default, stops at the first
//!   failed item.
//! - Several workers drain a shared bounded queue and, by default, attempt
//!   every item so a batch run reports complete diagnostics.
//! - A job returning `Err` is fatal: dispatching stops, queued items drain,
//!   every worker is joined, and the first error is returned.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::error::{HarnessError, HarnessResult};

const QUEUE_FACTOR: usize = 5;

/// Worker count and failure policy of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    /// Number of concurrent workers; values below one run sequentially.
    pub workers: usize,
    /// Stop dispatching after the first failed item.
    pub fail_fast: bool,
}

impl BatchPolicy {
    /// Sequential runs fail fast; concurrent runs complete every item.
    #[must_use]
    pub const fn for_workers(workers: usize) -> Self {
        Self {
            workers,
            fail_fast: workers <= 1,
        }
    }

    /// Override the failure policy.
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    const fn is_concurrent(&self) -> bool {
        self.workers > 1
    }
}

/// Aggregate result of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchOutcome {
    /// Items whose job was invoked.
    pub attempted: usize,
    /// Items whose job reported failure.
    pub failed: usize,
}

impl BatchOutcome {
    /// `true` when no attempted item failed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Convert a failed outcome into [`HarnessError::BatchFailed`].
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::BatchFailed`] when any item failed.
    pub const fn require_success(self, batch: &'static str) -> HarnessResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(HarnessError::BatchFailed {
                batch,
                failed: self.failed,
                attempted: self.attempted,
            })
        }
    }
}

/// Run `job` over `items` according to `policy`.
///
/// # Errors
///
/// Returns the first error produced by a job.
pub async fn run_batch<T, F, Fut>(
    policy: BatchPolicy,
    items: Vec<T>,
    job: F,
) -> HarnessResult<BatchOutcome>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HarnessResult<bool>> + Send + 'static,
{
    if policy.is_concurrent() {
        run_concurrent(policy, items, job).await
    } else {
        run_sequential(policy, items, job).await
    }
}

async fn run_sequential<T, F, Fut>(
    policy: BatchPolicy,
    items: Vec<T>,
    job: F,
) -> HarnessResult<BatchOutcome>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = HarnessResult<bool>>,
{
    let mut outcome = BatchOutcome::default();
    for item in items {
        outcome.attempted += 1;
        if !job(item).await? {
            outcome.failed += 1;
            if policy.fail_fast {
                debug!(attempted = outcome.attempted, "sequential batch stopped at first failure");
                break;
            }
        }
    }
    Ok(outcome)
}

async fn run_concurrent<T, F, Fut>(
    policy: BatchPolicy,
    items: Vec<T>,
    job: F,
) -> HarnessResult<BatchOutcome>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HarnessResult<bool>> + Send + 'static,
{
    let (sender, receiver) = mpsc::channel::<T>(policy.workers.saturating_mul(QUEUE_FACTOR));
    let receiver = Arc::new(Mutex::new(receiver));
    let results = Arc::new(Mutex::new(Vec::<bool>::with_capacity(items.len())));
    let first_error = Arc::new(Mutex::new(None::<HarnessError>));
    let stop = Arc::new(AtomicBool::new(false));
    let job = Arc::new(job);

    let mut workers = Vec::with_capacity(policy.workers);
    for _ in 0..policy.workers {
        let receiver = Arc::clone(&receiver);
        let results = Arc::clone(&results);
        let first_error = Arc::clone(&first_error);
        let stop = Arc::clone(&stop);
        let job = Arc::clone(&job);
        let fail_fast = policy.fail_fast;
        workers.push(tokio::spawn(async move {
            loop {
                let next = receiver.lock().await.recv().await;
                let Some(item) = next else {
                    break;
                };
                match job(item).await {
                    Ok(ok) => {
                        results.lock().await.push(ok);
                        if !ok && fail_fast {
                            stop.store(true, Ordering::SeqCst);
                        }
                    }
                    Err(err) => {
                        results.lock().await.push(false);
                        stop.store(true, Ordering::SeqCst);
                        first_error.lock().await.get_or_insert(err);
                    }
                }
            }
        }));
    }

    for item in items {
        if stop.load(Ordering::SeqCst) {
            debug!("batch dispatch stopped");
            break;
        }
        if sender.send(item).await.is_err() {
            break;
        }
    }
    drop(sender);

    for worker in workers {
        if let Err(err) = worker.await {
            warn!(error = %err, "batch worker terminated abnormally");
        }
    }

    if let Some(err) = first_error.lock().await.take() {
        return Err(err);
    }
    let results = results.lock().await;
    Ok(BatchOutcome {
        attempted: results.len(),
        failed: results.iter().filter(|ok| !**ok).count(),
    })
}
