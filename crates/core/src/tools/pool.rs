//! Bounded worker pool for per-tool work
//!
//! Each job writes into its own index-addressed slot, so the returned results
//! follow input order no matter which job finishes first.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::types::{PinionError, PinionResult};

/// Concurrency settings for resolution and installs
#[derive(Debug, Clone, Default)]
pub struct PoolConfig {
    /// Upper bound on concurrent jobs; defaults to the available parallelism
    pub max_parallel: Option<usize>,
}

impl PoolConfig {
    /// Effective worker count for `jobs` units of work, never zero
    pub fn workers_for(&self, jobs: usize) -> usize {
        let limit = self.max_parallel.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        limit.min(jobs).max(1)
    }
}

/// Run `job` over `items` with at most `workers` in flight.
///
/// Every job runs to completion. If any failed, the error of the lowest
/// index is returned, which keeps failure reporting deterministic.
pub async fn run_bounded<I, T, F, Fut>(items: Vec<I>, workers: usize, job: F) -> PinionResult<Vec<T>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = PinionResult<T>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut join_set = JoinSet::new();
    let mut slots: Vec<Option<PinionResult<T>>> = Vec::with_capacity(items.len());

    for (index, item) in items.into_iter().enumerate() {
        slots.push(None);
        let semaphore = Arc::clone(&semaphore);
        let future = job(item);
        join_set.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => future.await,
                Err(e) => Err(PinionError::Toolchain(format!("worker pool closed: {}", e))),
            };
            (index, result)
        });
    }

    while let Some(joined) = join_set.join_next().await {
        let (index, result) = joined
            .map_err(|e| PinionError::Toolchain(format!("worker task failed: {}", e)))?;
        slots[index] = Some(result);
    }

    let mut results = Vec::with_capacity(slots.len());
    for slot in slots {
        match slot {
            Some(result) => results.push(result?),
            None => {
                return Err(PinionError::Toolchain(
                    "worker task finished without a result".to_string(),
                ))
            }
        }
    }
    Ok(results)
}
