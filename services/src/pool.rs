//! Bounded worker pool on top of the Tokio runtime.
//!
//! - Admission via `tokio::Semaphore` (one permit per running job).
//! - Async I/O jobs run on `tokio::spawn`, CPU-bound jobs on `spawn_blocking`.
//! - Dropping the future returned by [`WorkerPool::run`] aborts the spawned task,
//!   so a cancelled caller does not leave orphaned work behind.

use std::{future::Future, sync::Arc};

use thiserror::Error;
use tokio::{
    sync::Semaphore,
    task::{self, JoinError, JoinHandle},
};
use tracing::trace;

/// Errors produced by [`WorkerPool`].
#[derive(Debug, Error)]
pub enum PoolError {
    /// The semaphore was closed; no more work is accepted.
    #[error("[Services] worker pool is closed")]
    Closed,

    /// The spawned task panicked or was aborted.
    #[error("[Services] worker task failed: {0}")]
    Join(#[from] JoinError),
}

/// Shared handle to a fixed-size pool. Cheap to clone.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    sem: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Creates a pool admitting at most `size` concurrent jobs (minimum 1).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            sem: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of currently free slots.
    pub fn available(&self) -> usize {
        self.sem.available_permits()
    }

    /// Runs an async job once a slot is free and waits for its output.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, PoolError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .sem
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        trace!(free = self.sem.available_permits(), "pool job admitted");

        let handle = task::spawn(async move {
            let out = fut.await;
            drop(permit);
            out
        });
        AbortOnDrop(handle).join().await
    }

    /// Runs a blocking closure on the blocking thread pool once a slot is free.
    ///
    /// A blocking job that already started cannot be interrupted; dropping the
    /// caller only discards its result.
    pub async fn run_blocking<F, T>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .sem
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        let handle = task::spawn_blocking(move || {
            let out = f();
            drop(permit);
            out
        });
        AbortOnDrop(handle).join().await
    }
}

/// Join handle that aborts its task when dropped before completion.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> AbortOnDrop<T> {
    async fn join(mut self) -> Result<T, PoolError> {
        (&mut self.0).await.map_err(PoolError::from)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
        time::Duration,
    };

    #[tokio::test]
    async fn concurrency_never_exceeds_pool_size() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                pool.run(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            }));
        }
        for h in handles {
            assert!(h.await.unwrap().is_ok());
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn dropping_caller_aborts_job() {
        let pool = WorkerPool::new(1);
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let res = tokio::time::timeout(
            Duration::from_millis(20),
            pool.run(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                flag.store(true, Ordering::SeqCst);
            }),
        )
        .await;
        assert!(res.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!finished.load(Ordering::SeqCst));
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn blocking_jobs_return_values() {
        let pool = WorkerPool::new(1);
        let v = pool.run_blocking(|| 40 + 2).await.unwrap();
        assert_eq!(v, 42);
    }
}
