//! Memoized pipeline stages.
//!
//! A stage is spawned eagerly on the runtime and exposed as a shared future:
//! every consumer awaits the same task, so the work runs exactly once per
//! request. [`StageTasks`] owns the abort handles of one request and aborts
//! whatever is still running when it is dropped.

use std::future::Future;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::AbortHandle;
use tracing::{debug, error};

pub type Stage<T> = Shared<BoxFuture<'static, T>>;

#[derive(Default)]
pub struct StageTasks {
    handles: Vec<AbortHandle>,
}

impl StageTasks {
    /// Starts `fut` now. A panicked or aborted task resolves to `T::default()`.
    pub fn spawn<T, F>(&mut self, name: &'static str, fut: F) -> Stage<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Clone + Default + Send + Sync + 'static,
    {
        let handle = tokio::spawn(fut);
        self.handles.push(handle.abort_handle());
        async move {
            match handle.await {
                Ok(v) => v,
                Err(e) if e.is_cancelled() => {
                    debug!(stage = name, "stage cancelled");
                    T::default()
                }
                Err(e) => {
                    error!(stage = name, error = %e, "stage task failed");
                    T::default()
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Already-known value, no task.
    pub fn ready<T>(value: T) -> Stage<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        futures::future::ready(value).boxed().shared()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Drop for StageTasks {
    fn drop(&mut self) {
        for h in &self.handles {
            h.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use super::*;

    #[tokio::test]
    async fn shared_stage_runs_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut tasks = StageTasks::default();
        let counter = runs.clone();
        let stage = tasks.spawn("count", async move {
            counter.fetch_add(1, Ordering::SeqCst);
            7usize
        });

        let (a, b) = tokio::join!(stage.clone(), stage.clone());
        assert_eq!((a, b), (7, 7));
        assert_eq!(stage.await, 7);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(tasks.len(), 1);
    }

    #[tokio::test]
    async fn panicking_stage_yields_default() {
        let mut tasks = StageTasks::default();
        let stage: Stage<String> = tasks.spawn("boom", async { panic!("boom") });
        assert_eq!(stage.await, "");
    }

    #[tokio::test]
    async fn dropping_tasks_aborts_pending_work() {
        let finished = Arc::new(AtomicUsize::new(0));
        let flag = finished.clone();
        let mut tasks = StageTasks::default();
        let stage = tasks.spawn("slow", async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            flag.fetch_add(1, Ordering::SeqCst);
            1u8
        });
        drop(tasks);
        assert_eq!(stage.await, 0);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert_eq!(StageTasks::ready(3u8).await, 3);
    }
}
