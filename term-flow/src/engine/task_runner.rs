//! Execution of row-processing tasks.

use std::sync::Arc;
use tokio::sync::Semaphore;

use tracing::warn;

use crate::config::RunnerConfig;

/// Runs row tasks either one at a time or on a bounded pool of blocking threads.
///
/// In multi-threaded mode at most `size` tasks are in flight; submitting
/// waits for a free slot, which applies backpressure to the row producer.
/// Single-threaded tasks run inline, or with `offload` one after the other
/// on a blocking thread, so that a task may block without stalling the
/// runtime.
#[derive(Debug, Clone)]
pub(crate) enum TaskRunner {
    SingleThreaded { offload: bool },
    MultiThreaded { permits: Arc<Semaphore>, size: u32 },
}

impl TaskRunner {
    pub(crate) fn new(config: &RunnerConfig, offload: bool) -> Self {
        if config.single_threaded {
            return TaskRunner::SingleThreaded { offload };
        }
        let size = u32::try_from(config.concurrency.max(1)).unwrap_or(u32::MAX);
        TaskRunner::MultiThreaded {
            permits: Arc::new(Semaphore::new(size as usize)),
            size,
        }
    }

    pub(crate) async fn execute<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self {
            TaskRunner::SingleThreaded { offload: false } => task(),
            TaskRunner::SingleThreaded { offload: true } => {
                if let Err(e) = tokio::task::spawn_blocking(task).await {
                    warn!(error = %e, "Row task did not complete");
                }
            }
            TaskRunner::MultiThreaded { permits, .. } => {
                match Arc::clone(permits).acquire_owned().await {
                    Ok(permit) => {
                        tokio::task::spawn_blocking(move || {
                            task();
                            drop(permit);
                        });
                    }
                    // the semaphore is never closed
                    Err(_) => task(),
                }
            }
        }
    }

    /// Waits until every submitted task has finished.
    pub(crate) async fn drain(&self) {
        if let TaskRunner::MultiThreaded { permits, size } = self {
            if let Ok(all) = permits.acquire_many(*size).await {
                drop(all);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_drain_waits_for_in_flight_tasks() {
        let runner = TaskRunner::new(&RunnerConfig::default().with_concurrency(3), false);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let done = Arc::clone(&done);
            runner
                .execute(move || {
                    std::thread::sleep(Duration::from_millis(5));
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }
        runner.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_single_threaded_runs_inline() {
        let runner = TaskRunner::new(&RunnerConfig::default().with_single_threaded(true), false);
        let done = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&done);
        runner.execute(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_offloaded_tasks_run_in_order_before_returning() {
        let runner = TaskRunner::new(&RunnerConfig::single_threaded(), true);
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for i in 0..5 {
            let task_order = Arc::clone(&order);
            runner
                .execute(move || {
                    std::thread::sleep(Duration::from_millis(2));
                    task_order.lock().push(i);
                })
                .await;
            assert_eq!(order.lock().len(), i + 1);
        }
        runner.drain().await;
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }
}
