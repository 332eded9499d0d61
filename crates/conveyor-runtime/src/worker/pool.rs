use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use conveyor_core::{ConveyorError, Context, Result};

use super::options::WorkerOptions;
use super::runner::{Worker, WorkerStats};
use crate::queue::Queue;

/// Named set of workers.
#[derive(Debug, Default)]
pub struct WorkerPool {
    workers: RwLock<HashMap<String, Arc<Worker>>>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create, register and start a worker under `id`.
    pub fn start_worker(
        &self,
        ctx: &Context,
        id: &str,
        queue: Arc<dyn Queue>,
        options: WorkerOptions,
    ) -> Result<Arc<Worker>> {
        let mut workers = self.workers.write().unwrap_or_else(PoisonError::into_inner);
        if workers.contains_key(id) {
            return Err(ConveyorError::DuplicateWorkerId(id.to_string()));
        }

        let worker = Arc::new(Worker::new(id));
        worker.start(ctx, queue, options)?;
        workers.insert(id.to_string(), worker.clone());

        tracing::debug!(worker_id = %id, "Worker registered");
        Ok(worker)
    }

    /// Stop and deregister one worker.
    pub async fn stop_worker(&self, ctx: &Context, id: &str) -> Result<()> {
        let worker = self
            .workers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .ok_or_else(|| ConveyorError::WorkerNotFound(id.to_string()))?;

        worker.stop(ctx).await
    }

    /// Stop every worker, deregistering them first.
    ///
    /// Every worker is signalled even when `ctx` runs out partway through; a
    /// single error is returned as is, several as [`ConveyorError::Multiple`].
    pub async fn stop_all(&self, ctx: &Context) -> Result<()> {
        let workers: Vec<Arc<Worker>> = self
            .workers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, worker)| worker)
            .collect();

        let mut errors = Vec::new();
        for worker in workers {
            if let Err(e) = worker.stop(ctx).await {
                tracing::warn!(worker_id = %worker.id(), error = %e, "Failed to stop worker");
                errors.push(e);
            }
        }
        ConveyorError::collect(errors)
    }

    /// Stats of every registered worker, keyed by ID.
    pub fn get_stats(&self) -> HashMap<String, WorkerStats> {
        self.workers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, worker)| (id.clone(), worker.stats()))
            .collect()
    }

    pub fn worker(&self, id: &str) -> Option<Arc<Worker>> {
        self.workers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Registered IDs, sorted.
    pub fn worker_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .workers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.workers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use crate::worker::WorkerState;
    use conveyor_core::testing::{wait_until, ExecutionLog, RecordingJob, SlowJob, DEFAULT_WAIT_TIMEOUT};
    use std::time::Duration;

    fn options() -> WorkerOptions {
        WorkerOptions {
            sleep: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_start_and_stop_worker() {
        let ctx = Context::background();
        let pool = WorkerPool::new();
        let queue = Arc::new(MemoryQueue::new());

        let worker = pool.start_worker(&ctx, "w1", queue, options()).unwrap();
        assert!(worker.is_running());
        assert_eq!(pool.len(), 1);
        assert!(pool.worker("w1").is_some());

        pool.stop_worker(&ctx, "w1").await.unwrap();
        assert!(pool.is_empty());
        assert_eq!(worker.state(), WorkerState::Stopped);
    }

    #[tokio::test]
    async fn test_duplicate_worker_id() {
        let ctx = Context::background();
        let pool = WorkerPool::new();
        let queue = Arc::new(MemoryQueue::new());

        pool.start_worker(&ctx, "w1", queue.clone(), options()).unwrap();
        let err = pool.start_worker(&ctx, "w1", queue, options()).unwrap_err();
        assert!(matches!(err, ConveyorError::DuplicateWorkerId(ref id) if id == "w1"));
        assert_eq!(pool.len(), 1);

        pool.stop_all(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_unknown_worker() {
        let pool = WorkerPool::new();
        let err = pool.stop_worker(&Context::background(), "ghost").await.unwrap_err();
        assert!(matches!(err, ConveyorError::WorkerNotFound(ref id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_failed_start_is_not_registered() {
        let ctx = Context::background();
        ctx.cancel();
        let pool = WorkerPool::new();
        assert!(pool
            .start_worker(&ctx, "w1", Arc::new(MemoryQueue::new()), options())
            .is_err());
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_stop_all_twice() {
        let ctx = Context::background();
        let pool = WorkerPool::new();
        let queue = Arc::new(MemoryQueue::new());
        let workers: Vec<Arc<Worker>> = ["a", "b", "c"]
            .into_iter()
            .map(|id| pool.start_worker(&ctx, id, queue.clone(), options()).unwrap())
            .collect();
        assert_eq!(pool.worker_ids(), vec!["a", "b", "c"]);

        pool.stop_all(&ctx).await.unwrap();
        assert!(pool.is_empty());
        assert!(workers.iter().all(|w| !w.is_running()));
        pool.stop_all(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_all_collects_errors() {
        let ctx = Context::background();
        let pool = WorkerPool::new();
        let queue = Arc::new(MemoryQueue::new());
        queue.push(&ctx, Arc::new(SlowJob::stubborn(Duration::from_millis(300)))).unwrap();
        queue.push(&ctx, Arc::new(SlowJob::stubborn(Duration::from_millis(300)))).unwrap();

        let a = pool.start_worker(&ctx, "a", queue.clone(), options()).unwrap();
        let b = pool.start_worker(&ctx, "b", queue.clone(), options()).unwrap();
        assert!(
            wait_until(DEFAULT_WAIT_TIMEOUT, || {
                a.stats().current_job.is_some() && b.stats().current_job.is_some()
            })
            .await
        );

        let deadline = ctx.with_timeout(Duration::from_millis(20));
        let err = pool.stop_all(&deadline).await.unwrap_err();
        match err {
            ConveyorError::Multiple(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected Multiple, got {:?}", other),
        }
        assert!(pool.is_empty());
        assert!(!a.is_running());
        assert!(!b.is_running());

        // Both loops were signalled even though the deadline ran out on the first.
        assert!(
            wait_until(DEFAULT_WAIT_TIMEOUT, || {
                a.state() == WorkerState::Stopped && b.state() == WorkerState::Stopped
            })
            .await
        );
        let log = ExecutionLog::new();
        queue.push(&ctx, Arc::new(RecordingJob::new("after-stop-all", &log))).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_stop_worker_with_cancelled_context() {
        let ctx = Context::background();
        let pool = WorkerPool::new();
        let worker = pool
            .start_worker(&ctx, "w1", Arc::new(MemoryQueue::new()), options())
            .unwrap();

        let cancelled = Context::background();
        cancelled.cancel();
        let err = pool.stop_worker(&cancelled, "w1").await.unwrap_err();
        assert!(matches!(err, ConveyorError::OperationCancelled));
        assert!(pool.is_empty());
        assert!(!worker.is_running());
        assert!(wait_until(DEFAULT_WAIT_TIMEOUT, || worker.state() == WorkerState::Stopped).await);
    }

    #[tokio::test]
    async fn test_get_stats() {
        let ctx = Context::background();
        let pool = WorkerPool::new();
        let queue = Arc::new(MemoryQueue::new());
        let log = ExecutionLog::new();
        queue.push(&ctx, Arc::new(RecordingJob::new("one", &log))).unwrap();

        let worker = pool.start_worker(&ctx, "w1", queue, options()).unwrap();
        assert!(wait_until(DEFAULT_WAIT_TIMEOUT, || worker.stats().processed_jobs == 1).await);

        let stats = pool.get_stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats["w1"].processed_jobs, 1);
        assert_eq!(stats["w1"].state, WorkerState::Running);

        pool.stop_all(&ctx).await.unwrap();
    }
}
