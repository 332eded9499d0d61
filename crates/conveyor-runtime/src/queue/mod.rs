//! Priority and delay ordered job queues.

mod memory;

pub use memory::MemoryQueue;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use conveyor_core::{Context, Job, JobPayload, QueueJob, Result};
use serde::Serialize;

/// Outcome of a processed job, reported back to its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { latency: Duration },
    Failed,
}

/// Point-in-time statistics for one named queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Jobs currently stored, visible or delayed.
    pub size: usize,
    /// Jobs popped and not yet reported.
    pub processing: u64,
    /// Jobs reported as completed.
    pub processed: u64,
    /// Jobs reported as failed.
    pub failed: u64,
    /// Jobs ever pushed (releases included).
    pub total_pushed: u64,
    /// When a job was last reported.
    pub last_job_at: Option<DateTime<Utc>>,
    /// Running mean of completed job latency.
    pub average_latency: Duration,
}

/// Statistics every queue implementation keeps.
pub trait StatsReporting: Send + Sync {
    /// Snapshot of the named queue's statistics.
    fn stats(&self, queue: &str) -> Result<QueueStats>;

    /// Record the outcome of a job popped from `queue`.
    fn report(&self, queue: &str, outcome: JobOutcome);
}

/// A buffer of jobs, safe for concurrent producers and consumers.
///
/// Every operation takes a [`Context`] and fails with `OperationCancelled`
/// when it is already done. Queue names resolve as: explicit argument, then
/// the job's own queue, then [`Queue::default_queue`].
pub trait Queue: StatsReporting {
    /// Queue used when neither caller nor job picks one.
    fn default_queue(&self) -> &str;

    /// Insert `job` on `queue`, visible after `delay`. Returns the job ID.
    fn later_on(&self, ctx: &Context, queue: &str, delay: Duration, job: Arc<dyn Job>) -> Result<String>;

    /// Remove and return the highest priority job that is visible now.
    fn pop(&self, ctx: &Context, queue: &str) -> Result<QueueJob>;

    /// Like `pop` without removing the job.
    fn peek(&self, ctx: &Context, queue: &str) -> Result<JobPayload>;

    /// Number of stored jobs, delayed ones included.
    fn size(&self, ctx: &Context, queue: &str) -> Result<usize>;

    /// Drop every job on `queue`; other queues are untouched.
    fn clear(&self, ctx: &Context, queue: &str) -> Result<()>;

    /// Put a popped job back, visible after `delay`, keeping its identity and attempts.
    fn release(&self, ctx: &Context, job: &QueueJob, delay: Duration) -> Result<()>;

    /// Discard all jobs and statistics and refuse further work.
    fn close(&self, ctx: &Context) -> Result<()>;

    fn is_closed(&self) -> bool;

    /// Push using the job's own queue and delay.
    fn push(&self, ctx: &Context, job: Arc<dyn Job>) -> Result<String> {
        let queue = self.resolve_queue(job.as_ref());
        let delay = job.delay();
        self.later_on(ctx, &queue, delay, job)
    }

    /// Push onto an explicit queue using the job's own delay.
    fn push_on(&self, ctx: &Context, queue: &str, job: Arc<dyn Job>) -> Result<String> {
        let delay = job.delay();
        self.later_on(ctx, queue, delay, job)
    }

    /// Push with an explicit delay on the job's own queue.
    fn later(&self, ctx: &Context, delay: Duration, job: Arc<dyn Job>) -> Result<String> {
        let queue = self.resolve_queue(job.as_ref());
        self.later_on(ctx, &queue, delay, job)
    }

    /// The queue a job lands on when none is given.
    fn resolve_queue(&self, job: &dyn Job) -> String {
        job.queue()
            .unwrap_or_else(|| self.default_queue().to_string())
    }
}
