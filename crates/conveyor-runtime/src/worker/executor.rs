use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use conveyor_core::{ConveyorError, Context, Job, QueueJob, RetryPolicy, StatefulJob};
use futures::FutureExt;

use super::options::WorkerOptions;
use crate::middleware::{Middleware, Next};
use crate::queue::{JobOutcome, Queue, StatsReporting};

/// Executes popped jobs with timeout, panic isolation and retry bookkeeping.
pub struct JobExecutor {
    queue: Arc<dyn Queue>,
    middleware: Vec<Arc<dyn Middleware>>,
    default_timeout: Duration,
    retry_policy: Option<Arc<dyn RetryPolicy>>,
    release_on_retry: bool,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(queue: Arc<dyn Queue>, options: &WorkerOptions) -> Self {
        Self {
            queue,
            middleware: options.middleware.clone(),
            default_timeout: options.timeout,
            retry_policy: options.retry_policy.clone(),
            release_on_retry: options.release_on_retry,
        }
    }

    /// Run a popped job to completion or failure.
    ///
    /// Handler errors and panics never escape: they are recorded on the job,
    /// passed to [`Job::failed`] and reported to the queue.
    pub async fn execute(&self, job: &QueueJob) -> ExecutionResult {
        job.mark_as_started();

        let timeout = job.timeout().unwrap_or(self.default_timeout);
        let ctx = Context::background().with_timeout(timeout);
        let started = Instant::now();

        match self.run(job, &ctx, timeout).await {
            Ok(()) => {
                let latency = started.elapsed();
                job.mark_as_completed();
                self.queue
                    .report(job.queue_name(), JobOutcome::Completed { latency });
                ExecutionResult::Completed { latency }
            }
            Err(error) => {
                let retrying = self.fail(job, &error, timeout).await;
                ExecutionResult::Failed { error, retrying }
            }
        }
    }

    /// Run the middleware chain and handler, racing the job's deadline.
    async fn run(&self, job: &QueueJob, ctx: &Context, timeout: Duration) -> conveyor_core::Result<()> {
        // The chain is entered inside the guarded future so panics raised
        // before the handler's first await are caught too.
        let guarded = AssertUnwindSafe(async { Next::new(&self.middleware).run(job, ctx).await })
            .catch_unwind();

        tokio::select! {
            biased;
            outcome = guarded => match outcome {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) if ctx.is_expired() => Err(ConveyorError::JobTimeout(timeout)),
                Ok(Err(e @ (ConveyorError::JobHandlerFailure(_) | ConveyorError::JobTimeout(_)))) => Err(e),
                Ok(Err(e)) => Err(ConveyorError::handler(e)),
                Err(panic) => Err(ConveyorError::JobHandlerFailure(format!(
                    "panicked: {}",
                    panic_message(panic.as_ref())
                ))),
            },
            _ = ctx.done() => {
                ctx.cancel();
                Err(ConveyorError::JobTimeout(timeout))
            }
        }
    }

    /// Failure bookkeeping. Returns whether the job is retrying.
    async fn fail(&self, job: &QueueJob, error: &ConveyorError, timeout: Duration) -> bool {
        let attempts = job.attempts().saturating_add(1);
        let policy = self
            .retry_policy
            .as_ref()
            .filter(|policy| policy.should_retry(attempts, job.max_tries(), error));

        if policy.is_some() {
            job.mark_as_retrying();
        } else {
            job.mark_as_failed(error);
        }

        let failed_ctx = Context::background().with_timeout(timeout);
        match AssertUnwindSafe(async { job.failed(&failed_ctx, error).await })
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(
                job_id = %job.id(),
                error = %e,
                "Job failure callback returned an error"
            ),
            Err(panic) => tracing::error!(
                job_id = %job.id(),
                panic = %panic_message(panic.as_ref()),
                "Job failure callback panicked"
            ),
        }

        self.queue.report(job.queue_name(), JobOutcome::Failed);

        if let Some(policy) = policy {
            if self.release_on_retry {
                let delay = policy.delay(job.attempts());
                if let Err(e) = self.queue.release(&Context::background(), job, delay) {
                    tracing::error!(job_id = %job.id(), error = %e, "Failed to release job for retry");
                }
            }
        }

        policy.is_some()
    }
}

/// Result of job execution.
#[derive(Debug)]
pub enum ExecutionResult {
    /// Job completed successfully.
    Completed { latency: Duration },
    /// Job failed; `retrying` if the retry policy asked for another attempt.
    Failed { error: ConveyorError, retrying: bool },
}

impl ExecutionResult {
    /// Check if execution was successful.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Check if the job should be retried.
    pub fn should_retry(&self) -> bool {
        matches!(self, Self::Failed { retrying: true, .. })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
