//! Job execution middleware.
//!
//! Middleware wraps job execution: each one receives the job and a [`Next`]
//! continuation and may run code before and after calling it. The first
//! middleware in a worker's list is the outermost wrapper.

use std::sync::Arc;
use std::time::Instant;

use conveyor_core::{BoxFuture, Context, Job, QueueJob, Result, StatefulJob};

/// A wrapper around job execution.
pub trait Middleware: Send + Sync {
    fn handle<'a>(&'a self, job: &'a QueueJob, ctx: &'a Context, next: Next<'a>) -> BoxFuture<'a, Result<()>>;
}

/// The rest of the middleware chain, ending with the job handler.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    /// Start of a chain.
    pub fn new(chain: &'a [Arc<dyn Middleware>]) -> Self {
        Self { chain }
    }

    /// Run the remaining middleware, then the job.
    pub fn run(self, job: &'a QueueJob, ctx: &'a Context) -> BoxFuture<'a, Result<()>> {
        match self.chain.split_first() {
            Some((first, rest)) => first.handle(job, ctx, Next { chain: rest }),
            None => job.handle(ctx),
        }
    }
}

/// Logs job start and completion with timing.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn handle<'a>(&'a self, job: &'a QueueJob, ctx: &'a Context, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let started = Instant::now();
            tracing::debug!(
                job_id = %job.id(),
                job = %job.display_name(),
                queue = %job.queue_name(),
                attempt = job.attempts() + 1,
                "Processing job"
            );

            let result = next.run(job, ctx).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match &result {
                Ok(()) => tracing::info!(
                    job_id = %job.id(),
                    job = %job.display_name(),
                    elapsed_ms,
                    "Job completed"
                ),
                Err(e) => tracing::warn!(
                    job_id = %job.id(),
                    job = %job.display_name(),
                    elapsed_ms,
                    error = %e,
                    "Job failed"
                ),
            }

            result
        })
    }
}
