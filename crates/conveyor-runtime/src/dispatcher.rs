use std::sync::Arc;
use std::time::Duration;

use conveyor_core::{Context, Job, Result};
use serde::Serialize;

use crate::manager::Manager;

/// Outcome of [`Dispatcher::batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// IDs of the jobs that were queued, in input order.
    pub job_ids: Vec<String>,
    /// Input index and error message of each job that was not queued.
    pub errors: Vec<(usize, String)>,
}

impl BatchResult {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Dispatches jobs through a [`Manager`]'s default connection.
#[derive(Clone)]
pub struct Dispatcher {
    manager: Arc<Manager>,
}

impl Dispatcher {
    /// Create a new job dispatcher.
    pub fn new(manager: Arc<Manager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<Manager> {
        &self.manager
    }

    /// Dispatch a job on its own queue.
    pub fn dispatch(&self, ctx: &Context, job: Arc<dyn Job>) -> Result<String> {
        self.manager.push(ctx, job)
    }

    /// Dispatch a job on a specific queue.
    pub fn dispatch_on(&self, ctx: &Context, queue: &str, job: Arc<dyn Job>) -> Result<String> {
        self.manager.push_on(ctx, queue, job)
    }

    /// Dispatch a job with a delay.
    pub fn dispatch_later(&self, ctx: &Context, delay: Duration, job: Arc<dyn Job>) -> Result<String> {
        self.manager.later(ctx, delay, job)
    }

    /// Run a job inline, bypassing every queue.
    ///
    /// On error the job's `failed` hook runs before the error is returned.
    pub async fn dispatch_sync(&self, ctx: &Context, job: &dyn Job) -> Result<()> {
        ctx.ensure_active()?;
        match job.handle(ctx).await {
            Ok(()) => Ok(()),
            Err(error) => {
                if let Err(e) = job.failed(ctx, &error).await {
                    tracing::warn!(job = %job.display_name(), error = %e, "Job failure callback returned an error");
                }
                Err(error)
            }
        }
    }

    /// Dispatch every job, continuing past failures.
    pub fn batch(&self, ctx: &Context, jobs: Vec<Arc<dyn Job>>) -> BatchResult {
        let mut result = BatchResult {
            total: jobs.len(),
            ..Default::default()
        };

        for (index, job) in jobs.into_iter().enumerate() {
            match self.dispatch(ctx, job) {
                Ok(id) => {
                    result.succeeded += 1;
                    result.job_ids.push(id);
                }
                Err(e) => {
                    result.failed += 1;
                    result.errors.push((index, e.to_string()));
                }
            }
        }

        tracing::debug!(
            total = result.total,
            succeeded = result.succeeded,
            failed = result.failed,
            "Batch dispatched"
        );
        result
    }
}
