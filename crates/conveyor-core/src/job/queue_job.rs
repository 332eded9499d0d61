use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::context::Context;
use crate::error::{ConveyorError, Result};

use super::base::JobCore;
use super::payload::JobPayload;
use super::traits::{BoxFuture, Job, JobStatus, StatefulJob};

#[derive(Debug, Clone)]
struct JobState {
    attempts: u32,
    status: JobStatus,
    available_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// A job as seen by a worker: the handler plus queue identity and lifecycle.
///
/// The configuration (`core`) is the snapshot taken when the job was pushed,
/// so changes made to the original job afterwards do not leak into a queued
/// copy.
pub struct QueueJob {
    id: String,
    queue: String,
    display_name: String,
    job_type: &'static str,
    created_at: DateTime<Utc>,
    core: JobCore,
    handler: Arc<dyn Job>,
    state: Mutex<JobState>,
}

impl QueueJob {
    /// Rebuild a runnable job from a stored payload and its handler.
    pub fn from_payload(payload: JobPayload, handler: Arc<dyn Job>) -> Self {
        let core = JobCore::with_payload(payload.data);
        core.set_metadata(payload.metadata);
        core.set_queue(payload.queue.clone());
        core.set_max_tries(payload.max_tries);
        core.set_priority(payload.priority);
        if let Some(timeout) = payload.timeout {
            core.set_timeout(timeout);
        }
        core.set_delay(
            (payload.available_at - payload.created_at)
                .to_std()
                .unwrap_or(Duration::ZERO),
        );

        Self {
            id: payload.id,
            queue: payload.queue,
            display_name: payload.display_name,
            job_type: handler.job_type(),
            created_at: payload.created_at,
            core,
            handler,
            state: Mutex::new(JobState {
                attempts: payload.attempts,
                status: JobStatus::Pending,
                available_at: payload.available_at,
                processed_at: payload.processed_at,
                failed_at: payload.failed_at,
                last_error: payload.last_error,
            }),
        }
    }

    /// Queue the job was popped from.
    pub fn queue_name(&self) -> &str {
        &self.queue
    }

    /// The handler this job runs.
    pub fn handler(&self) -> &Arc<dyn Job> {
        &self.handler
    }

    pub fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.state().processed_at
    }

    pub fn failed_at(&self) -> Option<DateTime<Utc>> {
        self.state().failed_at
    }

    /// Snapshot back into the storable form.
    pub fn to_payload(&self) -> JobPayload {
        let state = self.state();
        JobPayload {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            job: self.job_type.to_string(),
            max_tries: self.core.max_tries(),
            timeout: self.core.timeout(),
            priority: self.core.priority(),
            data: self.core.payload(),
            metadata: self.core.metadata(),
            queue: self.queue.clone(),
            attempts: state.attempts,
            created_at: self.created_at,
            available_at: state.available_at,
            processed_at: state.processed_at,
            failed_at: state.failed_at,
            last_error: state.last_error.clone(),
        }
    }

    fn state(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Job for QueueJob {
    fn handle<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<()>> {
        self.handler.handle(ctx)
    }

    fn failed<'a>(&'a self, ctx: &'a Context, error: &'a ConveyorError) -> BoxFuture<'a, Result<()>> {
        self.handler.failed(ctx, error)
    }

    fn core(&self) -> &JobCore {
        &self.core
    }

    fn job_type(&self) -> &'static str {
        self.job_type
    }

    fn display_name(&self) -> String {
        self.display_name.clone()
    }
}

impl StatefulJob for QueueJob {
    fn id(&self) -> &str {
        &self.id
    }

    fn attempts(&self) -> u32 {
        self.state().attempts
    }

    fn status(&self) -> JobStatus {
        self.state().status
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    fn should_retry(&self) -> bool {
        self.attempts() < self.core.max_tries()
    }

    fn mark_as_started(&self) {
        let mut state = self.state();
        state.status = JobStatus::Processing;
        state.processed_at = Some(Utc::now());
    }

    fn mark_as_completed(&self) {
        self.state().status = JobStatus::Completed;
    }

    fn mark_as_failed(&self, error: &ConveyorError) {
        let mut state = self.state();
        state.status = JobStatus::Failed;
        state.last_error = Some(error.to_string());
        state.failed_at = Some(Utc::now());
        state.attempts = state.attempts.saturating_add(1);
    }

    fn mark_as_retrying(&self) {
        let mut state = self.state();
        state.status = JobStatus::Retrying;
        state.attempts = state.attempts.saturating_add(1);
    }

    fn mark_as_pending(&self) {
        self.state().status = JobStatus::Pending;
    }
}

impl Clone for QueueJob {
    /// Independent copy sharing only the (immutable) handler.
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            queue: self.queue.clone(),
            display_name: self.display_name.clone(),
            job_type: self.job_type,
            created_at: self.created_at,
            core: self.core.clone(),
            handler: self.handler.clone(),
            state: Mutex::new(self.state().clone()),
        }
    }
}

impl fmt::Debug for QueueJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueJob")
            .field("id", &self.id)
            .field("queue", &self.queue)
            .field("display_name", &self.display_name)
            .field("state", &*self.state())
            .finish_non_exhaustive()
    }
}
