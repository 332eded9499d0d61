//! In-memory queue implementation
//!
//! Each named queue is a vector kept sorted by (priority desc, created_at
//! asc) at insertion time. `pop` scans it front to back and takes the first
//! entry whose `available_at` has passed, so the result is the highest
//! priority visible job and, among equals, the oldest one. Delayed entries
//! stay in place until they become visible.
//!
//! All named queues share one mutex; operations are linear in queue depth.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use conveyor_core::config::DEFAULT_QUEUE;
use conveyor_core::{ConveyorError, Context, Job, JobPayload, QueueJob, Result, StatefulJob};

use super::{JobOutcome, Queue, QueueStats, StatsReporting};
use crate::stats::RunningMean;

struct StoredJob {
    payload: JobPayload,
    handler: Arc<dyn Job>,
}

#[derive(Default)]
struct Counters {
    processing: u64,
    processed: u64,
    failed: u64,
    total_pushed: u64,
    last_job_at: Option<DateTime<Utc>>,
    latency: RunningMean,
}

#[derive(Default)]
struct NamedQueue {
    jobs: Vec<StoredJob>,
    counters: Counters,
}

impl NamedQueue {
    fn insert(&mut self, job: StoredJob) {
        let priority = job.payload.priority;
        let created_at = job.payload.created_at;
        // After every entry that sorts before or equal to the new one
        let position = self.jobs.partition_point(|existing| {
            existing.payload.priority > priority
                || (existing.payload.priority == priority && existing.payload.created_at <= created_at)
        });
        self.jobs.insert(position, job);
        self.counters.total_pushed += 1;
    }

    fn first_available(&self, now: DateTime<Utc>) -> Option<usize> {
        self.jobs
            .iter()
            .position(|job| job.payload.is_available_at(now))
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            size: self.jobs.len(),
            processing: self.counters.processing,
            processed: self.counters.processed,
            failed: self.counters.failed,
            total_pushed: self.counters.total_pushed,
            last_job_at: self.counters.last_job_at,
            average_latency: self.counters.latency.mean(),
        }
    }
}

#[derive(Default)]
struct State {
    closed: bool,
    queues: HashMap<String, NamedQueue>,
}

impl State {
    fn open(&mut self) -> Result<&mut HashMap<String, NamedQueue>> {
        if self.closed {
            return Err(ConveyorError::QueueClosed);
        }
        Ok(&mut self.queues)
    }
}

/// In-memory, priority and delay ordered queue.
///
/// Suitable for single-process use: nothing survives a restart.
pub struct MemoryQueue {
    default_queue: String,
    state: Mutex<State>,
}

impl MemoryQueue {
    /// Create a queue whose default queue name is `"default"`.
    pub fn new() -> Self {
        Self::with_default_queue(DEFAULT_QUEUE)
    }

    /// Create a queue with a custom default queue name.
    pub fn with_default_queue(queue: impl Into<String>) -> Self {
        Self {
            default_queue: queue.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert_at(&self, ctx: &Context, queue: &str, job: StoredJob) -> Result<()> {
        ctx.ensure_active()?;
        let mut state = self.lock();
        state
            .open()?
            .entry(queue.to_string())
            .or_default()
            .insert(job);
        Ok(())
    }

    /// Pop as of `now`.
    fn pop_at(&self, ctx: &Context, queue: &str, now: DateTime<Utc>) -> Result<QueueJob> {
        ctx.ensure_active()?;
        let mut state = self.lock();
        let named = state
            .open()?
            .get_mut(queue)
            .ok_or_else(|| ConveyorError::NoJobAvailable(queue.to_string()))?;

        let index = named
            .first_available(now)
            .ok_or_else(|| ConveyorError::NoJobAvailable(queue.to_string()))?;
        let stored = named.jobs.remove(index);
        named.counters.processing += 1;

        Ok(QueueJob::from_payload(stored.payload, stored.handler))
    }

    /// Peek as of `now`.
    fn peek_at(&self, ctx: &Context, queue: &str, now: DateTime<Utc>) -> Result<JobPayload> {
        ctx.ensure_active()?;
        let mut state = self.lock();
        state
            .open()?
            .get(queue)
            .and_then(|named| named.first_available(now).map(|i| named.jobs[i].payload.clone()))
            .ok_or_else(|| ConveyorError::NoJobAvailable(queue.to_string()))
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsReporting for MemoryQueue {
    fn stats(&self, queue: &str) -> Result<QueueStats> {
        let mut state = self.lock();
        Ok(state
            .open()?
            .get(queue)
            .map(NamedQueue::stats)
            .unwrap_or_default())
    }

    fn report(&self, queue: &str, outcome: JobOutcome) {
        let mut state = self.lock();
        let Ok(queues) = state.open() else {
            return;
        };
        let counters = &mut queues.entry(queue.to_string()).or_default().counters;
        counters.processing = counters.processing.saturating_sub(1);
        counters.last_job_at = Some(Utc::now());
        match outcome {
            JobOutcome::Completed { latency } => {
                counters.processed += 1;
                counters.latency.record(latency);
            }
            JobOutcome::Failed => counters.failed += 1,
        }
    }
}

impl Queue for MemoryQueue {
    fn default_queue(&self) -> &str {
        &self.default_queue
    }

    fn later_on(&self, ctx: &Context, queue: &str, delay: Duration, job: Arc<dyn Job>) -> Result<String> {
        let payload = JobPayload::from_job(job.as_ref(), queue, delay, Utc::now());
        let id = payload.id.clone();
        self.insert_at(ctx, queue, StoredJob { payload, handler: job })?;

        tracing::debug!(job_id = %id, queue = %queue, delay = ?delay, "Job pushed");
        Ok(id)
    }

    fn pop(&self, ctx: &Context, queue: &str) -> Result<QueueJob> {
        self.pop_at(ctx, queue, Utc::now())
    }

    fn peek(&self, ctx: &Context, queue: &str) -> Result<JobPayload> {
        self.peek_at(ctx, queue, Utc::now())
    }

    fn size(&self, ctx: &Context, queue: &str) -> Result<usize> {
        ctx.ensure_active()?;
        let mut state = self.lock();
        Ok(state.open()?.get(queue).map_or(0, |named| named.jobs.len()))
    }

    fn clear(&self, ctx: &Context, queue: &str) -> Result<()> {
        ctx.ensure_active()?;
        let mut state = self.lock();
        if let Some(named) = state.open()?.get_mut(queue) {
            named.jobs.clear();
        }
        Ok(())
    }

    fn release(&self, ctx: &Context, job: &QueueJob, delay: Duration) -> Result<()> {
        job.mark_as_pending();
        let mut payload = job.to_payload();
        payload.reschedule(delay, Utc::now());
        let queue = payload.queue.clone();
        self.insert_at(
            ctx,
            &queue,
            StoredJob {
                payload,
                handler: job.handler().clone(),
            },
        )?;

        tracing::debug!(job_id = %job.id(), queue = %queue, delay = ?delay, "Job released");
        Ok(())
    }

    fn close(&self, ctx: &Context) -> Result<()> {
        ctx.ensure_active()?;
        let mut state = self.lock();
        state.closed = true;
        state.queues.clear();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
