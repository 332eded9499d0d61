use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use conveyor_core::{ConveyorError, Context, Job, QueueJob, Result, StatefulJob};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::executor::{ExecutionResult, JobExecutor};
use super::options::WorkerOptions;
use crate::queue::Queue;
use crate::stats::RunningMean;

/// Lifecycle of a worker. A stopped worker may be started again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    #[default]
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Copy of a worker's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub state: WorkerState,
    pub processed_jobs: u64,
    pub failed_jobs: u64,
    /// ID of the job being processed right now.
    pub current_job: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_job_at: Option<DateTime<Utc>>,
    /// Running mean of successful job latency.
    pub average_latency: Duration,
}

#[derive(Default)]
struct Counters {
    state: WorkerState,
    processed: u64,
    failed: u64,
    current_job: Option<String>,
    started_at: Option<DateTime<Utc>>,
    last_job_at: Option<DateTime<Utc>>,
    latency: RunningMean,
}

struct RunHandle {
    ctx: Context,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Shared {
    running: AtomicBool,
    /// Bumped on every start so a superseded loop cannot reset state.
    generation: AtomicU64,
    counters: Mutex<Counters>,
    run: Mutex<Option<RunHandle>>,
}

impl Shared {
    fn counters(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self) -> MutexGuard<'_, Option<RunHandle>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, generation: u64) {
        if self.generation.load(Ordering::Acquire) != generation {
            return;
        }
        self.running.store(false, Ordering::Release);
        let mut counters = self.counters();
        counters.state = WorkerState::Stopped;
        counters.current_job = None;
    }
}

/// Drains one queue on a background task.
///
/// Jobs run one at a time. Each gets its own deadline, runs through the
/// configured middleware, and is isolated from panics in its handler.
pub struct Worker {
    id: String,
    shared: Arc<Shared>,
}

impl Worker {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Spawn the processing loop and return immediately.
    ///
    /// The loop ends when `ctx` is done, when [`Worker::stop`] is called, or
    /// when one of the options' stop conditions is met. Must be called from
    /// within a Tokio runtime; otherwise `ConveyorError::Runtime` is returned.
    /// A loop that was told to stop but is still finishing its last job
    /// counts as running.
    pub fn start(&self, ctx: &Context, queue: Arc<dyn Queue>, options: WorkerOptions) -> Result<()> {
        ctx.ensure_active()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ConveyorError::Runtime(e.to_string()))?;

        let mut run = self.shared.run();
        if run.as_ref().is_some_and(|previous| !previous.handle.is_finished()) {
            return Err(ConveyorError::WorkerAlreadyRunning);
        }
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ConveyorError::WorkerAlreadyRunning);
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        {
            let mut counters = self.shared.counters();
            counters.state = WorkerState::Running;
            counters.started_at = Some(Utc::now());
        }

        let loop_ctx = ctx.child();
        let runner = Runner {
            worker_id: self.id.clone(),
            generation,
            shared: self.shared.clone(),
            executor: JobExecutor::new(queue.clone(), &options),
            queue,
            options,
            ctx: loop_ctx.clone(),
        };

        let handle = runtime.spawn(runner.run());
        *run = Some(RunHandle {
            ctx: loop_ctx,
            handle,
        });
        Ok(())
    }

    /// Signal the loop to stop, then wait for it or for `ctx`, whichever is first.
    ///
    /// The signal is always sent, even when `ctx` is already done; only the
    /// wait is bounded by `ctx`. A job already being handled finishes first.
    /// Stopping a worker that is not running is a no-op.
    pub async fn stop(&self, ctx: &Context) -> Result<()> {
        let Some(RunHandle { ctx: loop_ctx, mut handle }) = self.shared.run().take() else {
            return Ok(());
        };

        {
            let mut counters = self.shared.counters();
            if counters.state == WorkerState::Running {
                counters.state = WorkerState::Stopping;
            }
        }
        self.shared.running.store(false, Ordering::Release);
        loop_ctx.cancel();

        let joined = if ctx.is_done() && !handle.is_finished() {
            None
        } else {
            tokio::select! {
                biased;
                joined = &mut handle => Some(joined),
                _ = ctx.done() => None,
            }
        };

        match joined {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => {
                tracing::error!(worker_id = %self.id, error = %e, "Worker task ended abnormally");
                self.shared.finish(self.shared.generation.load(Ordering::Acquire));
                Ok(())
            }
            None => {
                // Keep the handle so a restart waits for this loop to exit.
                *self.shared.run() = Some(RunHandle {
                    ctx: loop_ctx,
                    handle,
                });
                Err(ConveyorError::OperationCancelled)
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn state(&self) -> WorkerState {
        self.shared.counters().state
    }

    pub fn stats(&self) -> WorkerStats {
        let counters = self.shared.counters();
        WorkerStats {
            state: counters.state,
            processed_jobs: counters.processed,
            failed_jobs: counters.failed,
            current_job: counters.current_job.clone(),
            started_at: counters.started_at,
            last_job_at: counters.last_job_at,
            average_latency: counters.latency.mean(),
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// State owned by the spawned loop.
struct Runner {
    worker_id: String,
    generation: u64,
    shared: Arc<Shared>,
    queue: Arc<dyn Queue>,
    executor: JobExecutor,
    options: WorkerOptions,
    ctx: Context,
}

impl Runner {
    async fn run(self) {
        let started = Instant::now();
        let mut handled: u64 = 0;
        let mut ticker = tokio::time::interval(self.options.sleep.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            worker_id = %self.worker_id,
            queue = %self.options.queue,
            "Worker started"
        );

        loop {
            tokio::select! {
                biased;
                _ = self.ctx.done() => {
                    tracing::info!(worker_id = %self.worker_id, "Worker shutting down");
                    break;
                }
                _ = ticker.tick() => {}
            }

            if self.options.max_jobs > 0 && handled >= self.options.max_jobs {
                tracing::info!(worker_id = %self.worker_id, jobs = handled, "Job limit reached");
                break;
            }
            if self.options.max_time.is_some_and(|max| started.elapsed() >= max) {
                tracing::info!(worker_id = %self.worker_id, "Time limit reached");
                break;
            }

            match self.queue.pop(&self.ctx, &self.options.queue) {
                Ok(job) => {
                    self.process(job).await;
                    handled += 1;
                }
                Err(ConveyorError::NoJobAvailable(_)) => {
                    if self.options.stop_when_empty {
                        tracing::info!(worker_id = %self.worker_id, "Queue empty, stopping");
                        break;
                    }
                }
                Err(ConveyorError::QueueClosed | ConveyorError::OperationCancelled) => break,
                Err(e) => {
                    tracing::error!(worker_id = %self.worker_id, error = %e, "Failed to pop job");
                }
            }
        }

        self.shared.finish(self.generation);
        tracing::info!(worker_id = %self.worker_id, "Worker stopped");
    }

    async fn process(&self, job: QueueJob) {
        self.shared.counters().current_job = Some(job.id().to_string());
        tracing::debug!(
            worker_id = %self.worker_id,
            job_id = %job.id(),
            job_type = %job.job_type(),
            "Processing job"
        );

        let result = self.executor.execute(&job).await;

        let mut counters = self.shared.counters();
        counters.current_job = None;
        counters.last_job_at = Some(Utc::now());
        match result {
            ExecutionResult::Completed { latency } => {
                counters.processed += 1;
                counters.latency.record(latency);
                tracing::debug!(
                    worker_id = %self.worker_id,
                    job_id = %job.id(),
                    latency_ms = latency.as_millis() as u64,
                    "Job completed"
                );
            }
            ExecutionResult::Failed { error, retrying } => {
                counters.failed += 1;
                if retrying {
                    tracing::warn!(
                        worker_id = %self.worker_id,
                        job_id = %job.id(),
                        attempts = job.attempts(),
                        error = %error,
                        "Job failed, will retry"
                    );
                } else {
                    tracing::error!(
                        worker_id = %self.worker_id,
                        job_id = %job.id(),
                        attempts = job.attempts(),
                        error = %error,
                        "Job failed permanently"
                    );
                }
            }
        }
    }
}
