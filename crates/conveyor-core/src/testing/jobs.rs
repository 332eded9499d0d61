use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::context::Context;
use crate::error::{ConveyorError, Result};
use crate::job::{BoxFuture, Job, JobCore};

/// Shared, ordered record of job executions.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.into());
        }
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Succeeds and appends its label to an [`ExecutionLog`].
#[derive(Debug)]
pub struct RecordingJob {
    label: String,
    log: ExecutionLog,
    core: JobCore,
}

impl RecordingJob {
    pub fn new(label: impl Into<String>, log: &ExecutionLog) -> Self {
        Self {
            label: label.into(),
            log: log.clone(),
            core: JobCore::new(),
        }
    }
}

impl Job for RecordingJob {
    fn handle<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.log.record(self.label.clone());
            Ok(())
        })
    }

    fn core(&self) -> &JobCore {
        &self.core
    }

    fn display_name(&self) -> String {
        self.label.clone()
    }
}

/// Always fails; counts calls to `handle` and `failed`.
#[derive(Debug, Default)]
pub struct FailingJob {
    core: JobCore,
    handled: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
}

impl FailingJob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handled_count(&self) -> Arc<AtomicUsize> {
        self.handled.clone()
    }

    pub fn failed_count(&self) -> Arc<AtomicUsize> {
        self.failed.clone()
    }
}

impl Job for FailingJob {
    fn handle<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.handled.fetch_add(1, Ordering::SeqCst);
            Err(ConveyorError::handler("job failed on purpose"))
        })
    }

    fn failed<'a>(&'a self, _ctx: &'a Context, _error: &'a ConveyorError) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.failed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn core(&self) -> &JobCore {
        &self.core
    }
}

/// Panics inside `handle`.
#[derive(Debug, Default)]
pub struct PanickingJob {
    core: JobCore,
}

impl PanickingJob {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Job for PanickingJob {
    #[allow(unreachable_code)]
    fn handle<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            panic!("job panicked on purpose");
            Ok(())
        })
    }

    fn core(&self) -> &JobCore {
        &self.core
    }
}

/// Sleeps for a fixed duration, optionally ignoring its context.
#[derive(Debug)]
pub struct SlowJob {
    duration: Duration,
    cooperative: bool,
    core: JobCore,
}

impl SlowJob {
    /// Sleeps but stops early once its context is done.
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            cooperative: true,
            core: JobCore::new(),
        }
    }

    /// Sleeps the whole duration regardless of its context.
    pub fn stubborn(duration: Duration) -> Self {
        Self {
            cooperative: false,
            ..Self::new(duration)
        }
    }
}

impl Job for SlowJob {
    fn handle<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.cooperative {
                tokio::select! {
                    _ = tokio::time::sleep(self.duration) => Ok(()),
                    _ = ctx.done() => Err(ConveyorError::OperationCancelled),
                }
            } else {
                tokio::time::sleep(self.duration).await;
                Ok(())
            }
        })
    }

    fn core(&self) -> &JobCore {
        &self.core
    }
}
