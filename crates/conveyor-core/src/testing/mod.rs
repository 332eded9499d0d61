//! Testing utilities for code built on Conveyor.
//!
//! Enabled with the `testing` feature. The jobs here record what happened to
//! them so tests can assert on execution order and failure handling without
//! writing bespoke handlers.
//!
//! # Example
//!
//! ```ignore
//! let log = ExecutionLog::new();
//! queue.push(&ctx, Arc::new(RecordingJob::new("a", &log)))?;
//! // ... run a worker ...
//! assert_eq!(log.entries(), vec!["a"]);
//! ```

mod jobs;

pub use jobs::{ExecutionLog, FailingJob, PanickingJob, RecordingJob, SlowJob};

use std::time::Duration;

/// Default timeout for [`wait_until`].
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll `condition` every few milliseconds until it holds or `timeout` passes.
///
/// Returns whether the condition was met.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
