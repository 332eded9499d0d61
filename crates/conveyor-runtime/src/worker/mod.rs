//! Queue workers and the pool that owns them.

mod executor;
mod options;
mod pool;
mod runner;

pub use executor::{ExecutionResult, JobExecutor};
pub use options::WorkerOptions;
pub use pool::WorkerPool;
pub use runner::{Worker, WorkerState, WorkerStats};
