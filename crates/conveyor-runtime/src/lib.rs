//! Runtime for Conveyor: queues, workers and the manager that ties them together.

pub mod dispatcher;
pub mod manager;
pub mod middleware;
pub mod queue;
pub mod stats;
pub mod telemetry;
pub mod worker;

pub use dispatcher::{BatchResult, Dispatcher};
pub use manager::{Manager, ManagerConfig};
pub use middleware::{LoggingMiddleware, Middleware, Next};
pub use queue::{JobOutcome, MemoryQueue, Queue, QueueStats, StatsReporting};
pub use stats::RunningMean;
pub use telemetry::init_tracing;
pub use worker::{ExecutionResult, JobExecutor, Worker, WorkerOptions, WorkerPool, WorkerState, WorkerStats};
