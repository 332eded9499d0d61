pub mod config;
pub mod context;
pub mod error;
pub mod job;
pub mod retry;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::ConveyorConfig;
pub use context::Context;
pub use error::{ConveyorError, Result};
pub use job::{
    BoxFuture, CallbackJob, Job, JobCore, JobData, JobExt, JobPayload, JobPriority, JobStatus,
    QueueJob, StatefulJob,
};
pub use retry::{BackoffStrategy, RetryConfig, RetryPolicy};
