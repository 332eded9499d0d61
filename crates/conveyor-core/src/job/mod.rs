mod base;
mod callback;
mod payload;
mod queue_job;
mod traits;

pub use base::{JobCore, DEFAULT_MAX_TRIES};
pub use callback::CallbackJob;
pub use payload::JobPayload;
pub use queue_job::QueueJob;
pub use traits::{BoxFuture, Job, JobData, JobExt, JobPriority, JobStatus, StatefulJob};
