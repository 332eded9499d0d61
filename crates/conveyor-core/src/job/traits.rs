use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::{ConveyorError, Result};

use super::base::JobCore;

/// Boxed future returned by job handlers and middleware.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Key/value mapping used for job payloads and metadata.
pub type JobData = HashMap<String, serde_json::Value>;

/// A unit of background work.
///
/// Implementors own a [`JobCore`] holding their configuration and expose it
/// through [`Job::core`]; every configuration accessor delegates to it.
pub trait Job: Send + Sync + 'static {
    /// Execute the job.
    fn handle<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<()>>;

    /// Called once after a failed execution.
    fn failed<'a>(
        &'a self,
        _ctx: &'a Context,
        _error: &'a ConveyorError,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Shared configuration and payload.
    fn core(&self) -> &JobCore;

    /// Fully qualified job type.
    fn job_type(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Human readable name.
    fn display_name(&self) -> String {
        let full = self.job_type();
        full.rsplit("::").next().unwrap_or(full).to_string()
    }

    fn payload(&self) -> JobData {
        self.core().payload()
    }

    fn queue(&self) -> Option<String> {
        self.core().queue()
    }

    fn delay(&self) -> Duration {
        self.core().delay()
    }

    fn max_tries(&self) -> u32 {
        self.core().max_tries()
    }

    fn timeout(&self) -> Option<Duration> {
        self.core().timeout()
    }

    fn priority(&self) -> JobPriority {
        self.core().priority()
    }

    fn metadata(&self) -> JobData {
        self.core().metadata()
    }
}

/// Fluent configuration for any job.
///
/// Each method consumes the job and hands it back so calls chain:
///
/// ```ignore
/// let job = SendEmail::new(to)
///     .on_queue("mail")
///     .with_priority(JobPriority::High)
///     .with_delay(Duration::from_secs(30));
/// ```
pub trait JobExt: Job + Sized {
    fn on_queue(self, queue: impl Into<String>) -> Self {
        self.core().set_queue(queue);
        self
    }

    fn with_delay(self, delay: Duration) -> Self {
        self.core().set_delay(delay);
        self
    }

    fn with_priority(self, priority: JobPriority) -> Self {
        self.core().set_priority(priority);
        self
    }

    fn with_timeout(self, timeout: Duration) -> Self {
        self.core().set_timeout(timeout);
        self
    }

    fn with_max_tries(self, max_tries: u32) -> Self {
        self.core().set_max_tries(max_tries);
        self
    }

    fn with_metadata(self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.core().insert_metadata(key, value);
        self
    }

    fn with_data(self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.core().insert_data(key, value);
        self
    }
}

impl<J: Job> JobExt for J {}

/// Lifecycle bookkeeping for jobs that went through a queue.
pub trait StatefulJob {
    fn id(&self) -> &str;
    fn attempts(&self) -> u32;
    fn status(&self) -> JobStatus;
    fn created_at(&self) -> DateTime<Utc>;
    fn last_error(&self) -> Option<String>;

    /// Whether the retry budget is not yet spent.
    fn should_retry(&self) -> bool;

    /// Pending -> Processing.
    fn mark_as_started(&self);
    /// -> Completed.
    fn mark_as_completed(&self);
    /// -> Failed, recording the error and counting the attempt.
    fn mark_as_failed(&self, error: &ConveyorError);
    /// -> Retrying, counting the attempt.
    fn mark_as_retrying(&self);
    /// -> Pending again after being released back to a queue.
    fn mark_as_pending(&self);
}

/// Job priority levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum JobPriority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl JobPriority {
    /// Numeric value used on the wire.
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Parse from a lowercase name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl From<JobPriority> for u8 {
    fn from(priority: JobPriority) -> Self {
        priority.as_u8()
    }
}

impl TryFrom<u8> for JobPriority {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Low),
            1 => Ok(Self::Normal),
            2 => Ok(Self::High),
            3 => Ok(Self::Critical),
            other => Err(format!("invalid job priority: {}", other)),
        }
    }
}

/// Job status in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be popped.
    #[default]
    Pending,
    /// Popped by a worker and executing.
    Processing,
    /// Successfully completed.
    Completed,
    /// Failed, no retry scheduled.
    Failed,
    /// Failed, retry requested by the retry policy.
    Retrying,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
        }
    }

    /// Completed is the only terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(JobPriority::Critical > JobPriority::High);
        assert!(JobPriority::High > JobPriority::Normal);
        assert!(JobPriority::Normal > JobPriority::Low);
    }

    #[test]
    fn test_priority_conversion() {
        assert_eq!(JobPriority::Critical.as_u8(), 3);
        assert_eq!(JobPriority::Low.as_u8(), 0);
        assert_eq!(JobPriority::try_from(2), Ok(JobPriority::High));
        assert!(JobPriority::try_from(4).is_err());
        assert_eq!(JobPriority::parse("CRITICAL"), Some(JobPriority::Critical));
        assert_eq!(JobPriority::parse("urgent"), None);
    }

    #[test]
    fn test_priority_serializes_as_integer() {
        let json = serde_json::to_string(&JobPriority::High).unwrap();
        assert_eq!(json, "2");
        let parsed: JobPriority = serde_json::from_str("0").unwrap();
        assert_eq!(parsed, JobPriority::Low);
        assert!(serde_json::from_str::<JobPriority>("9").is_err());
    }

    #[test]
    fn test_status_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(!JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Retrying.is_terminal());
        assert_eq!(JobStatus::default(), JobStatus::Pending);
        assert_eq!(JobStatus::Retrying.as_str(), "retrying");
    }
}
