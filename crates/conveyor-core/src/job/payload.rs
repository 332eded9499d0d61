use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

use super::traits::{Job, JobData, JobPriority};

/// Serializable snapshot of a queued job.
///
/// This is what queues store and what a persistence or transport layer
/// would exchange. Timeouts travel as whole seconds (`0` meaning "use the
/// worker default"); in memory they keep full precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    /// Unique job ID.
    pub id: String,
    /// Human readable job name.
    pub display_name: String,
    /// Fully qualified job type.
    pub job: String,
    /// Retry budget.
    pub max_tries: u32,
    /// Execution timeout.
    #[serde(with = "timeout_secs")]
    pub timeout: Option<Duration>,
    /// Ordering class.
    pub priority: JobPriority,
    /// Job payload.
    #[serde(default)]
    pub data: JobData,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: JobData,
    /// Named queue the job lives on.
    pub queue: String,
    /// Attempts made so far.
    #[serde(default)]
    pub attempts: u32,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// Earliest time the job may be popped.
    pub available_at: DateTime<Utc>,
    /// When processing last started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    /// When the job last failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    /// Last failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl JobPayload {
    /// Snapshot `job` for `queue`, visible `delay` after `now`.
    pub fn from_job(job: &dyn Job, queue: impl Into<String>, delay: Duration, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            display_name: job.display_name(),
            job: job.job_type().to_string(),
            max_tries: job.max_tries(),
            timeout: job.timeout(),
            priority: job.priority(),
            data: job.payload(),
            metadata: job.metadata(),
            queue: queue.into(),
            attempts: 0,
            created_at: now,
            available_at: offset(now, delay),
            processed_at: None,
            failed_at: None,
            last_error: None,
        }
    }

    /// Whether the job may be popped at `now`.
    pub fn is_available_at(&self, now: DateTime<Utc>) -> bool {
        self.available_at <= now
    }

    /// Make the job visible again `delay` after `now`.
    pub fn reschedule(&mut self, delay: Duration, now: DateTime<Utc>) {
        self.available_at = offset(now, delay);
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn offset(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

mod timeout_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        let secs = value.map_or(0, |d| {
            if d.subsec_nanos() > 0 {
                d.as_secs() + 1
            } else {
                d.as_secs()
            }
        });
        serializer.serialize_u64(secs)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok((secs > 0).then(|| Duration::from_secs(secs)))
    }
}
