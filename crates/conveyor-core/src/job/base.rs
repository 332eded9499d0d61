use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use super::traits::{JobData, JobPriority};

/// Default retry budget for a job.
pub const DEFAULT_MAX_TRIES: u32 = 3;

#[derive(Debug, Clone)]
struct JobConfig {
    queue: Option<String>,
    delay: Duration,
    max_tries: u32,
    timeout: Option<Duration>,
    priority: JobPriority,
    data: JobData,
    metadata: JobData,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            queue: None,
            delay: Duration::ZERO,
            max_tries: DEFAULT_MAX_TRIES,
            timeout: None,
            priority: JobPriority::Normal,
            data: JobData::new(),
            metadata: JobData::new(),
        }
    }
}

/// Configuration and payload shared by every job kind.
///
/// Concrete jobs hold a `JobCore` and return it from [`Job::core`](super::Job::core).
/// All access goes through one lock; readers get copies.
#[derive(Debug, Default)]
pub struct JobCore {
    config: RwLock<JobConfig>,
}

impl JobCore {
    /// Create a core with default configuration and no payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a core carrying `data` as its payload.
    pub fn with_payload(data: JobData) -> Self {
        Self {
            config: RwLock::new(JobConfig {
                data,
                ..Default::default()
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, JobConfig> {
        self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, JobConfig> {
        self.config.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn payload(&self) -> JobData {
        self.read().data.clone()
    }

    pub fn metadata(&self) -> JobData {
        self.read().metadata.clone()
    }

    pub fn queue(&self) -> Option<String> {
        self.read().queue.clone()
    }

    pub fn delay(&self) -> Duration {
        self.read().delay
    }

    pub fn max_tries(&self) -> u32 {
        self.read().max_tries
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.read().timeout
    }

    pub fn priority(&self) -> JobPriority {
        self.read().priority
    }

    pub fn set_queue(&self, queue: impl Into<String>) {
        self.write().queue = Some(queue.into());
    }

    pub fn set_delay(&self, delay: Duration) {
        self.write().delay = delay;
    }

    pub fn set_max_tries(&self, max_tries: u32) {
        self.write().max_tries = max_tries;
    }

    /// A zero timeout clears it, falling back to the worker default.
    pub fn set_timeout(&self, timeout: Duration) {
        self.write().timeout = (!timeout.is_zero()).then_some(timeout);
    }

    pub fn set_priority(&self, priority: JobPriority) {
        self.write().priority = priority;
    }

    pub fn insert_data(&self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.write().data.insert(key.into(), value.into());
    }

    pub fn insert_metadata(&self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.write().metadata.insert(key.into(), value.into());
    }

    pub fn set_payload(&self, data: JobData) {
        self.write().data = data;
    }

    pub fn set_metadata(&self, metadata: JobData) {
        self.write().metadata = metadata;
    }
}

impl Clone for JobCore {
    /// Deep copy behind a fresh lock.
    fn clone(&self) -> Self {
        Self {
            config: RwLock::new(self.read().clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_defaults() {
        let core = JobCore::new();
        assert_eq!(core.max_tries(), DEFAULT_MAX_TRIES);
        assert_eq!(core.priority(), JobPriority::Normal);
        assert_eq!(core.delay(), Duration::ZERO);
        assert!(core.timeout().is_none());
        assert!(core.queue().is_none());
        assert!(core.payload().is_empty());
    }

    #[test]
    fn test_returned_payload_is_a_copy() {
        let core = JobCore::new();
        core.insert_data("user_id", 42);

        let mut payload = core.payload();
        payload.insert("user_id".into(), json!(7));
        payload.insert("extra".into(), json!(true));

        assert_eq!(core.payload().get("user_id"), Some(&json!(42)));
        assert!(!core.payload().contains_key("extra"));
    }

    #[test]
    fn test_clone_is_independent() {
        let core = JobCore::new();
        core.insert_metadata("trace", "abc");
        core.set_queue("emails");

        let copy = core.clone();
        copy.insert_metadata("trace", "xyz");
        copy.set_queue("reports");

        assert_eq!(core.metadata().get("trace"), Some(&json!("abc")));
        assert_eq!(core.queue().as_deref(), Some("emails"));
        assert_eq!(copy.queue().as_deref(), Some("reports"));
    }

    #[test]
    fn test_zero_timeout_clears() {
        let core = JobCore::new();
        core.set_timeout(Duration::from_secs(5));
        assert_eq!(core.timeout(), Some(Duration::from_secs(5)));
        core.set_timeout(Duration::ZERO);
        assert!(core.timeout().is_none());
    }

    #[test]
    fn test_concurrent_writes() {
        let core = Arc::new(JobCore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let core = core.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        core.insert_data(format!("k{}_{}", i, j), j);
                        let _ = core.payload();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(core.payload().len(), 400);
    }
}
