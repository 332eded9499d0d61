use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::queue::DEFAULT_QUEUE;

/// Worker defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Queue to drain.
    #[serde(default = "default_queue")]
    pub queue: String,

    /// Poll interval in milliseconds.
    #[serde(default = "default_sleep_ms")]
    pub sleep_ms: u64,

    /// Default per-job timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Stop after this many jobs (0 = unbounded).
    #[serde(default)]
    pub max_jobs: u64,

    /// Stop after running this long in seconds (0 = unbounded).
    #[serde(default)]
    pub max_time_secs: u64,

    /// Informational retry budget.
    #[serde(default = "default_tries")]
    pub tries: u32,

    /// Stop as soon as the queue has nothing to pop.
    #[serde(default)]
    pub stop_when_empty: bool,

    /// Put retrying jobs back on the queue after the retry delay.
    #[serde(default)]
    pub release_on_retry: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue: default_queue(),
            sleep_ms: default_sleep_ms(),
            timeout_secs: default_timeout_secs(),
            max_jobs: 0,
            max_time_secs: 0,
            tries: default_tries(),
            stop_when_empty: false,
            release_on_retry: false,
        }
    }
}

impl WorkerConfig {
    pub fn sleep(&self) -> Duration {
        Duration::from_millis(self.sleep_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn max_time(&self) -> Option<Duration> {
        (self.max_time_secs > 0).then(|| Duration::from_secs(self.max_time_secs))
    }
}

fn default_queue() -> String {
    DEFAULT_QUEUE.to_string()
}

fn default_sleep_ms() -> u64 {
    100
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_tries() -> u32 {
    3
}
