use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use conveyor_core::config::{WorkerConfig, DEFAULT_QUEUE};
use conveyor_core::{ConveyorConfig, RetryPolicy};

use crate::middleware::Middleware;

/// Worker configuration.
#[derive(Clone)]
pub struct WorkerOptions {
    /// Queue to drain.
    pub queue: String,
    /// Stop after this many jobs (0 = unbounded).
    pub max_jobs: u64,
    /// Stop after running this long.
    pub max_time: Option<Duration>,
    /// Poll interval.
    pub sleep: Duration,
    /// Timeout for jobs that do not set their own.
    pub timeout: Duration,
    /// Informational retry budget.
    pub tries: u32,
    /// Stop as soon as the queue has nothing to pop.
    pub stop_when_empty: bool,
    /// Middleware, outermost first.
    pub middleware: Vec<Arc<dyn Middleware>>,
    /// Decides between Retrying and Failed after an error.
    pub retry_policy: Option<Arc<dyn RetryPolicy>>,
    /// Put retrying jobs back on the queue after the policy's delay.
    pub release_on_retry: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            queue: DEFAULT_QUEUE.to_string(),
            max_jobs: 0,
            max_time: None,
            sleep: Duration::from_millis(100),
            timeout: Duration::from_secs(60),
            tries: 3,
            stop_when_empty: false,
            middleware: Vec::new(),
            retry_policy: None,
            release_on_retry: false,
        }
    }
}

impl WorkerOptions {
    pub fn on_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    /// Append a middleware; earlier ones wrap later ones.
    pub fn with_middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn with_retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry_policy = Some(Arc::new(policy));
        self
    }
}

impl From<&WorkerConfig> for WorkerOptions {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            queue: config.queue.clone(),
            max_jobs: config.max_jobs,
            max_time: config.max_time(),
            sleep: config.sleep(),
            timeout: config.timeout(),
            tries: config.tries,
            stop_when_empty: config.stop_when_empty,
            release_on_retry: config.release_on_retry,
            ..Default::default()
        }
    }
}

/// Worker settings plus the `[retry]` section as the retry policy.
impl From<&ConveyorConfig> for WorkerOptions {
    fn from(config: &ConveyorConfig) -> Self {
        Self::from(&config.worker).with_retry_policy(config.retry.clone())
    }
}

impl fmt::Debug for WorkerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerOptions")
            .field("queue", &self.queue)
            .field("max_jobs", &self.max_jobs)
            .field("max_time", &self.max_time)
            .field("sleep", &self.sleep)
            .field("timeout", &self.timeout)
            .field("tries", &self.tries)
            .field("stop_when_empty", &self.stop_when_empty)
            .field("middleware", &self.middleware.len())
            .field("retry_policy", &self.retry_policy.is_some())
            .field("release_on_retry", &self.release_on_retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::LoggingMiddleware;
    use conveyor_core::{ConveyorError, RetryConfig};

    #[test]
    fn test_worker_options_default() {
        let options = WorkerOptions::default();
        assert_eq!(options.queue, "default");
        assert_eq!(options.max_jobs, 0);
        assert!(options.max_time.is_none());
        assert_eq!(options.timeout, Duration::from_secs(60));
        assert!(options.middleware.is_empty());
        assert!(options.retry_policy.is_none());
    }

    #[test]
    fn test_worker_options_from_config() {
        let config = WorkerConfig {
            queue: "emails".to_string(),
            sleep_ms: 5,
            max_jobs: 10,
            max_time_secs: 30,
            stop_when_empty: true,
            ..Default::default()
        };
        let options = WorkerOptions::from(&config);
        assert_eq!(options.queue, "emails");
        assert_eq!(options.sleep, Duration::from_millis(5));
        assert_eq!(options.max_jobs, 10);
        assert_eq!(options.max_time, Some(Duration::from_secs(30)));
        assert!(options.stop_when_empty);
    }

    #[test]
    fn test_builder_methods() {
        let options = WorkerOptions::default()
            .on_queue("reports")
            .with_middleware(LoggingMiddleware)
            .with_retry_policy(RetryConfig::default());
        assert_eq!(options.queue, "reports");
        assert_eq!(options.middleware.len(), 1);
        assert!(options.retry_policy.is_some());
    }

    #[test]
    fn test_worker_options_from_full_config() {
        let config = ConveyorConfig::parse_toml(
            r#"
            [worker]
            queue = "emails"
            release_on_retry = true

            [retry]
            backoff = "fixed"
            base_delay_ms = 250
            retry_on = ["job_timeout"]
            "#,
        )
        .unwrap();

        let options = WorkerOptions::from(&config);
        assert_eq!(options.queue, "emails");
        assert!(options.release_on_retry);

        let policy = options.retry_policy.expect("retry section becomes the policy");
        let timeout = ConveyorError::JobTimeout(Duration::from_secs(1));
        assert!(policy.should_retry(1, 3, &timeout));
        assert!(!policy.should_retry(3, 3, &timeout));
        assert!(!policy.should_retry(1, 3, &ConveyorError::handler("boom")));
        assert_eq!(policy.delay(2), Duration::from_millis(250));
    }

    #[test]
    fn test_worker_config_alone_has_no_policy() {
        let options = WorkerOptions::from(&WorkerConfig::default());
        assert!(options.retry_policy.is_none());
        assert!(!options.release_on_retry);
    }
}
