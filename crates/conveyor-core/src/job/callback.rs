use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::context::Context;
use crate::error::{ConveyorError, Result};

use super::base::JobCore;
use super::traits::{BoxFuture, Job, JobData};

type Handler = Arc<dyn Fn(Context, JobData) -> BoxFuture<'static, Result<()>> + Send + Sync>;
type FailureHandler = Arc<dyn Fn(Context, String) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A job built from a closure.
///
/// The closure receives a clone of the execution context and a copy of the
/// job payload.
#[derive(Clone)]
pub struct CallbackJob {
    name: String,
    core: JobCore,
    handler: Handler,
    on_failure: Option<FailureHandler>,
}

impl CallbackJob {
    /// Create a new callback job.
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Context, JobData) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            core: JobCore::new(),
            handler: Arc::new(move |ctx, data| Box::pin(handler(ctx, data))),
            on_failure: None,
        }
    }

    /// Run `callback` with the error message when the job fails.
    pub fn on_failure<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Context, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_failure = Some(Arc::new(move |ctx, error| Box::pin(callback(ctx, error))));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Job for CallbackJob {
    fn handle<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<()>> {
        (self.handler)(ctx.clone(), self.core.payload())
    }

    fn failed<'a>(&'a self, ctx: &'a Context, error: &'a ConveyorError) -> BoxFuture<'a, Result<()>> {
        match &self.on_failure {
            Some(callback) => callback(ctx.clone(), error.to_string()),
            None => Box::pin(async { Ok(()) }),
        }
    }

    fn core(&self) -> &JobCore {
        &self.core
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }
}

impl fmt::Debug for CallbackJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackJob")
            .field("name", &self.name)
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobExt, JobPriority};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_handler_receives_payload() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let job = CallbackJob::new("count", move |_ctx, data| {
            let counter = counter.clone();
            async move {
                let n = data.get("n").and_then(|v| v.as_u64()).unwrap_or(0);
                counter.fetch_add(n as usize, Ordering::SeqCst);
                Ok(())
            }
        })
        .with_data("n", 5);

        job.handle(&Context::background()).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_failure_callback() {
        let message = Arc::new(std::sync::Mutex::new(String::new()));
        let sink = message.clone();
        let job = CallbackJob::new("noop", |_ctx, _data| async { Ok(()) }).on_failure(
            move |_ctx, error| {
                let sink = sink.clone();
                async move {
                    *sink.lock().unwrap() = error;
                    Ok(())
                }
            },
        );

        let error = ConveyorError::handler("smtp down");
        job.failed(&Context::background(), &error).await.unwrap();
        assert_eq!(*message.lock().unwrap(), "Job handler failed: smtp down");
    }

    #[test]
    fn test_fluent_configuration() {
        let job = CallbackJob::new("configure", |_ctx, _data| async { Ok(()) })
            .on_queue("high")
            .with_delay(Duration::from_secs(3))
            .with_priority(JobPriority::High)
            .with_timeout(Duration::from_secs(9))
            .with_max_tries(7)
            .with_metadata("source", "api");

        assert_eq!(job.queue().as_deref(), Some("high"));
        assert_eq!(Job::delay(&job), Duration::from_secs(3));
        assert_eq!(job.priority(), JobPriority::High);
        assert_eq!(job.timeout(), Some(Duration::from_secs(9)));
        assert_eq!(job.max_tries(), 7);
        assert_eq!(job.metadata().get("source"), Some(&json!("api")));
        assert_eq!(job.display_name(), "configure");
    }

    #[test]
    fn test_clone_does_not_share_config() {
        let job = CallbackJob::new("original", |_ctx, _data| async { Ok(()) }).with_data("k", 1);
        let copy = job.clone().with_data("k", 2);
        assert_eq!(job.payload().get("k"), Some(&json!(1)));
        assert_eq!(copy.payload().get("k"), Some(&json!(2)));
    }
}
