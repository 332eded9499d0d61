//! Conveyor - in-process background jobs for Tokio applications
//!
//! Producers push jobs with a priority and an optional delay onto named
//! queues; workers drain those queues with per-job timeouts, panic isolation,
//! middleware and retry policies.

#[doc(hidden)]
pub use conveyor_core;
#[doc(hidden)]
pub use conveyor_runtime;

pub use conveyor_core::{config, context, error, job, retry};
pub use conveyor_runtime::{dispatcher, manager, middleware, queue, telemetry, worker};

#[cfg(feature = "testing")]
pub use conveyor_core::testing;

pub mod prelude {
    pub use std::sync::Arc;
    pub use std::time::Duration;

    // Core types
    pub use conveyor_core::config::ConveyorConfig;
    pub use conveyor_core::{
        CallbackJob, Context, ConveyorError, Job, JobCore, JobData, JobExt, JobPayload, JobPriority,
        JobStatus, QueueJob, Result, RetryConfig, RetryPolicy, StatefulJob,
    };

    // Runtime types
    pub use conveyor_runtime::{
        init_tracing, Dispatcher, LoggingMiddleware, Manager, MemoryQueue, Middleware, Next, Queue,
        StatsReporting, Worker, WorkerOptions, WorkerPool, WorkerState,
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::sync::Mutex;

    fn recorder(name: &str, seen: &Arc<Mutex<Vec<String>>>) -> CallbackJob {
        let seen = seen.clone();
        let label = name.to_string();
        CallbackJob::new(name, move |_ctx, _data| {
            let seen = seen.clone();
            let label = label.clone();
            async move {
                seen.lock().unwrap().push(label);
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_end_to_end_priority_order() {
        let manager = Arc::new(Manager::default());
        let dispatcher = Dispatcher::new(manager.clone());
        let ctx = Context::background();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let jobs: Vec<Arc<dyn Job>> = vec![
            Arc::new(recorder("low", &seen).with_priority(JobPriority::Low)),
            Arc::new(recorder("normal", &seen)),
            Arc::new(recorder("critical", &seen).with_priority(JobPriority::Critical)),
            Arc::new(recorder("high", &seen).with_priority(JobPriority::High)),
        ];
        assert!(dispatcher.batch(&ctx, jobs).is_complete());

        let options = WorkerOptions {
            sleep: Duration::from_millis(1),
            stop_when_empty: true,
            ..Default::default()
        }
        .with_middleware(LoggingMiddleware);
        let worker = manager.work(&ctx, "w1", None, options).unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while worker.state() != WorkerState::Stopped && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        assert_eq!(*seen.lock().unwrap(), vec!["critical", "high", "normal", "low"]);
        assert_eq!(worker.stats().processed_jobs, 4);
        manager.close(&ctx).await.unwrap();
    }
}
