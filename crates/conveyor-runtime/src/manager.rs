//! Connection registry and the entry point applications hold on to.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use conveyor_core::config::{ConnectionConfig, QueueConfig};
use conveyor_core::{ConveyorConfig, ConveyorError, Context, Job, QueueJob, Result};

use crate::queue::{MemoryQueue, Queue};
use crate::worker::{Worker, WorkerOptions, WorkerPool};

/// Connection definitions a [`Manager`] builds queues from.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub default_connection: String,
    pub connections: HashMap<String, ConnectionConfig>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for ManagerConfig {
    fn from(config: &QueueConfig) -> Self {
        Self {
            default_connection: config.default.clone(),
            connections: config.connections.clone(),
        }
    }
}

/// Owns named queue connections and a pool of workers.
///
/// Connections are built on first use from their [`ConnectionConfig`].
pub struct Manager {
    config: ManagerConfig,
    default_connection: RwLock<String>,
    connections: RwLock<HashMap<String, Arc<dyn Queue>>>,
    workers: WorkerPool,
}

impl Manager {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            default_connection: RwLock::new(config.default_connection.clone()),
            config,
            connections: RwLock::new(HashMap::new()),
            workers: WorkerPool::new(),
        }
    }

    pub fn from_config(config: &ConveyorConfig) -> Self {
        Self::new(ManagerConfig::from(&config.queue))
    }

    /// Get the named connection, or the default one, building it if needed.
    pub fn connection(&self, name: Option<&str>) -> Result<Arc<dyn Queue>> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self.default_connection(),
        };

        if let Some(queue) = self
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
        {
            return Ok(queue.clone());
        }

        let mut connections = self.connections.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have built it between the two locks.
        if let Some(queue) = connections.get(&name) {
            return Ok(queue.clone());
        }

        let queue = self.build(&name)?;
        connections.insert(name.clone(), queue.clone());
        tracing::debug!(connection = %name, "Queue connection created");
        Ok(queue)
    }

    fn build(&self, name: &str) -> Result<Arc<dyn Queue>> {
        let config = self
            .config
            .connections
            .get(name)
            .ok_or_else(|| ConveyorError::ConnectionNotFound(name.to_string()))?;

        match config.driver.as_str() {
            "memory" | "priority" => Ok(Arc::new(MemoryQueue::with_default_queue(&config.queue))),
            other => Err(ConveyorError::UnsupportedQueueDriver(other.to_string())),
        }
    }

    /// Register a ready-made queue, replacing any connection of that name.
    pub fn add_connection(&self, name: impl Into<String>, queue: Arc<dyn Queue>) {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), queue);
    }

    pub fn set_default_connection(&self, name: impl Into<String>) {
        *self
            .default_connection
            .write()
            .unwrap_or_else(PoisonError::into_inner) = name.into();
    }

    pub fn default_connection(&self) -> String {
        self.default_connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn push(&self, ctx: &Context, job: Arc<dyn Job>) -> Result<String> {
        self.connection(None)?.push(ctx, job)
    }

    pub fn push_on(&self, ctx: &Context, queue: &str, job: Arc<dyn Job>) -> Result<String> {
        self.connection(None)?.push_on(ctx, queue, job)
    }

    pub fn later(&self, ctx: &Context, delay: Duration, job: Arc<dyn Job>) -> Result<String> {
        self.connection(None)?.later(ctx, delay, job)
    }

    pub fn later_on(&self, ctx: &Context, queue: &str, delay: Duration, job: Arc<dyn Job>) -> Result<String> {
        self.connection(None)?.later_on(ctx, queue, delay, job)
    }

    pub fn pop(&self, ctx: &Context, queue: &str) -> Result<QueueJob> {
        self.connection(None)?.pop(ctx, queue)
    }

    pub fn size(&self, ctx: &Context, queue: &str) -> Result<usize> {
        self.connection(None)?.size(ctx, queue)
    }

    /// Start a pool worker draining `connection` (the default one if `None`).
    pub fn work(
        &self,
        ctx: &Context,
        worker_id: &str,
        connection: Option<&str>,
        options: WorkerOptions,
    ) -> Result<Arc<Worker>> {
        let queue = self.connection(connection)?;
        self.workers.start_worker(ctx, worker_id, queue, options)
    }

    pub async fn stop_worker(&self, ctx: &Context, worker_id: &str) -> Result<()> {
        self.workers.stop_worker(ctx, worker_id).await
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    /// Stop every worker, then close every connection.
    ///
    /// Keeps going after a failure and returns the first error.
    pub async fn close(&self, ctx: &Context) -> Result<()> {
        let mut first_error = self.workers.stop_all(ctx).await.err();

        let connections: Vec<(String, Arc<dyn Queue>)> = self
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, queue)| (name.clone(), queue.clone()))
            .collect();

        for (name, queue) in connections {
            if let Err(e) = queue.close(ctx) {
                tracing::warn!(connection = %name, error = %e, "Failed to close connection");
                first_error.get_or_insert(e);
            }
        }

        tracing::info!("Queue manager closed");
        first_error.map_or(Ok(()), Err)
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}
