use std::time::Duration;

use thiserror::Error;

/// Core error type for Conveyor operations.
#[derive(Error, Debug)]
pub enum ConveyorError {
    #[error("Queue is closed")]
    QueueClosed,

    #[error("No job available on queue '{0}'")]
    NoJobAvailable(String),

    #[error("Operation cancelled")]
    OperationCancelled,

    #[error("Worker '{0}' already exists")]
    DuplicateWorkerId(String),

    #[error("Worker '{0}' not found")]
    WorkerNotFound(String),

    #[error("Worker is already running")]
    WorkerAlreadyRunning,

    #[error("Connection '{0}' not found")]
    ConnectionNotFound(String),

    #[error("Unsupported queue driver: {0}")]
    UnsupportedQueueDriver(String),

    #[error("Job handler failed: {0}")]
    JobHandlerFailure(String),

    #[error("Job timed out after {0:?}")]
    JobTimeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{} errors occurred, first: {}", .0.len(), first_message(.0))]
    Multiple(Vec<ConveyorError>),
}

impl ConveyorError {
    /// Wrap any displayable handler error.
    pub fn handler(error: impl std::fmt::Display) -> Self {
        Self::JobHandlerFailure(error.to_string())
    }

    /// Stable snake_case name of the error variant, used by retry filters.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::QueueClosed => "queue_closed",
            Self::NoJobAvailable(_) => "no_job_available",
            Self::OperationCancelled => "operation_cancelled",
            Self::DuplicateWorkerId(_) => "duplicate_worker_id",
            Self::WorkerNotFound(_) => "worker_not_found",
            Self::WorkerAlreadyRunning => "worker_already_running",
            Self::ConnectionNotFound(_) => "connection_not_found",
            Self::UnsupportedQueueDriver(_) => "unsupported_queue_driver",
            Self::JobHandlerFailure(_) => "job_handler_failure",
            Self::JobTimeout(_) => "job_timeout",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
            Self::Runtime(_) => "runtime",
            Self::Io(_) => "io",
            Self::Multiple(_) => "multiple",
        }
    }

    /// Collapse a list of errors: none is `Ok`, one is returned as is.
    pub fn collect(mut errors: Vec<ConveyorError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple(errors)),
        }
    }
}

fn first_message(errors: &[ConveyorError]) -> String {
    errors
        .first()
        .map(|e| e.to_string())
        .unwrap_or_default()
}

impl From<serde_json::Error> for ConveyorError {
    fn from(e: serde_json::Error) -> Self {
        ConveyorError::Serialization(e.to_string())
    }
}

/// Result type alias using ConveyorError.
pub type Result<T> = std::result::Result<T, ConveyorError>;
