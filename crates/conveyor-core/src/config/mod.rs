mod logging;
mod queue;
mod worker;

pub use logging::LoggingConfig;
pub use queue::{ConnectionConfig, QueueConfig, DEFAULT_CONNECTION, DEFAULT_QUEUE};
pub use worker::WorkerConfig;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ConveyorError, Result};
use crate::retry::RetryConfig;

/// Root configuration for Conveyor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConveyorConfig {
    /// Queue connections.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Worker defaults.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Retry policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ConveyorConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        tracing::debug!(path = %path.as_ref().display(), "Loading configuration");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConveyorError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content);

        toml::from_str(&content)
            .map_err(|e| ConveyorError::Config(format!("Failed to parse config: {}", e)))
    }
}

static ENV_VAR: Lazy<regex_lite::Regex> = Lazy::new(|| {
    regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("env var pattern is valid")
});

/// Replace `${VAR}` with the environment value; unknown variables are left as is.
fn substitute_env_vars(content: &str) -> String {
    let mut result = content.to_string();

    for cap in ENV_VAR.captures_iter(content) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}
