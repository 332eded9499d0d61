//! Tracing subscriber setup for applications embedding the runtime.

use conveyor_core::config::LoggingConfig;
use conveyor_core::{ConveyorError, Result};
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. Returns `false` when a
/// global subscriber was already installed, which leaves it in place.
pub fn init_tracing(config: &LoggingConfig) -> Result<bool> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| ConveyorError::Config(format!("Invalid log filter '{}': {}", config.level, e)))?,
    };

    let installed = if config.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .is_ok()
    };
    Ok(installed)
}
