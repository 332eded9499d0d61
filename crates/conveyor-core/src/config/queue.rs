use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Name of the connection used when none is given.
pub const DEFAULT_CONNECTION: &str = "memory";

/// Name of the queue used when neither caller nor job picks one.
pub const DEFAULT_QUEUE: &str = "default";

/// Queue connection registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Default connection name.
    #[serde(default = "default_connection")]
    pub default: String,

    /// Named connections.
    #[serde(default = "default_connections")]
    pub connections: HashMap<String, ConnectionConfig>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default: default_connection(),
            connections: default_connections(),
        }
    }
}

fn default_connection() -> String {
    DEFAULT_CONNECTION.to_string()
}

fn default_connections() -> HashMap<String, ConnectionConfig> {
    HashMap::from([(DEFAULT_CONNECTION.to_string(), ConnectionConfig::default())])
}

/// A single named connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Backing driver ("memory" or "priority").
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Queue name used when a job does not pick one.
    #[serde(default = "default_queue")]
    pub queue: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            queue: default_queue(),
        }
    }
}

fn default_driver() -> String {
    "memory".to_string()
}

fn default_queue() -> String {
    DEFAULT_QUEUE.to_string()
}
