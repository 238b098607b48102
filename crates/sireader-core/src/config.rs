//! Driver configuration
//!
//! Settings for one master station link, stored as JSON.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::protocol::{DEFAULT_QUEUE_CAPACITY, DEFAULT_TIMEOUT_MS, HIGH_BAUD_RATE};

/// Errors loading or saving a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Link and driver settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Serial port name
    pub port_name: String,

    /// Baud rate
    pub baud_rate: u32,

    /// Messages buffered between the reader and the driver
    pub queue_capacity: usize,

    /// How long to wait for each answer from the station, in milliseconds
    pub timeout_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: HIGH_BAUD_RATE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl DriverConfig {
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load from a JSON file; missing fields take their default
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
