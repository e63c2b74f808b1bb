use thiserror::Error;

use crate::bus::BusError;

/// Errors surfaced by the hub setup sequence
#[derive(Error, Debug)]
pub enum HubError {
    #[error("I2C communication failed: {0}")]
    Bus(#[from] BusError),

    #[error("sensor identification failed: expected {expected:#04x}, got {actual:#04x}")]
    Identification { expected: u8, actual: u8 },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from '{path}': {source}")]
    LoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration format: {0}")]
    FormatError(#[from] toml::de::Error),

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Telemetry sink errors
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("No active subscribers for sensor data")]
    NoSubscribers,
}

/// Result type aliases for convenience
pub type HubResult<T> = Result<T, HubError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
