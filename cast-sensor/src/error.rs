//! Error types for cast-sensor.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SensorError {
    /// The accessory configuration is not valid JSON for this schema
    #[error("Invalid accessory config: {0}")]
    Config(#[from] serde_json::Error),

    /// The configuration file could not be read
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration value is out of range
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Discovery error: {0}")]
    Discovery(#[from] cast_discovery::DiscoveryError),

    #[error("Controller error: {0}")]
    Controller(#[from] cast_session::ControllerError),
}

pub type Result<T> = std::result::Result<T, SensorError>;
