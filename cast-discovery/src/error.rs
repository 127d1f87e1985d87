//! Error types for the discovery system.

use thiserror::Error;

/// Error type for discovery operations.
///
/// Browse failures are never fatal to the watcher: they are logged and the
/// next periodic restart tries again. These variants exist so that browser
/// implementations and callers can report what went wrong.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The mDNS daemon could not be created or has shut down
    #[error("mDNS daemon error: {0}")]
    Daemon(String),

    /// Starting or stopping a browse operation failed
    #[error("Browse error: {0}")]
    Browse(String),

    /// A service announcement could not be turned into a device location
    #[error("Invalid announcement: {0}")]
    InvalidAnnouncement(String),

    /// Invalid watcher configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The watcher task is no longer running
    #[error("Discovery watcher has stopped")]
    WatcherStopped,
}

/// Convenience Result type alias for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;
