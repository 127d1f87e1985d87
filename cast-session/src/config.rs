//! Configuration types for the cast-session crate
//!
//! [`ControllerConfig`] controls how the device controller debounces the
//! casting signal, how aggressively it reconnects, and what the host may do
//! to the device (volume, stop vs pause).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ControllerError, Result};

/// Upper bound for every configured delay and timeout.
pub const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// What turning the casting switch off does to the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopBehavior {
    /// Stop the media session
    #[default]
    Stop,
    /// Pause the media session
    Pause,
}

/// Configuration for the DeviceController
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Delay before a casting=false observation is published
    /// Default: zero (publish immediately)
    pub switch_off_delay: Duration,

    /// Delay before reconnecting after a failure that warrants backing off
    /// Default: 2 seconds
    pub reconnect_delay: Duration,

    /// Consecutive failures tolerated before falling back to discovery
    /// Default: 150
    pub reconnect_ceiling: u32,

    /// How long a connection must stay up before the failure counter resets
    /// Default: 10 seconds. Zero resets on every successful connect.
    pub stable_connection: Duration,

    /// Upper bound on a single connection attempt
    /// Default: 10 seconds
    pub connect_timeout: Duration,

    /// Whether host volume changes are forwarded to the device
    /// Default: true
    pub volume_control: bool,

    /// Action taken when the host turns casting off
    /// Default: Stop
    pub stop_behavior: StopBehavior,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            switch_off_delay: Duration::ZERO,
            reconnect_delay: Duration::from_secs(2),
            reconnect_ceiling: 150,
            stable_connection: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            volume_control: true,
            stop_behavior: StopBehavior::Stop,
        }
    }
}

impl ControllerConfig {
    /// Create a new ControllerConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ControllerConfig that hides short pauses between tracks
    pub fn smoothed() -> Self {
        Self {
            switch_off_delay: Duration::from_secs(5),
            ..Default::default()
        }
    }

    /// Create a ControllerConfig that gives up on an address quickly
    pub fn fast_rediscovery() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(1),
            reconnect_ceiling: 5,
            ..Default::default()
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if self.reconnect_ceiling == 0 {
            return Err(ControllerError::Configuration(
                "Reconnect ceiling must be greater than 0".to_string(),
            ));
        }

        if self.connect_timeout == Duration::ZERO {
            return Err(ControllerError::Configuration(
                "Connect timeout must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("Switch-off delay", self.switch_off_delay),
            ("Reconnect delay", self.reconnect_delay),
            ("Stable connection window", self.stable_connection),
            ("Connect timeout", self.connect_timeout),
        ] {
            if value > MAX_DELAY {
                return Err(ControllerError::Configuration(format!(
                    "{name} must not exceed {}s",
                    MAX_DELAY.as_secs()
                )));
            }
        }

        Ok(())
    }

    pub fn with_switch_off_delay(mut self, delay: Duration) -> Self {
        self.switch_off_delay = delay;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_reconnect_ceiling(mut self, ceiling: u32) -> Self {
        self.reconnect_ceiling = ceiling;
        self
    }

    pub fn with_stable_connection(mut self, window: Duration) -> Self {
        self.stable_connection = window;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_volume_control(mut self, enabled: bool) -> Self {
        self.volume_control = enabled;
        self
    }

    pub fn with_stop_behavior(mut self, behavior: StopBehavior) -> Self {
        self.stop_behavior = behavior;
        self
    }
}
