//! Accessory configuration.
//!
//! One JSON block configures one accessory:
//!
//! ```json
//! {
//!   "accessory": "CastSensor",
//!   "name": "Lounge Casting",
//!   "chromecastDeviceName": "Lounge",
//!   "switchOffDelay": 5000,
//!   "volumeControl": true,
//!   "stopBehavior": "pause"
//! }
//! ```
//!
//! Durations are milliseconds. Unknown keys are ignored so host-specific
//! fields can sit next to ours.

use std::path::{Path, PathBuf};
use std::time::Duration;

use cast_discovery::WatcherConfig;
use cast_session::{ControllerConfig, StopBehavior};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SensorError};

const DEFAULT_RECONNECT_DELAY_MS: u64 = 2_000;
const DEFAULT_RECONNECT_CEILING: u32 = 150;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessoryConfig {
    /// Accessory name shown by the host
    pub name: String,

    /// Friendly name of the cast device to follow
    #[serde(rename = "chromecastDeviceName")]
    pub device_name: String,

    #[serde(default)]
    pub switch_off_delay: u64,

    #[serde(default = "default_true")]
    pub volume_control: bool,

    #[serde(default = "default_reconnect_ceiling")]
    pub reconnect_ceiling: u32,

    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay: u64,

    #[serde(default)]
    pub stop_behavior: StopBehavior,

    /// Minutes between discovery restarts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rescan_interval: Option<u64>,
}

fn default_true() -> bool {
    true
}

fn default_reconnect_ceiling() -> u32 {
    DEFAULT_RECONNECT_CEILING
}

fn default_reconnect_delay() -> u64 {
    DEFAULT_RECONNECT_DELAY_MS
}

impl AccessoryConfig {
    pub fn new(name: impl Into<String>, device_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device_name: device_name.into(),
            switch_off_delay: 0,
            volume_control: true,
            reconnect_ceiling: DEFAULT_RECONNECT_CEILING,
            reconnect_delay: DEFAULT_RECONNECT_DELAY_MS,
            stop_behavior: StopBehavior::Stop,
            rescan_interval: None,
        }
    }

    /// Parse and validate a JSON accessory block.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON accessory block from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// `<config dir>/cast-sensor/accessory.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cast-sensor").join("accessory.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SensorError::Configuration(
                "Accessory name must not be empty".to_string(),
            ));
        }

        if self.device_name.trim().is_empty() {
            return Err(SensorError::Configuration(
                "chromecastDeviceName must not be empty".to_string(),
            ));
        }

        if self.rescan_interval == Some(0) {
            return Err(SensorError::Configuration(
                "rescanInterval must be greater than 0".to_string(),
            ));
        }
        self.rescan_period()?;

        self.controller_config().validate()?;
        self.watcher_config().validate()?;
        Ok(())
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig::default()
            .with_switch_off_delay(Duration::from_millis(self.switch_off_delay))
            .with_reconnect_delay(Duration::from_millis(self.reconnect_delay))
            .with_reconnect_ceiling(self.reconnect_ceiling)
            .with_volume_control(self.volume_control)
            .with_stop_behavior(self.stop_behavior)
    }

    /// Watcher settings. An out of range `rescanInterval` saturates here and
    /// is rejected by [`AccessoryConfig::validate`].
    pub fn watcher_config(&self) -> WatcherConfig {
        let config = WatcherConfig::new(self.device_name.clone());
        match self.rescan_interval {
            Some(minutes) => config.with_rescan_interval(Duration::from_secs(minutes.saturating_mul(60))),
            None => config,
        }
    }

    fn rescan_period(&self) -> Result<Option<Duration>> {
        self.rescan_interval
            .map(|minutes| {
                minutes
                    .checked_mul(60)
                    .map(Duration::from_secs)
                    .ok_or_else(|| {
                        SensorError::Configuration(format!(
                            "rescanInterval of {minutes} minutes is out of range"
                        ))
                    })
            })
            .transpose()
    }
}
