//! # Cast Sensor
//!
//! Exposes whether a cast device is currently casting as a home-automation
//! accessory: a switch and a motion sensor that mirror each other, a volume
//! level and a few read-only identity strings.
//!
//! ```rust,ignore
//! use cast_sensor::{AccessoryConfig, CastSensor};
//!
//! let config = AccessoryConfig::from_json(
//!     r#"{"name":"Lounge Casting","chromecastDeviceName":"Lounge","switchOffDelay":5000}"#,
//! )?;
//! let sensor = CastSensor::start(config)?;
//!
//! if sensor.is_casting() {
//!     sensor.set_volume(30);
//! }
//! ```
//!
//! Devices are reached with [`cast_session::CastV2Connector`]. Hosts that
//! bring their own protocol client use [`CastSensor::start_with_connector`].

mod config;
mod error;
mod sensor;

pub use config::AccessoryConfig;
pub use error::{Result, SensorError};
pub use sensor::CastSensor;

pub use cast_session::logging;
pub use cast_session::{
    AccessoryHandle, CastConnection, CastConnector, CastV2Connector, ConnectionState, DeviceIdentity,
    MediaChannel, StopBehavior,
};
