//! # Cast Session
//!
//! Keeps one cast device connected and turns its status into a single
//! debounced "is something casting" signal.
//!
//! The [`DeviceController`] consumes discovery events for its device, opens
//! a session through a [`CastConnector`], joins whatever application is in
//! the foreground and watches its media status. Failures are retried against
//! the last known address; after too many consecutive failures the
//! controller falls back to discovery. The host reads and commands the device
//! through an [`AccessoryHandle`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cast_discovery::{DiscoveryWatcher, MdnsBrowser, WatcherConfig};
//! use cast_session::{CastV2Connector, ControllerConfig, DeviceController};
//!
//! let browser = Arc::new(MdnsBrowser::new()?);
//! let discovery = DiscoveryWatcher::new(WatcherConfig::new("Lounge"), browser).start();
//! let (controller, accessory) =
//!     DeviceController::new(ControllerConfig::default(), Arc::new(CastV2Connector::new()), discovery)?;
//! controller.spawn();
//!
//! let mut casting = accessory.watch_casting();
//! while casting.changed().await.is_ok() {
//!     println!("casting: {}", *casting.borrow());
//! }
//! ```

pub mod accessory;
pub mod castv2;
pub mod client;
mod config;
mod controller;
mod error;
pub mod fusion;
pub mod logging;
pub mod publisher;
pub mod session;
pub mod status;
pub mod supervisor;

pub use accessory::{AccessoryHandle, DeviceIdentity, LinkStatus};
pub use castv2::CastV2Connector;
pub use client::{CastConnection, CastConnector, ConnectionEvent, MediaChannel};
pub use config::{ControllerConfig, StopBehavior, MAX_DELAY};
pub use controller::DeviceController;
pub use error::{ClientError, ControllerError, FailureKind, Result};
pub use fusion::{ReceiverUpdate, StatusFusion};
pub use publisher::{CastingObserver, CastingStatePublisher};
pub use session::{MediaSession, SessionClient, SessionEvent, SessionMessage};
pub use status::{
    Application, CastingApplication, MediaStatus, PlayerState, ReceiverStatus, VolumeStatus,
};
pub use supervisor::{ConnectionState, Generation, NextStep, ReconnectPolicy, ReconnectSupervisor};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        AccessoryHandle, CastConnection, CastConnector, CastV2Connector, ClientError, ConnectionState,
        ControllerConfig, DeviceController, MediaChannel, StopBehavior,
    };
}
