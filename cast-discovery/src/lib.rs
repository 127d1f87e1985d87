//! Cast device discovery
//!
//! This crate finds one named cast receiver on the local network over mDNS
//! and keeps reporting where it is, so a controller can follow the device
//! through reboots and address changes.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use cast_discovery::{DeviceEvent, DiscoveryWatcher, MdnsBrowser, WatcherConfig};
//!
//! # async fn run() -> cast_discovery::Result<()> {
//! let browser = Arc::new(MdnsBrowser::new()?);
//! let mut handle = DiscoveryWatcher::new(WatcherConfig::new("Lounge"), browser).start();
//!
//! while let Some(DeviceEvent::Found(location)) = handle.next().await {
//!     println!("{} is at {}", location.name, location.display_address());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ServiceBrowser (mDNS) → ServiceAnnouncement → name filter → DeviceEvent::Found(DeviceLocation)
//!        ↑
//!        └── restarted every `rescan_interval`, or on demand via `DiscoveryHandle::rescan`
//! ```

mod browser;
pub mod device;
mod error;
mod watcher;

pub use browser::{MdnsBrowser, ServiceBrowser};
pub use device::{DeviceLocation, ServiceAnnouncement, CAST_SERVICE_TYPE};
pub use error::{DiscoveryError, Result};
pub use watcher::{
    DeviceEvent, DiscoveryHandle, DiscoveryWatcher, WatcherConfig, MAX_RESCAN_INTERVAL,
};

/// Commonly used types
pub mod prelude {
    pub use crate::{
        DeviceEvent, DeviceLocation, DiscoveryHandle, DiscoveryWatcher, ServiceAnnouncement,
        ServiceBrowser, WatcherConfig,
    };
}
