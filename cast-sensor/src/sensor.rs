//! CastSensor - one accessory bound to one cast device

use std::ops::Deref;
use std::sync::Arc;

use cast_discovery::{DiscoveryWatcher, MdnsBrowser, ServiceBrowser};
use cast_session::{AccessoryHandle, CastConnector, CastV2Connector, DeviceController};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::AccessoryConfig;
use crate::error::Result;

/// A running accessory.
///
/// Dereferences to its [`AccessoryHandle`], so the casting, motion, volume
/// and identity surfaces are read directly from the sensor.
///
/// # Example
///
/// ```rust,ignore
/// let config = AccessoryConfig::from_file("accessory.json")?;
/// let sensor = CastSensor::start(config)?;
///
/// let mut casting = sensor.watch_casting();
/// while casting.changed().await.is_ok() {
///     println!("{}: {}", sensor.name(), *casting.borrow());
/// }
/// ```
pub struct CastSensor {
    name: String,
    accessory: AccessoryHandle,
    controller: Option<JoinHandle<()>>,
}

impl CastSensor {
    /// Start following the configured device, discovering it over mDNS and
    /// talking to it over the cast v2 protocol.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: AccessoryConfig) -> Result<Self> {
        Self::start_with_connector(config, Arc::new(CastV2Connector::new()))
    }

    /// Start with mDNS discovery and a caller-provided connector.
    pub fn start_with_connector(
        config: AccessoryConfig,
        connector: Arc<dyn CastConnector>,
    ) -> Result<Self> {
        let browser = Arc::new(MdnsBrowser::new()?);
        Self::start_with_browser(config, browser, connector)
    }

    /// Start with a caller-provided service browser.
    pub fn start_with_browser(
        config: AccessoryConfig,
        browser: Arc<dyn ServiceBrowser>,
        connector: Arc<dyn CastConnector>,
    ) -> Result<Self> {
        config.validate()?;

        let discovery = DiscoveryWatcher::new(config.watcher_config(), browser).start();
        let (controller, accessory) =
            DeviceController::new(config.controller_config(), connector, discovery)?;

        info!(
            accessory = %config.name,
            device = %config.device_name,
            "Starting cast sensor"
        );

        Ok(Self {
            name: config.name,
            accessory,
            controller: Some(controller.spawn()),
        })
    }

    /// Accessory name from the configuration.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A cloneable handle onto the accessory surfaces.
    pub fn handle(&self) -> AccessoryHandle {
        self.accessory.clone()
    }

    /// Stop the controller and wait for it to finish. Safe to call twice.
    pub async fn shutdown(&mut self) {
        self.accessory.shutdown();
        if let Some(controller) = self.controller.take() {
            if let Err(e) = controller.await {
                debug!(error = %e, "Controller task ended abnormally");
            }
            info!(accessory = %self.name, "Cast sensor stopped");
        }
    }
}

impl Deref for CastSensor {
    type Target = AccessoryHandle;

    fn deref(&self) -> &Self::Target {
        &self.accessory
    }
}

impl Drop for CastSensor {
    fn drop(&mut self) {
        self.accessory.shutdown();
    }
}
