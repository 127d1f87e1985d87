//! Target-device watcher.
//!
//! The watcher keeps a browse operation running for the cast service type,
//! filters announcements down to the configured device name and emits a
//! [`DeviceEvent::Found`] per match. Multicast announcements get missed on
//! real networks, so the browse is torn down and restarted on a fixed
//! interval regardless of whether the device has been found. Browse
//! failures are logged and left to the next restart.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::browser::ServiceBrowser;
use crate::device::{DeviceLocation, ServiceAnnouncement, CAST_SERVICE_TYPE};
use crate::error::{DiscoveryError, Result};

/// Longest accepted rescan interval.
pub const MAX_RESCAN_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Events emitted by a running watcher.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// The target device was announced at this location
    Found(DeviceLocation),
}

/// Configuration for a [`DiscoveryWatcher`].
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Friendly name of the device to watch for (case-insensitive)
    pub target_name: String,

    /// mDNS service type to browse
    /// Default: `_googlecast._tcp.local.`
    pub service_type: String,

    /// Interval at which the browse operation is restarted
    /// Default: 30 minutes
    pub rescan_interval: Duration,

    /// Capacity of the device event channel
    /// Default: 16
    pub event_buffer_size: usize,
}

impl WatcherConfig {
    /// Create a configuration for `target_name` with default settings.
    pub fn new(target_name: impl Into<String>) -> Self {
        Self {
            target_name: target_name.into(),
            service_type: CAST_SERVICE_TYPE.to_string(),
            rescan_interval: Duration::from_secs(30 * 60),
            event_buffer_size: 16,
        }
    }

    pub fn with_rescan_interval(mut self, interval: Duration) -> Self {
        self.rescan_interval = interval;
        self
    }

    pub fn with_service_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = service_type.into();
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.target_name.trim().is_empty() {
            return Err(DiscoveryError::Configuration(
                "target device name must not be empty".to_string(),
            ));
        }
        if self.rescan_interval == Duration::ZERO {
            return Err(DiscoveryError::Configuration(
                "rescan interval must be greater than 0".to_string(),
            ));
        }
        if self.rescan_interval > MAX_RESCAN_INTERVAL {
            return Err(DiscoveryError::Configuration(
                "rescan interval must not exceed one week".to_string(),
            ));
        }
        if self.event_buffer_size == 0 {
            return Err(DiscoveryError::Configuration(
                "event buffer size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
enum WatchCommand {
    Rescan,
    Stop,
}

/// Watches the network for one named cast device.
pub struct DiscoveryWatcher {
    config: WatcherConfig,
    browser: Arc<dyn ServiceBrowser>,
}

impl DiscoveryWatcher {
    pub fn new(config: WatcherConfig, browser: Arc<dyn ServiceBrowser>) -> Self {
        Self { config, browser }
    }

    /// Spawn the watcher task on the current tokio runtime.
    pub fn start(self) -> DiscoveryHandle {
        let (event_tx, event_rx) = mpsc::channel(self.config.event_buffer_size.max(1));
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        info!(
            "Scanning for cast device with name \"{}\"",
            self.config.target_name
        );
        let task = tokio::spawn(watch_loop(self.config, self.browser, event_tx, control_rx));

        DiscoveryHandle {
            events: event_rx,
            control_tx,
            task: Some(task),
        }
    }
}

/// Handle to a running watcher.
///
/// Dropping the handle stops the watcher.
pub struct DiscoveryHandle {
    events: mpsc::Receiver<DeviceEvent>,
    control_tx: mpsc::UnboundedSender<WatchCommand>,
    task: Option<JoinHandle<()>>,
}

impl DiscoveryHandle {
    /// Wait for the next device event. Returns `None` once the watcher has stopped.
    pub async fn next(&mut self) -> Option<DeviceEvent> {
        self.events.recv().await
    }

    /// Non-blocking check for a pending device event.
    pub fn try_next(&mut self) -> Option<DeviceEvent> {
        self.events.try_recv().ok()
    }

    /// Restart the browse operation now instead of waiting for the next interval.
    pub fn rescan(&self) -> Result<()> {
        self.control_tx
            .send(WatchCommand::Rescan)
            .map_err(|_| DiscoveryError::WatcherStopped)
    }

    /// Stop the watcher. Safe to call more than once.
    pub fn stop(&mut self) {
        let _ = self.control_tx.send(WatchCommand::Stop);
        self.task.take();
    }

    /// Whether the watcher task is still alive.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }
}

impl Drop for DiscoveryHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn watch_loop(
    config: WatcherConfig,
    browser: Arc<dyn ServiceBrowser>,
    event_tx: mpsc::Sender<DeviceEvent>,
    mut control_rx: mpsc::UnboundedReceiver<WatchCommand>,
) {
    let mut browse = start_browse(browser.as_ref(), &config.service_type);
    let mut restart = interval_at(Instant::now() + config.rescan_interval, config.rescan_interval);
    restart.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            announcement = next_announcement(&mut browse) => {
                match announcement {
                    Some(announcement) => {
                        if let Some(location) = match_target(&config, &announcement) {
                            info!(
                                "Cast device \"{}\" found on {}",
                                location.name,
                                location.display_address()
                            );
                            if event_tx.send(DeviceEvent::Found(location)).await.is_err() {
                                debug!("Device event receiver dropped, stopping watcher");
                                break;
                            }
                        }
                    }
                    None => {
                        debug!("Browse stream for {} ended", config.service_type);
                        browse = None;
                    }
                }
            }

            _ = restart.tick() => {
                debug!("Periodic restart of browse for {}", config.service_type);
                browse = restart_browse(browser.as_ref(), &config.service_type);
            }

            command = control_rx.recv() => {
                match command {
                    Some(WatchCommand::Rescan) => {
                        info!("Rescanning for \"{}\"", config.target_name);
                        browse = restart_browse(browser.as_ref(), &config.service_type);
                        restart.reset();
                    }
                    Some(WatchCommand::Stop) | None => break,
                }
            }
        }
    }

    if let Err(e) = browser.stop_browse(&config.service_type) {
        debug!("Failed to stop browse on shutdown: {}", e);
    }
    debug!("Discovery watcher for \"{}\" stopped", config.target_name);
}

fn start_browse(
    browser: &dyn ServiceBrowser,
    service_type: &str,
) -> Option<mpsc::UnboundedReceiver<ServiceAnnouncement>> {
    match browser.browse(service_type) {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!("Browse for {} failed, retrying at next restart: {}", service_type, e);
            None
        }
    }
}

fn restart_browse(
    browser: &dyn ServiceBrowser,
    service_type: &str,
) -> Option<mpsc::UnboundedReceiver<ServiceAnnouncement>> {
    if let Err(e) = browser.stop_browse(service_type) {
        debug!("Failed to stop previous browse for {}: {}", service_type, e);
    }
    start_browse(browser, service_type)
}

async fn next_announcement(
    browse: &mut Option<mpsc::UnboundedReceiver<ServiceAnnouncement>>,
) -> Option<ServiceAnnouncement> {
    match browse {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}

fn match_target(config: &WatcherConfig, announcement: &ServiceAnnouncement) -> Option<DeviceLocation> {
    if !announcement.matches_name(&config.target_name) {
        return None;
    }

    match announcement.to_location() {
        Ok(location) => Some(location),
        Err(e) => {
            warn!("Ignoring announcement for \"{}\": {}", config.target_name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WatcherConfig::new("Lounge");
        assert_eq!(config.service_type, CAST_SERVICE_TYPE);
        assert_eq!(config.rescan_interval, Duration::from_secs(1800));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(WatcherConfig::new("  ").validate().is_err());
        assert!(WatcherConfig::new("Lounge")
            .with_rescan_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(WatcherConfig::new("Lounge")
            .with_rescan_interval(MAX_RESCAN_INTERVAL + Duration::from_secs(1))
            .validate()
            .is_err());
    }
}
