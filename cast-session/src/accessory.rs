//! Host-facing surfaces of a controlled device.
//!
//! The controller publishes into [`PublishedState`]; the host reads and
//! commands through an [`AccessoryHandle`]. State travels over `watch`
//! channels so readers always see the latest value without blocking the
//! controller. Commands are acknowledged as soon as they are queued; their
//! outcome on the device only ever shows up in logs and later status.

use std::sync::Arc;

use cast_discovery::DeviceLocation;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::publisher::CastingObserver;
use crate::supervisor::ConnectionState;

/// Identity of the device as shown to the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub name: String,
    pub device_type: String,
    /// `ip:port`
    pub device_address: String,
    pub device_id: String,
}

impl From<&DeviceLocation> for DeviceIdentity {
    fn from(location: &DeviceLocation) -> Self {
        Self {
            name: location.name.clone(),
            device_type: location.device_type.clone(),
            device_address: location.display_address(),
            device_id: location.device_id.clone(),
        }
    }
}

/// Connection state together with the consecutive failure count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStatus {
    pub state: ConnectionState,
    pub failures: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    SetCasting(bool),
    SetVolume(u8),
    Disconnect,
    Shutdown,
}

/// Convert a device volume level in `[0, 1]` to a host percentage.
pub fn level_to_percent(level: f32) -> u8 {
    (level.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Convert a host percentage to a device volume level.
pub fn percent_to_level(percent: u8) -> f32 {
    f32::from(percent.min(100)) / 100.0
}

struct WatchObserver(watch::Sender<bool>);

impl CastingObserver for WatchObserver {
    fn casting_changed(&self, casting: bool) {
        self.0.send_replace(casting);
    }
}

/// Writer side of the accessory surfaces, owned by the controller.
pub(crate) struct PublishedState {
    volume: watch::Sender<u8>,
    identity: watch::Sender<Option<DeviceIdentity>>,
    link: watch::Sender<LinkStatus>,
}

impl PublishedState {
    pub(crate) fn publish_volume(&self, percent: u8) {
        self.volume.send_if_modified(|current| {
            if *current == percent {
                false
            } else {
                debug!(percent, "Volume changed");
                *current = percent;
                true
            }
        });
    }

    pub(crate) fn publish_identity(&self, identity: DeviceIdentity) {
        self.identity.send_if_modified(|current| {
            if current.as_ref() == Some(&identity) {
                false
            } else {
                *current = Some(identity);
                true
            }
        });
    }

    pub(crate) fn publish_link(&self, status: LinkStatus) {
        self.link.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

/// Host handle onto one controlled device.
#[derive(Debug, Clone)]
pub struct AccessoryHandle {
    commands: mpsc::UnboundedSender<Command>,
    switch: watch::Receiver<bool>,
    motion: watch::Receiver<bool>,
    volume: watch::Receiver<u8>,
    identity: watch::Receiver<Option<DeviceIdentity>>,
    link: watch::Receiver<LinkStatus>,
}

impl AccessoryHandle {
    /// Switch surface value.
    pub fn is_casting(&self) -> bool {
        *self.switch.borrow()
    }

    /// Motion surface value. Mirrors the switch.
    pub fn motion_detected(&self) -> bool {
        *self.motion.borrow()
    }

    pub fn volume_percent(&self) -> u8 {
        *self.volume.borrow()
    }

    /// Identity of the last discovered device, if any.
    pub fn identity(&self) -> Option<DeviceIdentity> {
        self.identity.borrow().clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.link.borrow().state
    }

    pub fn link_status(&self) -> LinkStatus {
        *self.link.borrow()
    }

    pub fn watch_casting(&self) -> watch::Receiver<bool> {
        self.switch.clone()
    }

    pub fn watch_motion(&self) -> watch::Receiver<bool> {
        self.motion.clone()
    }

    pub fn watch_volume(&self) -> watch::Receiver<u8> {
        self.volume.clone()
    }

    pub fn watch_link(&self) -> watch::Receiver<LinkStatus> {
        self.link.clone()
    }

    /// Ask the device to start or stop casting.
    pub fn set_casting(&self, on: bool) {
        self.send(Command::SetCasting(on));
    }

    /// Ask the device to change volume. Values above 100 are clamped.
    pub fn set_volume(&self, percent: u8) {
        self.send(Command::SetVolume(percent.min(100)));
    }

    /// Drop the current connection and wait for the next discovery match.
    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    /// Stop the controller. Safe to call more than once.
    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!(?command, "Controller stopped, command dropped");
        }
    }
}

/// Create the surfaces for one device.
///
/// Returns the controller side, the two casting observers (switch and
/// motion), the host handle and the command receiver.
pub(crate) fn surfaces() -> (
    PublishedState,
    [Arc<dyn CastingObserver>; 2],
    AccessoryHandle,
    mpsc::UnboundedReceiver<Command>,
) {
    let (commands, command_rx) = mpsc::unbounded_channel();
    let (switch_tx, switch) = watch::channel(false);
    let (motion_tx, motion) = watch::channel(false);
    let (volume_tx, volume) = watch::channel(0);
    let (identity_tx, identity) = watch::channel(None);
    let (link_tx, link) = watch::channel(LinkStatus::default());

    let state = PublishedState {
        volume: volume_tx,
        identity: identity_tx,
        link: link_tx,
    };
    let observers: [Arc<dyn CastingObserver>; 2] = [
        Arc::new(WatchObserver(switch_tx)),
        Arc::new(WatchObserver(motion_tx)),
    ];
    let handle = AccessoryHandle {
        commands,
        switch,
        motion,
        volume,
        identity,
        link,
    };

    (state, observers, handle, command_rx)
}
