//! Service browser seam and its mDNS implementation.
//!
//! The watcher only needs "start browsing a service type and give me a
//! stream of resolved services" and "stop browsing". [`MdnsBrowser`]
//! provides that with `mdns-sd`, which needs no system daemon.

use std::collections::HashMap;
use std::net::IpAddr;
use std::thread;

use mdns_sd::{ResolvedService, ScopedIp, ServiceDaemon, ServiceEvent};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::device::{ServiceAnnouncement, ATTR_DEVICE_ID, ATTR_FRIENDLY_NAME, ATTR_MODEL};
use crate::error::{DiscoveryError, Result};

/// Source of "service appeared" events.
///
/// Every call to `browse` starts a fresh browse operation and returns a new
/// stream; the previous stream is abandoned by the caller. The stream ends
/// when browsing stops.
pub trait ServiceBrowser: Send + Sync {
    /// Start browsing for `service_type`.
    fn browse(&self, service_type: &str) -> Result<mpsc::UnboundedReceiver<ServiceAnnouncement>>;

    /// Stop browsing for `service_type`. Stopping an inactive browse is not an error.
    fn stop_browse(&self, service_type: &str) -> Result<()>;
}

/// [`ServiceBrowser`] backed by an in-process `mdns-sd` daemon.
pub struct MdnsBrowser {
    daemon: ServiceDaemon,
}

impl MdnsBrowser {
    /// Start the mDNS daemon.
    pub fn new() -> Result<Self> {
        let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::Daemon(e.to_string()))?;
        Ok(Self { daemon })
    }
}

impl ServiceBrowser for MdnsBrowser {
    fn browse(&self, service_type: &str) -> Result<mpsc::UnboundedReceiver<ServiceAnnouncement>> {
        let receiver = self
            .daemon
            .browse(service_type)
            .map_err(|e| DiscoveryError::Browse(format!("failed to browse {}: {}", service_type, e)))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let browsed_type = service_type.to_string();

        // mdns-sd hands out a blocking receiver; pump it from a plain thread.
        thread::Builder::new()
            .name("mdns-browse".to_string())
            .spawn(move || {
                while let Ok(event) = receiver.recv() {
                    match event {
                        ServiceEvent::ServiceResolved(service) => {
                            let announcement = announcement_from_resolved(&service);
                            if tx.send(announcement).is_err() {
                                break;
                            }
                        }
                        ServiceEvent::SearchStopped(stopped) => {
                            debug!("mDNS browse for {} stopped", stopped);
                            break;
                        }
                        _ => {}
                    }
                }
                debug!("mDNS browse pump for {} exited", browsed_type);
            })
            .map_err(|e| DiscoveryError::Browse(format!("failed to spawn browse thread: {}", e)))?;

        Ok(rx)
    }

    fn stop_browse(&self, service_type: &str) -> Result<()> {
        self.daemon
            .stop_browse(service_type)
            .map_err(|e| DiscoveryError::Browse(format!("failed to stop browsing {}: {}", service_type, e)))
    }
}

impl Drop for MdnsBrowser {
    fn drop(&mut self) {
        if let Err(e) = self.daemon.shutdown() {
            warn!("mDNS daemon did not shut down cleanly: {}", e);
        }
    }
}

fn announcement_from_resolved(service: &ResolvedService) -> ServiceAnnouncement {
    build_announcement(
        service.get_fullname(),
        service.get_addresses().iter().map(ScopedIp::to_ip_addr),
        service.get_port(),
        |key| service.get_property_val_str(key),
    )
}

/// Both address families are kept; IPv4 preference is applied later by
/// [`ServiceAnnouncement::preferred_address`].
fn build_announcement<'a>(
    fullname: &str,
    addresses: impl IntoIterator<Item = IpAddr>,
    port: u16,
    attribute: impl Fn(&str) -> Option<&'a str>,
) -> ServiceAnnouncement {
    let mut attributes = HashMap::new();
    for key in [ATTR_FRIENDLY_NAME, ATTR_MODEL, ATTR_DEVICE_ID] {
        if let Some(value) = attribute(key) {
            attributes.insert(key.to_string(), value.to_string());
        }
    }

    ServiceAnnouncement {
        fullname: fullname.to_string(),
        addresses: addresses.into_iter().collect(),
        port,
        attributes,
    }
}
