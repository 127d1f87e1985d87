//! Service announcement parsing and device location normalization.
//!
//! A cast receiver advertises itself as `<instance>._googlecast._tcp.local.`
//! with TXT attributes. The ones used here are `fn` (friendly name), `md`
//! (model) and `id` (stable device identifier).

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::error::{DiscoveryError, Result};

/// mDNS service type advertised by cast receivers.
pub const CAST_SERVICE_TYPE: &str = "_googlecast._tcp.local.";

/// TXT attribute holding the user-visible device name.
pub const ATTR_FRIENDLY_NAME: &str = "fn";
/// TXT attribute holding the model string.
pub const ATTR_MODEL: &str = "md";
/// TXT attribute holding the stable device identifier.
pub const ATTR_DEVICE_ID: &str = "id";

/// A resolved "service appeared" event reported by a service browser.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceAnnouncement {
    /// Full mDNS instance name, e.g. `Lounge-1234._googlecast._tcp.local.`
    pub fullname: String,
    /// Resolved addresses, in no particular order
    pub addresses: Vec<IpAddr>,
    /// Port of the cast control channel (usually 8009)
    pub port: u16,
    /// Free-form TXT attributes
    pub attributes: HashMap<String, String>,
}

impl ServiceAnnouncement {
    /// Look up a TXT attribute, ignoring blank values.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// The advertised friendly name, falling back to the mDNS instance name.
    pub fn friendly_name(&self) -> String {
        self.attribute(ATTR_FRIENDLY_NAME)
            .map(ToString::to_string)
            .unwrap_or_else(|| instance_name_from_fullname(&self.fullname))
    }

    /// Case-insensitive exact match against the configured target name.
    pub fn matches_name(&self, target_name: &str) -> bool {
        self.friendly_name().to_lowercase() == target_name.trim().to_lowercase()
    }

    /// Pick the address to connect to: the lowest IPv4 address if any,
    /// otherwise the lowest IPv6 address.
    pub fn preferred_address(&self) -> Option<IpAddr> {
        let mut v4: Vec<IpAddr> = self.addresses.iter().copied().filter(IpAddr::is_ipv4).collect();
        v4.sort();
        if let Some(address) = v4.first() {
            return Some(*address);
        }

        let mut v6: Vec<IpAddr> = self.addresses.iter().copied().filter(IpAddr::is_ipv6).collect();
        v6.sort();
        v6.first().copied()
    }

    /// Convert the announcement into a [`DeviceLocation`].
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::InvalidAnnouncement` if the service resolved
    /// without any address.
    pub fn to_location(&self) -> Result<DeviceLocation> {
        let address = self.preferred_address().ok_or_else(|| {
            DiscoveryError::InvalidAnnouncement(format!("{} resolved without an address", self.fullname))
        })?;

        Ok(DeviceLocation {
            name: self.friendly_name(),
            address,
            port: self.port,
            device_type: self.attribute(ATTR_MODEL).unwrap_or_default().to_string(),
            device_id: self.attribute(ATTR_DEVICE_ID).unwrap_or_default().to_string(),
        })
    }
}

/// Identity and location of one physical cast device.
///
/// Replaced wholesale whenever the device shows up somewhere else; never
/// partially updated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLocation {
    /// Friendly name, as advertised
    pub name: String,
    /// Address to connect to
    pub address: IpAddr,
    /// Port of the cast control channel
    pub port: u16,
    /// Model string (`md`), empty when not advertised
    pub device_type: String,
    /// Stable device identifier (`id`), empty when not advertised
    pub device_id: String,
}

impl DeviceLocation {
    /// Socket address of the control channel.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// `address:port` as shown on the identity surface.
    pub fn display_address(&self) -> String {
        self.socket_addr().to_string()
    }

    /// Whether two locations point at the same control channel.
    pub fn same_endpoint(&self, other: &DeviceLocation) -> bool {
        self.address == other.address && self.port == other.port
    }
}

/// Strip the service suffix from a full mDNS instance name.
///
/// `"Lounge-1234._googlecast._tcp.local."` becomes `"Lounge-1234"`.
pub fn instance_name_from_fullname(fullname: &str) -> String {
    let trimmed = fullname.trim();
    trimmed
        .strip_suffix(CAST_SERVICE_TYPE)
        .map(|value| value.trim_end_matches('.'))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(trimmed)
        .trim_matches('.')
        .to_string()
}
