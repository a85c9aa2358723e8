//! Manifest types describing the desired state.
//!
//! This module defines the structs that map to `maas-netif.yaml`. Optional
//! fields left unset are omitted from requests so MAAS applies its own
//! defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Default MAAS API version.
pub const DEFAULT_API_VERSION: &str = "2.0";

/// The root manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    /// MAAS endpoint configuration.
    pub maas: MaasConfig,
    /// State file configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// Bridge interfaces to manage.
    #[serde(default)]
    pub bridges: Vec<BridgeSpec>,
    /// VLAN interfaces to manage.
    #[serde(default)]
    pub vlans: Vec<VlanSpec>,
    /// Read-only machine lookups.
    #[serde(default)]
    pub machines: Vec<MachineQuery>,
}

/// MAAS endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MaasConfig {
    /// Base URL, e.g. `http://maas.example:5240/MAAS`.
    pub url: String,
    /// API version path segment.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries for idempotent reads on transport failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// State file configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// Path of the state file.
    #[serde(default)]
    pub path: Option<String>,
}

/// Desired state of a bridge interface.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgeSpec {
    /// Resource key, unique among bridges.
    pub key: String,
    /// Machine identifier (system ID, hostname or FQDN). Changing it replaces the bridge.
    pub machine: String,
    /// Interface name. Changing it replaces the bridge.
    #[serde(default)]
    pub name: Option<String>,
    /// Parent interface name or ID.
    #[serde(default)]
    pub parent: Option<String>,
    /// Accept router advertisements (IPv6 only).
    #[serde(default)]
    pub accept_ra: Option<bool>,
    /// Stateless autoconfiguration (IPv6 only).
    #[serde(default)]
    pub autoconf: Option<bool>,
    /// Bridge forward delay in seconds.
    #[serde(default)]
    pub bridge_fd: Option<i64>,
    /// Spanning tree protocol.
    #[serde(default)]
    pub bridge_stp: Option<bool>,
    /// Bridge type: `standard` or `ovs`.
    #[serde(default)]
    pub bridge_type: Option<String>,
    /// MAC address.
    #[serde(default)]
    pub mac_address: Option<String>,
    /// Maximum transmission unit.
    #[serde(default)]
    pub mtu: Option<i64>,
    /// Tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// VLAN ID the interface is connected to.
    #[serde(default)]
    pub vlan: Option<String>,
}

/// Desired state of a VLAN interface.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VlanSpec {
    /// Resource key, unique among VLAN interfaces.
    pub key: String,
    /// Machine identifier. Changing it replaces the interface.
    pub machine: String,
    /// Parent interface name or ID.
    pub parent: String,
    /// Fabric name or ID. Changing it replaces the interface.
    pub fabric: String,
    /// VLAN tag (VID) or VLAN ID within the fabric.
    pub vlan: String,
    /// Accept router advertisements (IPv6 only).
    #[serde(default)]
    pub accept_ra: Option<bool>,
    /// Maximum transmission unit.
    #[serde(default)]
    pub mtu: Option<i64>,
    /// Tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// A read-only machine lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MachineQuery {
    /// Lookup key, unique among machine lookups.
    pub key: String,
    /// Hostname to look up.
    #[serde(default)]
    pub hostname: Option<String>,
    /// PXE boot MAC address to look up.
    #[serde(default)]
    pub pxe_mac_address: Option<String>,
}

/// Kind of managed interface resource.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Bridge interface.
    Bridge,
    /// VLAN interface.
    Vlan,
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_max_retries() -> u32 {
    3
}

impl Manifest {
    /// Finds a bridge by key.
    #[must_use]
    pub fn bridge(&self, key: &str) -> Option<&BridgeSpec> {
        self.bridges.iter().find(|b| b.key == key)
    }

    /// Finds a VLAN interface by key.
    #[must_use]
    pub fn vlan(&self, key: &str) -> Option<&VlanSpec> {
        self.vlans.iter().find(|v| v.key == key)
    }

    /// Total number of managed interfaces.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.bridges.len() + self.vlans.len()
    }
}

impl MachineQuery {
    /// Returns the single identifier this lookup resolves by.
    ///
    /// # Errors
    ///
    /// Returns an error unless exactly one of `hostname` and
    /// `pxe_mac_address` is set and non-empty.
    pub fn identifier(&self) -> std::result::Result<&str, ValidationError> {
        let hostname = self.hostname.as_deref().filter(|h| !h.trim().is_empty());
        let mac = self.pxe_mac_address.as_deref().filter(|m| !m.trim().is_empty());

        match (hostname, mac) {
            (Some(id), None) | (None, Some(id)) => Ok(id),
            _ => Err(ValidationError::ExactlyOneOf {
                fields: String::from("hostname, pxe_mac_address"),
            }),
        }
    }
}

impl ResourceKind {
    /// Returns the kind name used in state and output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bridge => "bridge",
            Self::Vlan => "vlan",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bridge" => Ok(Self::Bridge),
            "vlan" => Ok(Self::Vlan),
            other => Err(format!("unknown resource kind '{other}' (expected bridge or vlan)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_parse() {
        assert_eq!("bridge".parse::<ResourceKind>(), Ok(ResourceKind::Bridge));
        assert_eq!("VLAN".parse::<ResourceKind>(), Ok(ResourceKind::Vlan));
        assert!("bond".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_machine_query_identifier() {
        let by_host = MachineQuery {
            key: String::from("vm1"),
            hostname: Some(String::from("test-virsh-vm1")),
            pxe_mac_address: None,
        };
        assert_eq!(by_host.identifier(), Ok("test-virsh-vm1"));

        let blank_host = MachineQuery {
            hostname: Some(String::new()),
            pxe_mac_address: Some(String::from("52:54:00:89:f5:3e")),
            ..by_host.clone()
        };
        assert_eq!(blank_host.identifier(), Ok("52:54:00:89:f5:3e"));

        let neither = MachineQuery {
            key: String::from("x"),
            ..MachineQuery::default()
        };
        assert!(neither.identifier().is_err());
    }

    #[test]
    fn test_bridge_defaults() {
        let spec: BridgeSpec =
            serde_yaml::from_str("key: mgmt\nmachine: mq4s3r\n").expect("decode");
        assert!(spec.tags.is_empty());
        assert!(spec.bridge_stp.is_none());
        assert!(spec.name.is_none());
    }
}
