//! MAAS API types and data structures.
//!
//! These mirror the JSON returned by the MAAS REST API. Only the fields the
//! reconciler consumes are modelled; everything else is ignored on decode.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Type-specific interface parameters as returned by MAAS.
///
/// MAAS omits keys depending on interface type and server version, and
/// returns an empty string instead of an object for interfaces without
/// parameters, so presence of a key carries meaning on its own.
pub type ParamsBlob = serde_json::Map<String, serde_json::Value>;

/// Power parameters of a machine (BMC address, credentials, ...).
pub type PowerParameters = BTreeMap<String, serde_json::Value>;

/// A machine known to MAAS.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Machine {
    /// Canonical system ID.
    pub system_id: String,
    /// Short hostname.
    #[serde(default)]
    pub hostname: String,
    /// Fully-qualified domain name.
    #[serde(default)]
    pub fqdn: String,
    /// Power driver name (`ipmi`, `virsh`, ...).
    #[serde(default)]
    pub power_type: String,
    /// Architecture, e.g. `amd64/generic`.
    #[serde(default)]
    pub architecture: String,
    /// Minimum HWE kernel.
    #[serde(default)]
    pub min_hwe_kernel: Option<String>,
    /// Interface the machine PXE boots from.
    #[serde(default)]
    pub boot_interface: Option<BootInterface>,
    /// DNS domain.
    #[serde(default)]
    pub domain: Option<NamedRef>,
    /// Availability zone.
    #[serde(default)]
    pub zone: Option<NamedRef>,
    /// Resource pool.
    #[serde(default)]
    pub pool: Option<NamedRef>,
}

/// The subset of the boot interface we care about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BootInterface {
    /// Boot MAC address.
    #[serde(default)]
    pub mac_address: String,
}

/// A reference to a named MAAS object (domain, zone, pool).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamedRef {
    /// Object name.
    pub name: String,
}

/// A network interface attached to a machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkInterface {
    /// Interface ID, scoped to its machine.
    pub id: i64,
    /// Interface name.
    pub name: String,
    /// Interface type (`physical`, `bond`, `bridge`, `vlan`).
    #[serde(rename = "type", default)]
    pub interface_type: String,
    /// MAC address.
    #[serde(default)]
    pub mac_address: String,
    /// Effective MTU.
    #[serde(default)]
    pub effective_mtu: i64,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Parent interface names.
    #[serde(default)]
    pub parents: Vec<String>,
    /// VLAN this interface is connected to.
    #[serde(default)]
    pub vlan: Option<InterfaceVlan>,
    /// Accept router advertisements (IPv6).
    #[serde(default)]
    pub accept_ra: bool,
    /// Stateless autoconfiguration (IPv6).
    #[serde(default)]
    pub autoconf: bool,
    /// Type-specific parameters; key presence is not guaranteed.
    #[serde(default, deserialize_with = "params_blob")]
    pub params: ParamsBlob,
}

/// The VLAN reference embedded in an interface.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct InterfaceVlan {
    /// VLAN ID.
    pub id: i64,
    /// VLAN tag.
    pub vid: i64,
    /// Owning fabric ID.
    #[serde(default)]
    pub fabric_id: i64,
}

/// A network fabric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fabric {
    /// Fabric ID.
    pub id: i64,
    /// Fabric name.
    pub name: String,
}

/// A VLAN within a fabric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vlan {
    /// VLAN ID, assigned by MAAS.
    pub id: i64,
    /// VLAN tag.
    pub vid: i64,
    /// VLAN name.
    #[serde(default)]
    pub name: String,
    /// Owning fabric ID.
    #[serde(default)]
    pub fabric_id: i64,
}

impl Machine {
    /// Returns the PXE boot MAC address, if the machine has a boot interface.
    #[must_use]
    pub fn pxe_mac_address(&self) -> Option<&str> {
        self.boot_interface
            .as_ref()
            .map(|b| b.mac_address.as_str())
            .filter(|mac| !mac.is_empty())
    }
}

impl NetworkInterface {
    /// Returns the first parent, which is the one a bridge or VLAN hangs off.
    #[must_use]
    pub fn first_parent(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }

    /// Reads an integer parameter, accepting any JSON number.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn param_i64(&self, key: &str) -> Option<i64> {
        self.params.get(key).and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_f64().map(|f| f.round() as i64))
        })
    }

    /// Reads a boolean parameter.
    #[must_use]
    pub fn param_bool(&self, key: &str) -> Option<bool> {
        self.params.get(key).and_then(serde_json::Value::as_bool)
    }

    /// Reads a string parameter.
    #[must_use]
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(serde_json::Value::as_str)
    }
}

/// Accepts an object, `null` or `""` for the interface `params` field.
fn params_blob<'de, D>(deserializer: D) -> std::result::Result<ParamsBlob, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Object(map)) => map,
        _ => ParamsBlob::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_with_empty_string_params() {
        let json = r#"{
            "id": 12,
            "name": "bond0",
            "type": "bond",
            "mac_address": "52:54:00:89:f5:3e",
            "effective_mtu": 9000,
            "tags": [],
            "parents": ["eno1", "eno2"],
            "vlan": {"id": 5001, "vid": 0, "fabric_id": 1},
            "params": ""
        }"#;

        let iface: NetworkInterface = serde_json::from_str(json).expect("decode");
        assert!(iface.params.is_empty());
        assert_eq!(iface.first_parent(), Some("eno1"));
        assert_eq!(iface.vlan.map(|v| v.vid), Some(0));
    }

    #[test]
    fn test_param_accessors_distinguish_absence() {
        let json = r#"{
            "id": 7,
            "name": "cloud-brmgmt",
            "params": {"bridge_fd": 15.0, "bridge_type": "standard"}
        }"#;

        let iface: NetworkInterface = serde_json::from_str(json).expect("decode");
        assert_eq!(iface.param_i64("bridge_fd"), Some(15));
        assert_eq!(iface.param_str("bridge_type"), Some("standard"));
        assert_eq!(iface.param_bool("bridge_stp"), None);
        assert!(iface.vlan.is_none());
    }

    #[test]
    fn test_machine_pxe_mac() {
        let json = r#"{
            "system_id": "mq4s3r",
            "hostname": "test-virsh-vm1",
            "fqdn": "test-virsh-vm1.maas",
            "boot_interface": {"mac_address": "52:54:00:89:f5:3e"},
            "zone": {"name": "default"}
        }"#;

        let machine: Machine = serde_json::from_str(json).expect("decode");
        assert_eq!(machine.pxe_mac_address(), Some("52:54:00:89:f5:3e"));
        assert_eq!(machine.zone.map(|z| z.name).as_deref(), Some("default"));
        assert!(machine.pool.is_none());
    }
}
