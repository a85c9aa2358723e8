//! Parameter builder for interface create/update calls.
//!
//! Turns a validated desired-state entry plus resolved parent identifiers
//! into the exact payload MAAS expects. The bridge and VLAN endpoints
//! encode tags differently (comma-joined string vs repeated list) and that
//! difference is kept here rather than papered over.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::config::{BridgeSpec, VlanSpec};

/// Parameters for `create_bridge` and bridge updates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BridgeParams {
    /// Interface name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// MAC address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    /// Comma-joined, sorted tag list.
    pub tags: String,
    /// VLAN ID the bridge is connected to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vlan: Option<String>,
    /// MTU.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<i64>,
    /// Accept router advertisements.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept_ra: Option<bool>,
    /// Stateless autoconfiguration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autoconf: Option<bool>,
    /// Parent interface ID.
    pub parent: i64,
    /// Bridge type (`standard` or `ovs`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge_type: Option<String>,
    /// Spanning tree protocol.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge_stp: Option<bool>,
    /// Forward delay in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge_fd: Option<i64>,
}

/// Parameters for `create_vlan` and VLAN interface updates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VlanParams {
    /// VLAN ID (not the tag).
    pub vlan: String,
    /// Parent interface ID.
    pub parent: i64,
    /// Sorted tag list, sent as repeated `tags` keys.
    pub tags: Vec<String>,
    /// MTU.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<i64>,
    /// Accept router advertisements.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept_ra: Option<bool>,
}

/// Builds bridge parameters from the desired state and the resolved parent.
#[must_use]
pub fn build_bridge_params(desired: &BridgeSpec, parent_id: i64) -> BridgeParams {
    BridgeParams {
        name: desired.name.clone(),
        mac_address: desired.mac_address.clone(),
        tags: join_tags(&desired.tags),
        vlan: desired.vlan.clone(),
        mtu: desired.mtu,
        accept_ra: desired.accept_ra,
        autoconf: desired.autoconf,
        parent: parent_id,
        bridge_type: desired.bridge_type.clone(),
        bridge_stp: desired.bridge_stp,
        bridge_fd: desired.bridge_fd,
    }
}

/// Builds VLAN interface parameters.
///
/// `vlan_id` is the MAAS VLAN ID resolved from the desired tag, not the tag.
#[must_use]
pub fn build_vlan_params(desired: &VlanSpec, parent_id: i64, vlan_id: &str) -> VlanParams {
    VlanParams {
        vlan: vlan_id.to_string(),
        parent: parent_id,
        tags: desired.tags.iter().cloned().collect(),
        mtu: desired.mtu,
        accept_ra: desired.accept_ra,
    }
}

/// Joins a tag set into the comma-separated form used by the bridge endpoint.
#[must_use]
pub fn join_tags(tags: &BTreeSet<String>) -> String {
    tags.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

/// Splits a comma-joined tag string back into a set.
#[must_use]
pub fn split_tags(tags: &str) -> BTreeSet<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

impl BridgeParams {
    /// Encodes the parameters as form fields.
    #[must_use]
    pub fn to_form(&self) -> Vec<(&'static str, String)> {
        let mut form = Vec::new();
        push_opt(&mut form, "name", self.name.as_ref());
        push_opt(&mut form, "mac_address", self.mac_address.as_ref());
        form.push(("tags", self.tags.clone()));
        push_opt(&mut form, "vlan", self.vlan.as_ref());
        push_opt(&mut form, "mtu", self.mtu.as_ref());
        push_opt(&mut form, "accept_ra", self.accept_ra.as_ref());
        push_opt(&mut form, "autoconf", self.autoconf.as_ref());
        form.push(("parent", self.parent.to_string()));
        push_opt(&mut form, "bridge_type", self.bridge_type.as_ref());
        push_opt(&mut form, "bridge_stp", self.bridge_stp.as_ref());
        push_opt(&mut form, "bridge_fd", self.bridge_fd.as_ref());
        form
    }
}

impl VlanParams {
    /// Encodes the parameters as form fields; each tag is its own field.
    #[must_use]
    pub fn to_form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("vlan", self.vlan.clone()),
            ("parent", self.parent.to_string()),
        ];
        form.extend(self.tags.iter().map(|t| ("tags", t.clone())));
        push_opt(&mut form, "mtu", self.mtu.as_ref());
        push_opt(&mut form, "accept_ra", self.accept_ra.as_ref());
        form
    }
}

fn push_opt<T: ToString>(form: &mut Vec<(&'static str, String)>, key: &'static str, value: Option<&T>) {
    if let Some(value) = value {
        form.push((key, value.to_string()));
    }
}
