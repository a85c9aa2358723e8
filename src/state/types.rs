//! State types for tracking managed interfaces.
//!
//! Snapshots always carry what MAAS last reported, never the manifest
//! values, so a later comparison against the manifest surfaces drift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::config::ResourceKind;
use crate::maas::PowerParameters;

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Attribute paths whose values must never be displayed.
pub const SENSITIVE_ATTRIBUTES: &[&str] = &["machines.*.power_parameters"];

/// Maximum number of history entries retained.
const MAX_HISTORY: usize = 100;

/// The complete state document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDocument {
    /// State format version.
    pub version: String,
    /// Managed bridges by key.
    #[serde(default)]
    pub bridges: BTreeMap<String, ManagedResource<BridgeState>>,
    /// Managed VLAN interfaces by key.
    #[serde(default)]
    pub vlans: BTreeMap<String, ManagedResource<VlanState>>,
    /// Machine lookup results by key.
    #[serde(default)]
    pub machines: BTreeMap<String, MachineState>,
    /// Attribute paths holding sensitive values.
    #[serde(default)]
    pub sensitive_attributes: Vec<String>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Operation history (recent entries).
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// A managed resource together with the hash of the manifest entry that
/// produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManagedResource<S> {
    /// Hash of the desired state last applied; empty after import.
    pub spec_hash: String,
    /// Last snapshot read back from MAAS.
    pub snapshot: S,
    /// When the snapshot was last written.
    pub updated_at: DateTime<Utc>,
}

/// Snapshot of a bridge interface.
///
/// Optional fields are `None` until MAAS has reported them at least once.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgeState {
    /// Interface ID; the resource identity.
    pub id: i64,
    /// Machine identifier as given in the manifest or import ID.
    pub machine: String,
    /// Interface name.
    #[serde(default)]
    pub name: Option<String>,
    /// Parent interface name.
    #[serde(default)]
    pub parent: Option<String>,
    /// Accept router advertisements.
    #[serde(default)]
    pub accept_ra: Option<bool>,
    /// Stateless autoconfiguration.
    #[serde(default)]
    pub autoconf: Option<bool>,
    /// Forward delay in seconds.
    #[serde(default)]
    pub bridge_fd: Option<i64>,
    /// Spanning tree protocol.
    #[serde(default)]
    pub bridge_stp: Option<bool>,
    /// Bridge type.
    #[serde(default)]
    pub bridge_type: Option<String>,
    /// MAC address.
    #[serde(default)]
    pub mac_address: Option<String>,
    /// Effective MTU.
    #[serde(default)]
    pub mtu: Option<i64>,
    /// Tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// VLAN ID the bridge is connected to.
    #[serde(default)]
    pub vlan: Option<String>,
}

/// Snapshot of a VLAN interface.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VlanState {
    /// Interface ID; the resource identity.
    pub id: i64,
    /// Machine identifier as given in the manifest.
    pub machine: String,
    /// Fabric identifier as given in the manifest.
    pub fabric: String,
    /// Interface name as assigned by MAAS.
    #[serde(default)]
    pub name: Option<String>,
    /// First parent interface name.
    #[serde(default)]
    pub parent: Option<String>,
    /// VLAN tag (VID), not the VLAN ID.
    #[serde(default)]
    pub vlan: Option<String>,
    /// VLAN ID behind the tag.
    #[serde(default)]
    pub vlan_id: Option<i64>,
    /// Effective MTU.
    #[serde(default)]
    pub mtu: Option<i64>,
    /// Accept router advertisements.
    #[serde(default)]
    pub accept_ra: Option<bool>,
    /// Tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// Result of a machine lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MachineState {
    /// System ID.
    pub id: String,
    /// Hostname.
    pub hostname: String,
    /// Fully-qualified domain name.
    pub fqdn: String,
    /// Power driver.
    pub power_type: String,
    /// Power parameters.
    pub power_parameters: Sensitive<PowerParameters>,
    /// PXE boot MAC address.
    pub pxe_mac_address: Option<String>,
    /// Architecture.
    pub architecture: String,
    /// Minimum HWE kernel.
    pub min_hwe_kernel: Option<String>,
    /// DNS domain.
    pub domain: Option<String>,
    /// Availability zone.
    pub zone: Option<String>,
    /// Resource pool.
    pub pool: Option<String>,
}

/// A value that is persisted as-is but redacted from `Debug` and `Display`.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Sensitive<T>(T);

/// A single entry in the operation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the operation ran.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: Operation,
    /// Resources affected, as `kind.key`.
    pub resources: Vec<String>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Optional error message.
    #[serde(default)]
    pub error: Option<String>,
}

/// Types of recorded operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Plan applied.
    Apply,
    /// Snapshots re-read from MAAS.
    Refresh,
    /// Existing interface adopted.
    Import,
    /// Machine lookups evaluated.
    Lookup,
    /// Entry removed from state without touching MAAS.
    Forget,
}

impl StateDocument {
    /// Creates a new empty state document.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            bridges: BTreeMap::new(),
            vlans: BTreeMap::new(),
            machines: BTreeMap::new(),
            sensitive_attributes: SENSITIVE_ATTRIBUTES.iter().map(|s| (*s).to_string()).collect(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Gets a bridge by key.
    #[must_use]
    pub fn bridge(&self, key: &str) -> Option<&ManagedResource<BridgeState>> {
        self.bridges.get(key)
    }

    /// Gets a VLAN interface by key.
    #[must_use]
    pub fn vlan(&self, key: &str) -> Option<&ManagedResource<VlanState>> {
        self.vlans.get(key)
    }

    /// Records a bridge snapshot.
    pub fn set_bridge(&mut self, key: &str, spec_hash: &str, snapshot: BridgeState) {
        self.bridges
            .insert(key.to_string(), ManagedResource::new(spec_hash, snapshot));
        self.last_updated = Utc::now();
    }

    /// Records a VLAN interface snapshot.
    pub fn set_vlan(&mut self, key: &str, spec_hash: &str, snapshot: VlanState) {
        self.vlans
            .insert(key.to_string(), ManagedResource::new(spec_hash, snapshot));
        self.last_updated = Utc::now();
    }

    /// Records a machine lookup.
    pub fn set_machine(&mut self, key: &str, machine: MachineState) {
        self.machines.insert(key.to_string(), machine);
        self.last_updated = Utc::now();
    }

    /// Removes a managed resource; returns whether it was tracked.
    pub fn remove(&mut self, kind: ResourceKind, key: &str) -> bool {
        let removed = match kind {
            ResourceKind::Bridge => self.bridges.remove(key).is_some(),
            ResourceKind::Vlan => self.vlans.remove(key).is_some(),
        };
        if removed {
            self.last_updated = Utc::now();
        }
        removed
    }

    /// Returns true if a resource of this kind and key is tracked.
    #[must_use]
    pub fn contains(&self, kind: ResourceKind, key: &str) -> bool {
        match kind {
            ResourceKind::Bridge => self.bridges.contains_key(key),
            ResourceKind::Vlan => self.vlans.contains_key(key),
        }
    }

    /// Number of managed interfaces.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.bridges.len() + self.vlans.len()
    }

    /// Adds a history entry, dropping the oldest beyond the retention limit.
    pub fn add_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }
}

impl Default for StateDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> ManagedResource<S> {
    /// Wraps a snapshot with its spec hash.
    #[must_use]
    pub fn new(spec_hash: &str, snapshot: S) -> Self {
        Self {
            spec_hash: spec_hash.to_string(),
            snapshot,
            updated_at: Utc::now(),
        }
    }
}

impl<T> Sensitive<T> {
    /// Wraps a value.
    pub const fn new(value: T) -> Self {
        Self(value)
    }

    /// Returns the wrapped value.
    pub const fn expose(&self) -> &T {
        &self.0
    }
}

impl<T> fmt::Debug for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(sensitive value)")
    }
}

impl<T> fmt::Display for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(sensitive value)")
    }
}

impl HistoryEntry {
    /// Creates a successful history entry.
    #[must_use]
    pub fn new(operation: Operation, resources: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            resources,
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(operation: Operation, resources: Vec<String>, error: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            resources,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::Apply => "apply",
            Self::Refresh => "refresh",
            Self::Import => "import",
            Self::Lookup => "lookup",
            Self::Forget => "forget",
        };
        write!(f, "{op}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sensitive_is_redacted_but_persisted() {
        let params: PowerParameters = [(String::from("power_pass"), json!("hunter2"))]
            .into_iter()
            .collect();
        let secret = Sensitive::new(params);

        assert!(!format!("{secret:?}").contains("hunter2"));
        assert!(!secret.to_string().contains("hunter2"));

        let encoded = serde_json::to_string(&secret).expect("encode");
        assert_eq!(encoded, "{\"power_pass\":\"hunter2\"}");
    }

    #[test]
    fn test_new_document_marks_sensitive_attributes() {
        let doc = StateDocument::new();
        assert_eq!(doc.version, STATE_VERSION);
        assert_eq!(doc.sensitive_attributes, vec!["machines.*.power_parameters"]);
    }

    #[test]
    fn test_set_and_remove() {
        let mut doc = StateDocument::new();
        doc.set_bridge(
            "mgmt",
            "abc",
            BridgeState {
                id: 7,
                machine: String::from("mq4s3r"),
                ..BridgeState::default()
            },
        );

        assert!(doc.contains(ResourceKind::Bridge, "mgmt"));
        assert!(!doc.contains(ResourceKind::Vlan, "mgmt"));
        assert_eq!(doc.bridge("mgmt").map(|b| b.snapshot.id), Some(7));

        assert!(doc.remove(ResourceKind::Bridge, "mgmt"));
        assert!(!doc.remove(ResourceKind::Bridge, "mgmt"));
        assert_eq!(doc.resource_count(), 0);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut doc = StateDocument::new();
        for _ in 0..(MAX_HISTORY + 5) {
            doc.add_history(HistoryEntry::new(Operation::Refresh, Vec::new()));
        }
        assert_eq!(doc.history.len(), MAX_HISTORY);
    }
}
