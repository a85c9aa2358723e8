//! Diff engine for comparing the manifest with recorded snapshots.
//!
//! Fields left unset in the manifest are MAAS defaults and never count as
//! drift. Changing an immutable field (`machine`, bridge `name`, VLAN
//! `fabric`) requires a replacement.

use std::collections::BTreeSet;
use tracing::debug;

use crate::config::{BridgeSpec, ConfigHasher, Manifest, ResourceKind, VlanSpec};
use crate::state::{BridgeState, ManagedResource, StateDocument, VlanState};

/// Engine for computing diffs between the manifest and state.
#[derive(Debug, Default)]
pub struct DiffEngine {
    hasher: ConfigHasher,
}

/// Difference for a single resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDiff {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Resource key.
    pub key: String,
    /// Type of difference.
    pub diff_type: DiffType,
    /// Field-level differences.
    pub details: Vec<DiffDetail>,
    /// Recorded spec hash (if tracked).
    pub old_hash: Option<String>,
    /// Desired spec hash (if in the manifest).
    pub new_hash: Option<String>,
}

/// Type of difference detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffType {
    /// Resource needs to be created.
    Create,
    /// Resource can be updated in place.
    Update,
    /// An immutable field changed; delete then create.
    Replace,
    /// Resource needs to be deleted.
    Delete,
    /// Resource is unchanged.
    NoChange,
}

/// Detail about a specific difference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffDetail {
    /// Field that differs.
    pub field: String,
    /// Value recorded from MAAS.
    pub old_value: Option<String>,
    /// Desired value.
    pub new_value: Option<String>,
}

/// Complete diff result.
#[derive(Debug, Default)]
pub struct DiffResult {
    /// All resource diffs.
    pub diffs: Vec<ResourceDiff>,
    /// Number of resources to create.
    pub creates: usize,
    /// Number of resources to update in place.
    pub updates: usize,
    /// Number of resources to replace.
    pub replaces: usize,
    /// Number of resources to delete.
    pub deletes: usize,
    /// Number of unchanged resources.
    pub unchanged: usize,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hasher: ConfigHasher::new(),
        }
    }

    /// Computes the diff between the manifest and the state document.
    #[must_use]
    pub fn compute_diff(&self, manifest: &Manifest, state: &StateDocument) -> DiffResult {
        let mut diffs = Vec::new();

        for spec in &manifest.bridges {
            let new_hash = self.hasher.hash_bridge(spec);
            diffs.push(Self::compare(
                ResourceKind::Bridge,
                &spec.key,
                new_hash,
                state.bridge(&spec.key),
                |snapshot| bridge_immutable(spec, snapshot),
                |snapshot| bridge_drift(spec, snapshot),
            ));
        }

        for spec in &manifest.vlans {
            let new_hash = self.hasher.hash_vlan(spec);
            diffs.push(Self::compare(
                ResourceKind::Vlan,
                &spec.key,
                new_hash,
                state.vlan(&spec.key),
                |snapshot| vlan_immutable(spec, snapshot),
                |snapshot| vlan_drift(spec, snapshot),
            ));
        }

        for (key, managed) in &state.bridges {
            if manifest.bridge(key).is_none() {
                diffs.push(Self::orphan(ResourceKind::Bridge, key, &managed.spec_hash, managed.snapshot.id));
            }
        }

        for (key, managed) in &state.vlans {
            if manifest.vlan(key).is_none() {
                diffs.push(Self::orphan(ResourceKind::Vlan, key, &managed.spec_hash, managed.snapshot.id));
            }
        }

        let count = |t: DiffType| diffs.iter().filter(|d| d.diff_type == t).count();
        DiffResult {
            creates: count(DiffType::Create),
            updates: count(DiffType::Update),
            replaces: count(DiffType::Replace),
            deletes: count(DiffType::Delete),
            unchanged: count(DiffType::NoChange),
            diffs,
        }
    }

    fn compare<S>(
        kind: ResourceKind,
        key: &str,
        new_hash: String,
        recorded: Option<&ManagedResource<S>>,
        immutable: impl Fn(&S) -> Vec<DiffDetail>,
        drift: impl Fn(&S) -> Vec<DiffDetail>,
    ) -> ResourceDiff {
        let Some(recorded) = recorded else {
            debug!("{kind} {key} needs to be created");
            return ResourceDiff {
                kind,
                key: key.to_string(),
                diff_type: DiffType::Create,
                details: Vec::new(),
                old_hash: None,
                new_hash: Some(new_hash),
            };
        };

        let old_hash = Some(recorded.spec_hash.clone()).filter(|h| !h.is_empty());

        let replaced = immutable(&recorded.snapshot);
        let (diff_type, details) = if !replaced.is_empty() {
            (DiffType::Replace, replaced)
        } else {
            let drifted = drift(&recorded.snapshot);
            let hash_changed = old_hash.as_deref().is_some_and(|h| h != new_hash);

            if !drifted.is_empty() {
                (DiffType::Update, drifted)
            } else if hash_changed {
                (
                    DiffType::Update,
                    vec![DiffDetail {
                        field: String::from("spec"),
                        old_value: old_hash.clone(),
                        new_value: Some(new_hash.clone()),
                    }],
                )
            } else {
                (DiffType::NoChange, Vec::new())
            }
        };

        debug!("{kind} {key}: {diff_type}");
        ResourceDiff {
            kind,
            key: key.to_string(),
            diff_type,
            details,
            old_hash,
            new_hash: Some(new_hash),
        }
    }

    fn orphan(kind: ResourceKind, key: &str, spec_hash: &str, id: i64) -> ResourceDiff {
        debug!("{kind} {key} is no longer in the manifest");
        ResourceDiff {
            kind,
            key: key.to_string(),
            diff_type: DiffType::Delete,
            details: vec![DiffDetail {
                field: String::from("id"),
                old_value: Some(id.to_string()),
                new_value: None,
            }],
            old_hash: Some(spec_hash.to_string()).filter(|h| !h.is_empty()),
            new_hash: None,
        }
    }
}

/// Collects field differences for desired values that are set.
#[derive(Default)]
struct Details(Vec<DiffDetail>);

impl Details {
    fn check<T: PartialEq + ToString>(&mut self, field: &str, desired: Option<&T>, actual: Option<&T>) {
        if let Some(desired) = desired
            && actual != Some(desired)
        {
            self.push(field, actual.map(ToString::to_string), Some(desired.to_string()));
        }
    }

    fn check_tags(&mut self, desired: &BTreeSet<String>, actual: &BTreeSet<String>) {
        if desired != actual {
            let join = |t: &BTreeSet<String>| t.iter().cloned().collect::<Vec<_>>().join(",");
            self.push("tags", Some(join(actual)), Some(join(desired)));
        }
    }

    fn push(&mut self, field: &str, old_value: Option<String>, new_value: Option<String>) {
        self.0.push(DiffDetail {
            field: field.to_string(),
            old_value,
            new_value,
        });
    }
}

/// A numeric parent is an interface ID and cannot be compared with the
/// recorded parent name.
fn comparable_parent(parent: &str) -> Option<&str> {
    (parent.parse::<i64>().is_err()).then_some(parent)
}

fn bridge_immutable(desired: &BridgeSpec, snapshot: &BridgeState) -> Vec<DiffDetail> {
    let mut details = Details::default();
    details.check("machine", Some(&desired.machine), Some(&snapshot.machine));
    details.check("name", desired.name.as_ref(), snapshot.name.as_ref());
    details.0
}

fn bridge_drift(desired: &BridgeSpec, snapshot: &BridgeState) -> Vec<DiffDetail> {
    let mut details = Details::default();

    if let Some(parent) = desired.parent.as_deref().and_then(comparable_parent) {
        details.check("parent", Some(&parent), snapshot.parent.as_deref().as_ref());
    }
    details.check("accept_ra", desired.accept_ra.as_ref(), snapshot.accept_ra.as_ref());
    details.check("autoconf", desired.autoconf.as_ref(), snapshot.autoconf.as_ref());
    details.check("bridge_fd", desired.bridge_fd.as_ref(), snapshot.bridge_fd.as_ref());
    details.check("bridge_stp", desired.bridge_stp.as_ref(), snapshot.bridge_stp.as_ref());
    details.check("bridge_type", desired.bridge_type.as_ref(), snapshot.bridge_type.as_ref());
    details.check(
        "mac_address",
        desired.mac_address.as_ref().map(|m| m.to_ascii_lowercase()).as_ref(),
        snapshot.mac_address.as_ref().map(|m| m.to_ascii_lowercase()).as_ref(),
    );
    details.check("mtu", desired.mtu.as_ref(), snapshot.mtu.as_ref());
    details.check("vlan", desired.vlan.as_ref(), snapshot.vlan.as_ref());
    details.check_tags(&desired.tags, &snapshot.tags);

    details.0
}

fn vlan_immutable(desired: &VlanSpec, snapshot: &VlanState) -> Vec<DiffDetail> {
    let mut details = Details::default();
    details.check("machine", Some(&desired.machine), Some(&snapshot.machine));
    details.check("fabric", Some(&desired.fabric), Some(&snapshot.fabric));
    details.0
}

fn vlan_drift(desired: &VlanSpec, snapshot: &VlanState) -> Vec<DiffDetail> {
    let mut details = Details::default();

    if let Some(parent) = comparable_parent(&desired.parent) {
        details.check("parent", Some(&parent), snapshot.parent.as_deref().as_ref());
    }

    // The manifest may name the VLAN by tag or by ID.
    let vlan_matches = snapshot.vlan.as_deref() == Some(desired.vlan.as_str())
        || snapshot.vlan_id.map(|id| id.to_string()).as_deref() == Some(desired.vlan.as_str());
    if !vlan_matches {
        details.push("vlan", snapshot.vlan.clone(), Some(desired.vlan.clone()));
    }

    details.check("mtu", desired.mtu.as_ref(), snapshot.mtu.as_ref());
    details.check("accept_ra", desired.accept_ra.as_ref(), snapshot.accept_ra.as_ref());
    details.check_tags(&desired.tags, &snapshot.tags);

    details.0
}

impl DiffResult {
    /// Returns true if there are any changes.
    #[must_use]
    pub const fn has_changes(&self) -> bool {
        self.total_changes() > 0
    }

    /// Returns the total number of changes.
    #[must_use]
    pub const fn total_changes(&self) -> usize {
        self.creates + self.updates + self.replaces + self.deletes
    }

    /// Filters to only diffs that require action.
    #[must_use]
    pub fn actionable_diffs(&self) -> Vec<&ResourceDiff> {
        self.diffs
            .iter()
            .filter(|d| d.diff_type != DiffType::NoChange)
            .collect()
    }
}

impl std::fmt::Display for DiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::NoChange => "no change",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ResourceDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}: {}", self.kind, self.key, self.diff_type)?;
        if !self.details.is_empty() {
            let fields: Vec<&str> = self.details.iter().map(|d| d.field.as_str()).collect();
            write!(f, " ({})", fields.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MaasConfig;

    fn manifest(bridges: Vec<BridgeSpec>, vlans: Vec<VlanSpec>) -> Manifest {
        Manifest {
            maas: MaasConfig {
                url: String::from("http://maas"),
                api_version: String::from("2.0"),
                timeout_secs: 30,
                max_retries: 0,
            },
            state: crate::config::StateConfig::default(),
            bridges,
            vlans,
            machines: Vec::new(),
        }
    }

    fn bridge_spec() -> BridgeSpec {
        BridgeSpec {
            key: String::from("mgmt"),
            machine: String::from("mq4s3r"),
            name: Some(String::from("cloud-brmgmt")),
            parent: Some(String::from("bond0.3342")),
            ..BridgeSpec::default()
        }
    }

    fn bridge_state() -> BridgeState {
        BridgeState {
            id: 7,
            machine: String::from("mq4s3r"),
            name: Some(String::from("cloud-brmgmt")),
            parent: Some(String::from("bond0.3342")),
            bridge_type: Some(String::from("standard")),
            mtu: Some(1500),
            ..BridgeState::default()
        }
    }

    fn vlan_spec() -> VlanSpec {
        VlanSpec {
            key: String::from("bond0-3342"),
            machine: String::from("mq4s3r"),
            parent: String::from("bond0"),
            fabric: String::from("fabric-hydc"),
            vlan: String::from("3342"),
            mtu: Some(9000),
            ..VlanSpec::default()
        }
    }

    fn vlan_state() -> VlanState {
        VlanState {
            id: 9,
            machine: String::from("mq4s3r"),
            fabric: String::from("fabric-hydc"),
            parent: Some(String::from("bond0")),
            vlan: Some(String::from("3342")),
            vlan_id: Some(5005),
            mtu: Some(9000),
            ..VlanState::default()
        }
    }

    fn diff_for<'a>(result: &'a DiffResult, key: &str) -> &'a ResourceDiff {
        result
            .diffs
            .iter()
            .find(|d| d.key == key)
            .expect("diff for key")
    }

    #[test]
    fn test_create_and_delete() {
        let engine = DiffEngine::new();
        let mut state = StateDocument::new();
        state.set_vlan("old", "hash", vlan_state());

        let result = engine.compute_diff(&manifest(vec![bridge_spec()], Vec::new()), &state);

        assert_eq!(diff_for(&result, "mgmt").diff_type, DiffType::Create);
        assert_eq!(diff_for(&result, "old").diff_type, DiffType::Delete);
        assert_eq!((result.creates, result.deletes), (1, 1));
    }

    #[test]
    fn test_unchanged_when_hash_and_snapshot_match() {
        let engine = DiffEngine::new();
        let spec = bridge_spec();
        let mut state = StateDocument::new();
        state.set_bridge("mgmt", &engine.hasher.hash_bridge(&spec), bridge_state());

        let result = engine.compute_diff(&manifest(vec![spec], Vec::new()), &state);
        assert_eq!(result.unchanged, 1);
        assert!(!result.has_changes());
    }

    #[test]
    fn test_desired_field_change_is_update() {
        let engine = DiffEngine::new();
        let before = bridge_spec();
        let mut state = StateDocument::new();
        state.set_bridge("mgmt", &engine.hasher.hash_bridge(&before), bridge_state());

        let after = BridgeSpec {
            bridge_stp: Some(true),
            ..before
        };
        let result = engine.compute_diff(&manifest(vec![after], Vec::new()), &state);
        let diff = diff_for(&result, "mgmt");

        assert_eq!(diff.diff_type, DiffType::Update);
        assert_eq!(diff.details[0].field, "bridge_stp");
        assert_eq!(diff.details[0].old_value, None);
    }

    #[test]
    fn test_remote_drift_is_update() {
        let engine = DiffEngine::new();
        let spec = VlanSpec {
            tags: ["a"].into_iter().map(String::from).collect(),
            ..vlan_spec()
        };
        let mut state = StateDocument::new();
        state.set_vlan("bond0-3342", &engine.hasher.hash_vlan(&spec), vlan_state());

        let result = engine.compute_diff(&manifest(Vec::new(), vec![spec]), &state);
        let diff = diff_for(&result, "bond0-3342");
        assert_eq!(diff.diff_type, DiffType::Update);
        assert_eq!(diff.details[0].field, "tags");
    }

    #[test]
    fn test_immutable_change_is_replace() {
        let engine = DiffEngine::new();
        let mut state = StateDocument::new();
        state.set_bridge("mgmt", "hash", bridge_state());
        state.set_vlan("bond0-3342", "hash", vlan_state());

        let renamed = BridgeSpec {
            name: Some(String::from("cloud-brdata")),
            ..bridge_spec()
        };
        let moved = VlanSpec {
            fabric: String::from("fabric-0"),
            ..vlan_spec()
        };
        let result = engine.compute_diff(&manifest(vec![renamed], vec![moved]), &state);

        assert_eq!(diff_for(&result, "mgmt").diff_type, DiffType::Replace);
        assert_eq!(diff_for(&result, "bond0-3342").diff_type, DiffType::Replace);
        assert_eq!(result.replaces, 2);
    }

    #[test]
    fn test_vlan_named_by_id_does_not_drift() {
        let engine = DiffEngine::new();
        let spec = VlanSpec {
            vlan: String::from("5005"),
            ..vlan_spec()
        };
        let mut state = StateDocument::new();
        state.set_vlan("bond0-3342", &engine.hasher.hash_vlan(&spec), vlan_state());

        let result = engine.compute_diff(&manifest(Vec::new(), vec![spec]), &state);
        assert_eq!(result.unchanged, 1);
    }

    #[test]
    fn test_imported_resource_without_hash() {
        let engine = DiffEngine::new();
        let mut state = StateDocument::new();
        state.set_bridge("mgmt", "", bridge_state());

        let result = engine.compute_diff(&manifest(vec![bridge_spec()], Vec::new()), &state);
        let diff = diff_for(&result, "mgmt");
        assert_eq!(diff.diff_type, DiffType::NoChange);
        assert_eq!(diff.old_hash, None);
    }
}
