//! Desired-state hashing for change detection.
//!
//! The hash of each interface's desired state is stored next to its
//! snapshot, so a manifest edit is detected even when the remote object
//! still happens to match the old values.

use sha2::{Digest, Sha256};

use super::spec::{BridgeSpec, VlanSpec};

/// Hasher for desired-state entries.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the hash of a bridge's desired state.
    #[must_use]
    pub fn hash_bridge(&self, spec: &BridgeSpec) -> String {
        let mut hasher = Sha256::new();

        hasher.update(b"bridge\0");
        update_str(&mut hasher, &spec.machine);
        update_opt(&mut hasher, spec.name.as_deref());
        update_opt(&mut hasher, spec.parent.as_deref());
        update_opt(&mut hasher, spec.accept_ra.map(bool_str));
        update_opt(&mut hasher, spec.autoconf.map(bool_str));
        update_opt(&mut hasher, spec.bridge_fd.map(|v| v.to_string()).as_deref());
        update_opt(&mut hasher, spec.bridge_stp.map(bool_str));
        update_opt(&mut hasher, spec.bridge_type.as_deref());
        update_opt(&mut hasher, spec.mac_address.as_deref());
        update_opt(&mut hasher, spec.mtu.map(|v| v.to_string()).as_deref());
        update_opt(&mut hasher, spec.vlan.as_deref());

        // BTreeSet iterates sorted, so tag order in the manifest is irrelevant
        for tag in &spec.tags {
            update_str(&mut hasher, tag);
        }

        hex::encode(hasher.finalize())
    }

    /// Computes the hash of a VLAN interface's desired state.
    #[must_use]
    pub fn hash_vlan(&self, spec: &VlanSpec) -> String {
        let mut hasher = Sha256::new();

        hasher.update(b"vlan\0");
        update_str(&mut hasher, &spec.machine);
        update_str(&mut hasher, &spec.parent);
        update_str(&mut hasher, &spec.fabric);
        update_str(&mut hasher, &spec.vlan);
        update_opt(&mut hasher, spec.accept_ra.map(bool_str));
        update_opt(&mut hasher, spec.mtu.map(|v| v.to_string()).as_deref());

        for tag in &spec.tags {
            update_str(&mut hasher, tag);
        }

        hex::encode(hasher.finalize())
    }

    /// Returns the first 8 characters of a hash for display.
    #[must_use]
    pub fn short_hash<'a>(&self, hash: &'a str) -> &'a str {
        &hash[..8.min(hash.len())]
    }

    /// Compares two hashes.
    #[must_use]
    pub fn hashes_match(a: &str, b: &str) -> bool {
        a == b
    }
}

const fn bool_str(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

fn update_str(hasher: &mut Sha256, value: &str) {
    hasher.update(value.as_bytes());
    hasher.update([0u8]);
}

// Absent and empty must hash differently.
fn update_opt(hasher: &mut Sha256, value: Option<&str>) {
    match value {
        Some(v) => {
            hasher.update([1u8]);
            update_str(hasher, v);
        }
        None => hasher.update([0u8]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge(name: &str) -> BridgeSpec {
        BridgeSpec {
            key: String::from("mgmt"),
            machine: String::from("mq4s3r"),
            name: Some(name.to_string()),
            parent: Some(String::from("bond0.3342")),
            ..BridgeSpec::default()
        }
    }

    #[test]
    fn test_bridge_hash_deterministic() {
        let hasher = ConfigHasher::new();
        assert_eq!(
            hasher.hash_bridge(&bridge("cloud-brmgmt")),
            hasher.hash_bridge(&bridge("cloud-brmgmt"))
        );
    }

    #[test]
    fn test_bridge_hash_tracks_changes() {
        let hasher = ConfigHasher::new();
        let before = bridge("cloud-brmgmt");
        let after = BridgeSpec {
            bridge_stp: Some(true),
            ..before.clone()
        };

        assert_ne!(hasher.hash_bridge(&before), hasher.hash_bridge(&after));
    }

    #[test]
    fn test_unset_differs_from_false() {
        let hasher = ConfigHasher::new();
        let unset = bridge("br0");
        let off = BridgeSpec {
            bridge_stp: Some(false),
            ..unset.clone()
        };

        assert_ne!(hasher.hash_bridge(&unset), hasher.hash_bridge(&off));
    }

    #[test]
    fn test_key_does_not_affect_hash() {
        let hasher = ConfigHasher::new();
        let a = bridge("br0");
        let b = BridgeSpec {
            key: String::from("renamed"),
            ..a.clone()
        };

        assert_eq!(hasher.hash_bridge(&a), hasher.hash_bridge(&b));
    }

    #[test]
    fn test_short_hash() {
        let hasher = ConfigHasher::new();
        assert_eq!(hasher.short_hash("abcdef1234567890"), "abcdef12");
        assert_eq!(hasher.short_hash("abc"), "abc");
        assert!(ConfigHasher::hashes_match("abc123", "abc123"));
        assert!(!ConfigHasher::hashes_match("abc123", "abc124"));
    }
}
