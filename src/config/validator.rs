//! Manifest validation.
//!
//! Everything here runs before any remote call so that malformed input
//! never reaches MAAS.

use crate::error::{ConfigError, NetifError, Result};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{BridgeSpec, MachineQuery, Manifest, VlanSpec};

/// Bridge types MAAS accepts.
const BRIDGE_TYPES: &[&str] = &["standard", "ovs"];

/// Smallest MTU MAAS accepts.
const MIN_MTU: i64 = 552;

/// Largest MTU MAAS accepts.
const MAX_MTU: i64 = 65535;

/// Validator for manifests.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all findings.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Errors; any entry fails validation.
    pub errors: Vec<ValidationIssue>,
    /// Warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationIssue {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a manifest.
    ///
    /// # Errors
    ///
    /// Returns the first error if validation fails.
    pub fn validate(&self, manifest: &Manifest) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        if manifest.maas.url.trim().is_empty() {
            result.error("maas.url", "MAAS URL cannot be empty");
        }

        Self::validate_bridges(&manifest.bridges, &mut result);
        Self::validate_vlans(&manifest.vlans, &mut result);
        Self::validate_machines(&manifest.machines, &mut result);

        if manifest.resource_count() == 0 && manifest.machines.is_empty() {
            result
                .warnings
                .push(String::from("No interfaces or machine lookups defined"));
        }

        if let Some(first) = result.errors.first() {
            return Err(NetifError::Config(ConfigError::validation(
                first.message.clone(),
                first.field.clone(),
            )));
        }

        debug!("Manifest validation passed");
        Ok(result)
    }

    fn validate_bridges(bridges: &[BridgeSpec], result: &mut ValidationResult) {
        let mut seen = HashSet::new();

        for (i, bridge) in bridges.iter().enumerate() {
            let prefix = format!("bridges[{i}]");
            check_key(&bridge.key, &prefix, "bridge", &mut seen, result);
            check_required(&bridge.machine, &format!("{prefix}.machine"), result);

            if bridge.parent.as_deref().is_none_or(|p| p.trim().is_empty()) {
                result.warnings.push(format!(
                    "{prefix}.parent: no parent interface set, MAAS will reject the bridge"
                ));
            }

            if let Some(bridge_type) = &bridge.bridge_type
                && !BRIDGE_TYPES.contains(&bridge_type.as_str())
            {
                result.error(
                    format!("{prefix}.bridge_type"),
                    format!("Bridge type '{bridge_type}' is invalid. Expected one of: standard, ovs"),
                );
            }

            if let Some(fd) = bridge.bridge_fd
                && fd < 0
            {
                result.error(
                    format!("{prefix}.bridge_fd"),
                    "Bridge forward delay cannot be negative",
                );
            }

            if let Some(mac) = &bridge.mac_address
                && !is_valid_mac(mac)
            {
                result.error(
                    format!("{prefix}.mac_address"),
                    format!("'{mac}' is not a valid MAC address"),
                );
            }

            check_mtu(bridge.mtu, &prefix, result);
        }
    }

    fn validate_vlans(vlans: &[VlanSpec], result: &mut ValidationResult) {
        let mut seen = HashSet::new();

        for (i, vlan) in vlans.iter().enumerate() {
            let prefix = format!("vlans[{i}]");
            check_key(&vlan.key, &prefix, "vlan", &mut seen, result);
            check_required(&vlan.machine, &format!("{prefix}.machine"), result);
            check_required(&vlan.parent, &format!("{prefix}.parent"), result);
            check_required(&vlan.fabric, &format!("{prefix}.fabric"), result);
            check_required(&vlan.vlan, &format!("{prefix}.vlan"), result);
            check_mtu(vlan.mtu, &prefix, result);
        }
    }

    fn validate_machines(machines: &[MachineQuery], result: &mut ValidationResult) {
        let mut seen = HashSet::new();

        for (i, query) in machines.iter().enumerate() {
            let prefix = format!("machines[{i}]");
            check_key(&query.key, &prefix, "machine", &mut seen, result);

            if let Err(e) = query.identifier() {
                result.error(prefix.clone(), e.to_string());
            }

            if let Some(mac) = &query.pxe_mac_address
                && !is_valid_mac(mac)
            {
                result.error(
                    format!("{prefix}.pxe_mac_address"),
                    format!("'{mac}' is not a valid MAC address"),
                );
            }
        }
    }
}

impl ValidationResult {
    /// Returns true if no errors were found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            field: field.into(),
            message: message.into(),
        });
    }
}

fn check_key<'a>(
    key: &'a str,
    prefix: &str,
    kind: &str,
    seen: &mut HashSet<&'a str>,
    result: &mut ValidationResult,
) {
    if key.trim().is_empty() {
        result.error(format!("{prefix}.key"), format!("Every {kind} needs a key"));
    } else if !seen.insert(key) {
        result.error(format!("{prefix}.key"), format!("Duplicate {kind} key: {key}"));
    }
}

fn check_required(value: &str, field: &str, result: &mut ValidationResult) {
    if value.trim().is_empty() {
        result.error(field, format!("{field} is required"));
    }
}

fn check_mtu(mtu: Option<i64>, prefix: &str, result: &mut ValidationResult) {
    if let Some(mtu) = mtu
        && !(MIN_MTU..=MAX_MTU).contains(&mtu)
    {
        result.error(
            format!("{prefix}.mtu"),
            format!("MTU {mtu} is out of range ({MIN_MTU}..={MAX_MTU})"),
        );
    }
}

/// Checks for six colon- or hyphen-separated hex octets.
#[must_use]
pub fn is_valid_mac(mac: &str) -> bool {
    let octets: Vec<&str> = mac.split([':', '-']).collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn manifest(yaml: &str) -> Manifest {
        ConfigParser::new().parse_yaml(yaml, None).expect("parse")
    }

    #[test]
    fn test_valid_manifest() {
        let m = manifest(
            r#"
maas: {url: "http://maas:5240/MAAS"}
bridges:
  - {key: mgmt, machine: mq4s3r, name: cloud-brmgmt, parent: bond0.3342, bridge_type: ovs}
vlans:
  - {key: v, machine: mq4s3r, parent: bond0, fabric: fabric-hydc, vlan: "3342", mtu: 9000}
"#,
        );
        let result = ConfigValidator::new().validate(&m).expect("valid");
        assert!(result.is_valid());
    }

    #[test]
    fn test_duplicate_bridge_key() {
        let m = manifest(
            r#"
maas: {url: "http://maas"}
bridges:
  - {key: a, machine: m1, parent: eth0}
  - {key: a, machine: m2, parent: eth0}
"#,
        );
        let err = ConfigValidator::new().validate(&m).expect_err("duplicate");
        assert!(err.to_string().contains("Duplicate bridge key"));
    }

    #[test]
    fn test_invalid_bridge_type() {
        let m = manifest(
            r#"
maas: {url: "http://maas"}
bridges:
  - {key: a, machine: m1, parent: eth0, bridge_type: linux}
"#,
        );
        assert!(ConfigValidator::new().validate(&m).is_err());
    }

    #[test]
    fn test_vlan_requires_fabric() {
        let m = manifest(
            r#"
maas: {url: "http://maas"}
vlans:
  - {key: v, machine: m1, parent: bond0, fabric: "", vlan: "10"}
"#,
        );
        let err = ConfigValidator::new().validate(&m).expect_err("missing fabric");
        assert!(err.to_string().contains("fabric"));
    }

    #[test]
    fn test_machine_lookup_exactly_one_of() {
        let both = manifest(
            r#"
maas: {url: "http://maas"}
machines:
  - {key: m, hostname: vm1, pxe_mac_address: "52:54:00:89:f5:3e"}
"#,
        );
        assert!(ConfigValidator::new().validate(&both).is_err());

        let neither = manifest("maas: {url: \"http://maas\"}\nmachines:\n  - {key: m}\n");
        assert!(ConfigValidator::new().validate(&neither).is_err());
    }

    #[test]
    fn test_mtu_range() {
        let m = manifest(
            r#"
maas: {url: "http://maas"}
vlans:
  - {key: v, machine: m1, parent: bond0, fabric: f, vlan: "10", mtu: 100}
"#,
        );
        assert!(ConfigValidator::new().validate(&m).is_err());
    }

    #[test]
    fn test_mac_syntax() {
        assert!(is_valid_mac("52:54:00:89:f5:3e"));
        assert!(is_valid_mac("52-54-00-89-F5-3E"));
        assert!(!is_valid_mac("52:54:00:89:f5"));
        assert!(!is_valid_mac("zz:54:00:89:f5:3e"));
    }
}
