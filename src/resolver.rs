//! Identifier resolution.
//!
//! Maps the loosely-typed identifiers found in the manifest (system ID,
//! hostname, FQDN, MAC address, interface/fabric name or ID, VLAN tag or ID)
//! to canonical MAAS objects. Every call performs a fresh remote read and
//! nothing is cached between calls.

use tracing::debug;

use crate::error::{ResolveError, Result};
use crate::maas::{Fabric, MaasApi, Machine, NetworkInterface, Vlan};

/// Resolves a machine by system ID, hostname or FQDN.
///
/// An exact system ID match wins outright. Otherwise every machine whose
/// hostname, FQDN or PXE MAC matches is a candidate, and more than one
/// candidate is an error.
///
/// # Errors
///
/// Returns [`ResolveError::NotFound`] or [`ResolveError::Ambiguous`], or the
/// remote error from listing machines.
pub async fn resolve_machine(api: &dyn MaasApi, identifier: &str) -> Result<Machine> {
    let machines = api.list_machines().await?;

    if let Some(machine) = machines.iter().find(|m| m.system_id == identifier) {
        debug!("Machine '{identifier}' matched by system ID");
        return Ok(machine.clone());
    }

    single_machine(machines, identifier, |m| {
        m.hostname == identifier
            || m.fqdn == identifier
            || m.pxe_mac_address()
                .is_some_and(|mac| mac.eq_ignore_ascii_case(identifier))
    })
}

/// Resolves a machine by hostname or FQDN only.
///
/// # Errors
///
/// Returns [`ResolveError::NotFound`] or [`ResolveError::Ambiguous`].
pub async fn resolve_machine_by_hostname(api: &dyn MaasApi, hostname: &str) -> Result<Machine> {
    let machines = api.list_machines().await?;
    single_machine(machines, hostname, |m| {
        m.hostname == hostname || m.fqdn == hostname
    })
}

/// Resolves a machine by its PXE boot MAC address (case-insensitive).
///
/// # Errors
///
/// Returns [`ResolveError::NotFound`] or [`ResolveError::Ambiguous`].
pub async fn resolve_machine_by_mac(api: &dyn MaasApi, mac: &str) -> Result<Machine> {
    let machines = api.list_machines().await?;
    single_machine(machines, mac, |m| {
        m.pxe_mac_address()
            .is_some_and(|candidate| candidate.eq_ignore_ascii_case(mac))
    })
}

fn single_machine(
    machines: Vec<Machine>,
    identifier: &str,
    matches: impl Fn(&Machine) -> bool,
) -> Result<Machine> {
    let mut found: Vec<Machine> = machines.into_iter().filter(|m| matches(m)).collect();

    match found.len() {
        0 => Err(ResolveError::not_found("machine", identifier).into()),
        1 => {
            let machine = found.remove(0);
            debug!("Machine '{identifier}' resolved to {}", machine.system_id);
            Ok(machine)
        }
        _ => Err(ResolveError::Ambiguous {
            kind: "machine",
            identifier: identifier.to_string(),
            candidates: found
                .iter()
                .map(|m| m.system_id.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }
        .into()),
    }
}

/// Resolves an interface of a machine by ID or name.
///
/// A string that parses as the ID of an existing interface resolves to that
/// interface, even when another interface is literally named with those
/// digits.
///
/// # Errors
///
/// Returns [`ResolveError::NotFound`] when neither an ID nor a name matches.
pub async fn resolve_interface(
    api: &dyn MaasApi,
    system_id: &str,
    name_or_id: &str,
) -> Result<NetworkInterface> {
    let interfaces = api.list_interfaces(system_id).await?;

    if let Ok(id) = name_or_id.parse::<i64>()
        && let Some(iface) = interfaces.iter().find(|i| i.id == id)
    {
        debug!("Interface '{name_or_id}' on {system_id} matched by ID");
        return Ok(iface.clone());
    }

    interfaces
        .into_iter()
        .find(|i| i.name == name_or_id)
        .inspect(|i| debug!("Interface '{name_or_id}' on {system_id} resolved to {}", i.id))
        .ok_or_else(|| ResolveError::not_found("interface", name_or_id).into())
}

/// Resolves a fabric by ID or name.
///
/// Fabric names are unique in MAAS, so this never reports ambiguity.
///
/// # Errors
///
/// Returns [`ResolveError::NotFound`] when no fabric matches.
pub async fn resolve_fabric(api: &dyn MaasApi, name_or_id: &str) -> Result<Fabric> {
    let fabrics = api.list_fabrics().await?;

    if let Ok(id) = name_or_id.parse::<i64>()
        && let Some(fabric) = fabrics.iter().find(|f| f.id == id)
    {
        return Ok(fabric.clone());
    }

    fabrics
        .into_iter()
        .find(|f| f.name == name_or_id)
        .ok_or_else(|| ResolveError::not_found("fabric", name_or_id).into())
}

/// Resolves a VLAN within a fabric by tag (VID), ID or name.
///
/// VIDs and VLAN IDs are both small integers, so a number can name two
/// different VLANs. When the VID match and the ID match disagree the call
/// fails as ambiguous; otherwise the VID match is preferred.
///
/// # Errors
///
/// Returns [`ResolveError::NotFound`] or [`ResolveError::Ambiguous`].
pub async fn resolve_vlan(api: &dyn MaasApi, fabric_id: i64, vid_or_id: &str) -> Result<Vlan> {
    let vlans = api.list_vlans(fabric_id).await?;

    if let Ok(number) = vid_or_id.parse::<i64>() {
        let by_vid = vlans.iter().find(|v| v.vid == number);
        let by_id = vlans.iter().find(|v| v.id == number);

        match (by_vid, by_id) {
            (Some(vid), Some(id)) if vid.id != id.id => {
                return Err(ResolveError::Ambiguous {
                    kind: "vlan",
                    identifier: vid_or_id.to_string(),
                    candidates: format!("VID {} (id {}), id {} (VID {})", vid.vid, vid.id, id.id, id.vid),
                }
                .into());
            }
            (Some(vlan), _) | (None, Some(vlan)) => {
                debug!("VLAN '{vid_or_id}' in fabric {fabric_id} resolved to {}", vlan.id);
                return Ok(vlan.clone());
            }
            (None, None) => {}
        }
    }

    vlans
        .into_iter()
        .find(|v| !v.name.is_empty() && v.name == vid_or_id)
        .ok_or_else(|| ResolveError::not_found("vlan", vid_or_id).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetifError;
    use crate::maas::testing::{FakeMaas, HOSTNAME, PXE_MAC, SYSTEM_ID, interface};

    fn resolve_err(err: NetifError) -> ResolveError {
        match err {
            NetifError::Resolve(e) => e,
            other => panic!("expected a resolution error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_machine_by_every_identifier() {
        let maas = FakeMaas::fixture();

        for id in [SYSTEM_ID, HOSTNAME, "test-virsh-vm1.maas", "52:54:00:89:F5:3E"] {
            let machine = resolve_machine(&maas, id).await.expect("resolve");
            assert_eq!(machine.system_id, SYSTEM_ID, "identifier {id}");
        }
    }

    #[tokio::test]
    async fn test_machine_not_found() {
        let maas = FakeMaas::fixture();
        let err = resolve_machine(&maas, "nope").await.expect_err("missing");
        assert_eq!(resolve_err(err), ResolveError::not_found("machine", "nope"));
    }

    #[tokio::test]
    async fn test_machine_hostname_collision_is_ambiguous() {
        let maas = FakeMaas::fixture();
        let mut twin = resolve_machine(&maas, SYSTEM_ID).await.expect("resolve");
        twin.system_id = String::from("x7y8z9");
        twin.boot_interface = None;
        maas.add_machine(twin);

        let err = resolve_machine(&maas, HOSTNAME).await.expect_err("ambiguous");
        assert!(matches!(resolve_err(err), ResolveError::Ambiguous { .. }));

        // The system ID still resolves exactly.
        let exact = resolve_machine(&maas, "x7y8z9").await.expect("resolve");
        assert_eq!(exact.system_id, "x7y8z9");
    }

    #[tokio::test]
    async fn test_machine_by_mac_ignores_hostnames() {
        let maas = FakeMaas::fixture();
        assert!(resolve_machine_by_mac(&maas, HOSTNAME).await.is_err());
        let machine = resolve_machine_by_mac(&maas, PXE_MAC).await.expect("resolve");
        assert_eq!(machine.system_id, SYSTEM_ID);
    }

    #[tokio::test]
    async fn test_interface_by_name_and_id() {
        let maas = FakeMaas::fixture();

        let by_name = resolve_interface(&maas, SYSTEM_ID, "bond0.3342")
            .await
            .expect("resolve");
        let by_id = resolve_interface(&maas, SYSTEM_ID, "12").await.expect("resolve");
        assert_eq!(by_name, by_id);
    }

    #[tokio::test]
    async fn test_interface_id_takes_precedence_over_digit_name() {
        let maas = FakeMaas::fixture();
        maas.add_interface(SYSTEM_ID, interface(40, "12", "physical", &[], None));

        let iface = resolve_interface(&maas, SYSTEM_ID, "12").await.expect("resolve");
        assert_eq!(iface.name, "bond0.3342");

        // Digits that are not an existing ID fall back to name matching.
        maas.add_interface(SYSTEM_ID, interface(41, "999", "physical", &[], None));
        let iface = resolve_interface(&maas, SYSTEM_ID, "999").await.expect("resolve");
        assert_eq!(iface.id, 41);
    }

    #[tokio::test]
    async fn test_fabric_by_name_or_id() {
        let maas = FakeMaas::fixture();
        assert_eq!(resolve_fabric(&maas, "fabric-hydc").await.expect("name").id, 2);
        assert_eq!(resolve_fabric(&maas, "2").await.expect("id").name, "fabric-hydc");
        assert!(resolve_fabric(&maas, "fabric-9").await.is_err());
    }

    #[tokio::test]
    async fn test_vlan_by_vid_or_id() {
        let maas = FakeMaas::fixture();
        assert_eq!(resolve_vlan(&maas, 2, "3342").await.expect("vid").id, 5005);
        assert_eq!(resolve_vlan(&maas, 2, "5005").await.expect("id").vid, 3342);
        assert_eq!(resolve_vlan(&maas, 2, "mgmt").await.expect("name").id, 5005);

        let err = resolve_vlan(&maas, 1, "3342").await.expect_err("other fabric");
        assert!(matches!(resolve_err(err), ResolveError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_vlan_vid_and_id_collision_is_ambiguous() {
        let maas = FakeMaas::fixture();
        maas.add_vlan(Vlan {
            id: 3342,
            vid: 100,
            name: String::new(),
            fabric_id: 2,
        });

        let err = resolve_vlan(&maas, 2, "3342").await.expect_err("ambiguous");
        assert!(matches!(resolve_err(err), ResolveError::Ambiguous { .. }));
    }
}
