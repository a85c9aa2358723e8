//! In-memory MAAS used by reconciler and resolver tests.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::{MaasError, NetifError, Result};
use crate::params::{BridgeParams, VlanParams, split_tags};

use super::api::MaasApi;
use super::types::{
    BootInterface, Fabric, InterfaceVlan, Machine, NamedRef, NetworkInterface, ParamsBlob,
    PowerParameters, Vlan,
};

pub(crate) const SYSTEM_ID: &str = "mq4s3r";
pub(crate) const HOSTNAME: &str = "test-virsh-vm1";
pub(crate) const PXE_MAC: &str = "52:54:00:89:f5:3e";

#[derive(Default)]
struct Inner {
    machines: Vec<Machine>,
    power: BTreeMap<String, PowerParameters>,
    interfaces: BTreeMap<String, Vec<NetworkInterface>>,
    fabrics: Vec<Fabric>,
    vlans: Vec<Vlan>,
    next_id: i64,
    mutations: usize,
}

/// Stateful fake that applies create/update/delete calls like MAAS does,
/// including omitting unset bridge parameters from the params blob.
#[derive(Default)]
pub(crate) struct FakeMaas {
    inner: Mutex<Inner>,
}

impl FakeMaas {
    /// One machine with `eno1 -> bond0 -> bond0.3342`, two fabrics and the
    /// next interface id set to 7.
    pub(crate) fn fixture() -> Self {
        let fake = Self::default();
        {
            let mut inner = fake.inner.lock().expect("lock");
            inner.machines.push(Machine {
                system_id: SYSTEM_ID.to_string(),
                hostname: HOSTNAME.to_string(),
                fqdn: format!("{HOSTNAME}.maas"),
                power_type: String::from("virsh"),
                architecture: String::from("amd64/generic"),
                min_hwe_kernel: Some(String::from("ga-22.04")),
                boot_interface: Some(BootInterface {
                    mac_address: PXE_MAC.to_string(),
                }),
                domain: Some(NamedRef {
                    name: String::from("maas"),
                }),
                zone: Some(NamedRef {
                    name: String::from("default"),
                }),
                pool: Some(NamedRef {
                    name: String::from("default"),
                }),
            });
            inner.power.insert(
                SYSTEM_ID.to_string(),
                [
                    (
                        String::from("power_address"),
                        json!("qemu+ssh://ubuntu@10.113.1.26/system"),
                    ),
                    (String::from("power_id"), json!(HOSTNAME)),
                    (String::from("power_pass"), json!("hunter2")),
                ]
                .into_iter()
                .collect(),
            );
            inner.fabrics = vec![
                Fabric {
                    id: 1,
                    name: String::from("fabric-0"),
                },
                Fabric {
                    id: 2,
                    name: String::from("fabric-hydc"),
                },
            ];
            inner.vlans = vec![
                vlan(5001, 0, 1, "untagged"),
                vlan(5004, 0, 2, "untagged"),
                vlan(5005, 3342, 2, "mgmt"),
            ];
            let untagged = Some(InterfaceVlan {
                id: 5004,
                vid: 0,
                fabric_id: 2,
            });
            inner.interfaces.insert(
                SYSTEM_ID.to_string(),
                vec![
                    interface(1, "eno1", "physical", &[], untagged),
                    interface(3, "bond0", "bond", &["eno1"], untagged),
                    interface(
                        12,
                        "bond0.3342",
                        "vlan",
                        &["bond0"],
                        Some(InterfaceVlan {
                            id: 5005,
                            vid: 3342,
                            fabric_id: 2,
                        }),
                    ),
                ],
            );
            inner.next_id = 7;
        }
        fake
    }

    pub(crate) fn add_machine(&self, machine: Machine) {
        self.inner.lock().expect("lock").machines.push(machine);
    }

    pub(crate) fn add_interface(&self, system_id: &str, iface: NetworkInterface) {
        self.inner
            .lock()
            .expect("lock")
            .interfaces
            .entry(system_id.to_string())
            .or_default()
            .push(iface);
    }

    pub(crate) fn add_vlan(&self, vlan: Vlan) {
        self.inner.lock().expect("lock").vlans.push(vlan);
    }

    /// Returns a copy of an interface as currently stored.
    pub(crate) fn interface(&self, system_id: &str, id: i64) -> Option<NetworkInterface> {
        let inner = self.inner.lock().expect("lock");
        inner
            .interfaces
            .get(system_id)
            .and_then(|list| list.iter().find(|i| i.id == id).cloned())
    }

    /// Deletes an interface behind the reconciler's back.
    pub(crate) fn remove_out_of_band(&self, system_id: &str, id: i64) {
        let mut inner = self.inner.lock().expect("lock");
        if let Some(list) = inner.interfaces.get_mut(system_id) {
            list.retain(|i| i.id != id);
        }
    }

    /// Decommissions a machine together with its interfaces.
    pub(crate) fn remove_machine(&self, system_id: &str) {
        let mut inner = self.inner.lock().expect("lock");
        inner.machines.retain(|m| m.system_id != system_id);
        inner.interfaces.remove(system_id);
    }

    /// Mutates an interface behind the reconciler's back.
    pub(crate) fn edit_out_of_band(
        &self,
        system_id: &str,
        id: i64,
        edit: impl FnOnce(&mut NetworkInterface),
    ) {
        let mut inner = self.inner.lock().expect("lock");
        if let Some(iface) = inner
            .interfaces
            .get_mut(system_id)
            .and_then(|list| list.iter_mut().find(|i| i.id == id))
        {
            edit(iface);
        }
    }

    /// Number of create/update/delete calls received.
    pub(crate) fn mutations(&self) -> usize {
        self.inner.lock().expect("lock").mutations
    }
}

fn vlan(id: i64, vid: i64, fabric_id: i64, name: &str) -> Vlan {
    Vlan {
        id,
        vid,
        name: name.to_string(),
        fabric_id,
    }
}

pub(crate) fn interface(
    id: i64,
    name: &str,
    kind: &str,
    parents: &[&str],
    vlan: Option<InterfaceVlan>,
) -> NetworkInterface {
    NetworkInterface {
        id,
        name: name.to_string(),
        interface_type: kind.to_string(),
        mac_address: PXE_MAC.to_string(),
        effective_mtu: 1500,
        tags: Vec::new(),
        parents: parents.iter().map(|p| (*p).to_string()).collect(),
        vlan,
        accept_ra: false,
        autoconf: false,
        params: ParamsBlob::new(),
    }
}

fn not_found(resource: String) -> NetifError {
    NetifError::Maas(MaasError::NotFound { resource })
}

fn rejected(body: String) -> NetifError {
    NetifError::Maas(MaasError::api_error(400, body))
}

impl Inner {
    fn interfaces_of(&self, system_id: &str) -> Result<&Vec<NetworkInterface>> {
        self.interfaces
            .get(system_id)
            .ok_or_else(|| not_found(format!("nodes/{system_id}/")))
    }

    fn interface_mut(&mut self, system_id: &str, id: i64) -> Result<&mut NetworkInterface> {
        self.interfaces
            .get_mut(system_id)
            .and_then(|list| list.iter_mut().find(|i| i.id == id))
            .ok_or_else(|| not_found(format!("nodes/{system_id}/interfaces/{id}/")))
    }

    fn parent(&self, system_id: &str, parent_id: i64) -> Result<NetworkInterface> {
        self.interfaces_of(system_id)?
            .iter()
            .find(|i| i.id == parent_id)
            .cloned()
            .ok_or_else(|| rejected(format!("{{\"parent\": [\"{parent_id} is not a valid interface.\"]}}")))
    }

    fn vlan_ref(&self, vlan_id: &str) -> Result<InterfaceVlan> {
        vlan_id
            .parse::<i64>()
            .ok()
            .and_then(|id| self.vlans.iter().find(|v| v.id == id))
            .map(|v| InterfaceVlan {
                id: v.id,
                vid: v.vid,
                fabric_id: v.fabric_id,
            })
            .ok_or_else(|| rejected(format!("{{\"vlan\": [\"{vlan_id} is not a valid VLAN.\"]}}")))
    }

    fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

fn check_bridge_type(params: &BridgeParams) -> Result<()> {
    match params.bridge_type.as_deref() {
        None | Some("standard" | "ovs") => Ok(()),
        Some(other) => Err(rejected(format!(
            "{{\"bridge_type\": [\"Select a valid choice. {other} is not one of the available choices.\"]}}"
        ))),
    }
}

fn apply_bridge_params(iface: &mut NetworkInterface, params: &BridgeParams, parent_name: &str) {
    if let Some(name) = &params.name {
        iface.name.clone_from(name);
    }
    if let Some(mac) = &params.mac_address {
        iface.mac_address.clone_from(mac);
    }
    if let Some(mtu) = params.mtu {
        iface.effective_mtu = mtu;
    }
    if let Some(accept_ra) = params.accept_ra {
        iface.accept_ra = accept_ra;
    }
    if let Some(autoconf) = params.autoconf {
        iface.autoconf = autoconf;
    }
    iface.tags = split_tags(&params.tags).into_iter().collect();
    iface.parents = vec![parent_name.to_string()];
    if let Some(bridge_type) = &params.bridge_type {
        iface
            .params
            .insert(String::from("bridge_type"), Value::from(bridge_type.clone()));
    }
    if let Some(stp) = params.bridge_stp {
        iface.params.insert(String::from("bridge_stp"), Value::from(stp));
    }
    if let Some(fd) = params.bridge_fd {
        iface.params.insert(String::from("bridge_fd"), Value::from(fd));
    }
}

fn apply_vlan_params(
    iface: &mut NetworkInterface,
    params: &VlanParams,
    parent: &NetworkInterface,
    vlan: InterfaceVlan,
) {
    iface.name = format!("{}.{}", parent.name, vlan.vid);
    iface.parents = vec![parent.name.clone()];
    iface.vlan = Some(vlan);
    iface.tags.clone_from(&params.tags);
    if let Some(mtu) = params.mtu {
        iface.effective_mtu = mtu;
    }
    if let Some(accept_ra) = params.accept_ra {
        iface.accept_ra = accept_ra;
        iface
            .params
            .insert(String::from("accept-ra"), Value::from(accept_ra));
    }
}

#[async_trait]
impl MaasApi for FakeMaas {
    async fn list_machines(&self) -> Result<Vec<Machine>> {
        Ok(self.inner.lock().expect("lock").machines.clone())
    }

    async fn get_power_parameters(&self, system_id: &str) -> Result<PowerParameters> {
        let inner = self.inner.lock().expect("lock");
        inner
            .power
            .get(system_id)
            .cloned()
            .ok_or_else(|| not_found(format!("machines/{system_id}/")))
    }

    async fn list_interfaces(&self, system_id: &str) -> Result<Vec<NetworkInterface>> {
        let inner = self.inner.lock().expect("lock");
        inner.interfaces_of(system_id).cloned()
    }

    async fn get_interface(&self, system_id: &str, interface_id: i64) -> Result<NetworkInterface> {
        let inner = self.inner.lock().expect("lock");
        inner
            .interfaces_of(system_id)?
            .iter()
            .find(|i| i.id == interface_id)
            .cloned()
            .ok_or_else(|| not_found(format!("nodes/{system_id}/interfaces/{interface_id}/")))
    }

    async fn create_bridge(
        &self,
        system_id: &str,
        params: &BridgeParams,
    ) -> Result<NetworkInterface> {
        let mut inner = self.inner.lock().expect("lock");
        inner.mutations += 1;
        check_bridge_type(params)?;

        let parent = inner.parent(system_id, params.parent)?;
        let vlan = match &params.vlan {
            Some(id) => Some(inner.vlan_ref(id)?),
            None => parent.vlan,
        };
        let id = inner.allocate_id();

        let mut iface = NetworkInterface {
            id,
            name: format!("br{id}"),
            interface_type: String::from("bridge"),
            mac_address: parent.mac_address.clone(),
            effective_mtu: parent.effective_mtu,
            vlan,
            ..interface(id, "", "bridge", &[], None)
        };
        iface
            .params
            .insert(String::from("bridge_type"), Value::from("standard"));
        apply_bridge_params(&mut iface, params, &parent.name);

        inner
            .interfaces
            .entry(system_id.to_string())
            .or_default()
            .push(iface.clone());
        Ok(iface)
    }

    async fn create_vlan(&self, system_id: &str, params: &VlanParams) -> Result<NetworkInterface> {
        let mut inner = self.inner.lock().expect("lock");
        inner.mutations += 1;

        let parent = inner.parent(system_id, params.parent)?;
        let vlan = inner.vlan_ref(&params.vlan)?;
        let id = inner.allocate_id();

        let mut iface = NetworkInterface {
            mac_address: parent.mac_address.clone(),
            effective_mtu: parent.effective_mtu,
            ..interface(id, "", "vlan", &[], None)
        };
        apply_vlan_params(&mut iface, params, &parent, vlan);

        inner
            .interfaces
            .entry(system_id.to_string())
            .or_default()
            .push(iface.clone());
        Ok(iface)
    }

    async fn update_bridge(
        &self,
        system_id: &str,
        interface_id: i64,
        params: &BridgeParams,
    ) -> Result<NetworkInterface> {
        let mut inner = self.inner.lock().expect("lock");
        inner.mutations += 1;
        check_bridge_type(params)?;

        let parent = inner.parent(system_id, params.parent)?;
        let vlan = params.vlan.as_deref().map(|v| inner.vlan_ref(v)).transpose()?;
        let iface = inner.interface_mut(system_id, interface_id)?;
        if vlan.is_some() {
            iface.vlan = vlan;
        }
        apply_bridge_params(iface, params, &parent.name);
        Ok(iface.clone())
    }

    async fn update_vlan(
        &self,
        system_id: &str,
        interface_id: i64,
        params: &VlanParams,
    ) -> Result<NetworkInterface> {
        let mut inner = self.inner.lock().expect("lock");
        inner.mutations += 1;

        let parent = inner.parent(system_id, params.parent)?;
        let vlan = inner.vlan_ref(&params.vlan)?;
        let iface = inner.interface_mut(system_id, interface_id)?;
        apply_vlan_params(iface, params, &parent, vlan);
        Ok(iface.clone())
    }

    async fn delete_interface(&self, system_id: &str, interface_id: i64) -> Result<()> {
        let mut inner = self.inner.lock().expect("lock");
        inner.mutations += 1;

        let list = inner
            .interfaces
            .get_mut(system_id)
            .ok_or_else(|| not_found(format!("nodes/{system_id}/")))?;
        let before = list.len();
        list.retain(|i| i.id != interface_id);
        if list.len() == before {
            return Err(not_found(format!(
                "nodes/{system_id}/interfaces/{interface_id}/"
            )));
        }
        Ok(())
    }

    async fn list_fabrics(&self) -> Result<Vec<Fabric>> {
        Ok(self.inner.lock().expect("lock").fabrics.clone())
    }

    async fn list_vlans(&self, fabric_id: i64) -> Result<Vec<Vlan>> {
        let inner = self.inner.lock().expect("lock");
        if !inner.fabrics.iter().any(|f| f.id == fabric_id) {
            return Err(not_found(format!("fabrics/{fabric_id}/")));
        }
        Ok(inner
            .vlans
            .iter()
            .filter(|v| v.fabric_id == fabric_id)
            .cloned()
            .collect())
    }
}
