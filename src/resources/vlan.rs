//! VLAN interface lifecycle.
//!
//! Differs from bridges in two ways visible to callers: the desired `vlan`
//! is a tag or ID within a fabric and is resolved to a VLAN ID before the
//! call, and there is no import.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::VlanSpec;
use crate::error::{NetifError, ResolveError, Result};
use crate::maas::{MaasApi, NetworkInterface};
use crate::params::build_vlan_params;
use crate::resolver::{resolve_fabric, resolve_interface, resolve_machine, resolve_vlan};
use crate::state::VlanState;

use super::{CancelFlag, ReadOutcome, expect_present};

/// Creates, reads, updates and deletes VLAN interfaces.
pub struct VlanReconciler {
    api: Arc<dyn MaasApi>,
    cancel: CancelFlag,
}

struct Resolved {
    system_id: String,
    parent_id: i64,
    vlan_id: String,
}

impl VlanReconciler {
    /// Creates a reconciler over the given MAAS API.
    #[must_use]
    pub fn new(api: Arc<dyn MaasApi>) -> Self {
        Self {
            api,
            cancel: CancelFlag::new(),
        }
    }

    /// Shares a cancellation flag with the caller.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Creates the VLAN interface and returns the snapshot read back.
    ///
    /// # Errors
    ///
    /// Fails without mutating anything if the machine, parent, fabric or
    /// VLAN cannot be resolved; passes remote rejections through.
    pub async fn create(&self, desired: &VlanSpec) -> Result<VlanState> {
        let created = self.create_remote(desired).await?;
        self.read_created(&created).await
    }

    /// Creates the VLAN interface without reading it back; the snapshot
    /// only carries `id`, `machine`, `fabric` and `name`.
    ///
    /// # Errors
    ///
    /// Same as [`create`](Self::create).
    pub async fn create_remote(&self, desired: &VlanSpec) -> Result<VlanState> {
        let resolved = self.resolve(desired).await?;
        let params = build_vlan_params(desired, resolved.parent_id, &resolved.vlan_id);

        self.cancel.check()?;
        let created = self.api.create_vlan(&resolved.system_id, &params).await?;
        info!(
            "Created VLAN interface {} (id {}) on {}",
            created.name, created.id, resolved.system_id
        );

        Ok(VlanState {
            id: created.id,
            machine: desired.machine.clone(),
            fabric: desired.fabric.clone(),
            name: Some(created.name),
            ..VlanState::default()
        })
    }

    /// Reads a freshly written VLAN interface; absence is an error here.
    ///
    /// # Errors
    ///
    /// Returns resolution or remote errors, or an internal error if the
    /// interface is gone.
    pub async fn read_created(&self, created: &VlanState) -> Result<VlanState> {
        expect_present(self.read(created).await?, "vlan", created.id)
    }

    /// Reads the VLAN interface back from MAAS.
    ///
    /// # Errors
    ///
    /// Returns resolution or remote errors; a missing interface or machine
    /// is [`ReadOutcome::Gone`].
    pub async fn read(&self, prior: &VlanState) -> Result<ReadOutcome<VlanState>> {
        self.cancel.check()?;
        let machine = match resolve_machine(self.api.as_ref(), &prior.machine).await {
            Ok(machine) => machine,
            Err(NetifError::Resolve(ResolveError::NotFound { .. })) => {
                warn!(
                    "Machine {} no longer exists; VLAN interface {} is gone with it",
                    prior.machine, prior.id
                );
                return Ok(ReadOutcome::Gone);
            }
            Err(e) => return Err(e),
        };

        self.cancel.check()?;
        match self.api.get_interface(&machine.system_id, prior.id).await {
            Ok(iface) => Ok(ReadOutcome::Present(normalize(&iface, prior))),
            Err(e) if e.is_not_found() => {
                warn!(
                    "VLAN interface {} on {} no longer exists",
                    prior.id, machine.system_id
                );
                Ok(ReadOutcome::Gone)
            }
            Err(e) => Err(e),
        }
    }

    /// Updates the VLAN interface in place and returns the refreshed snapshot.
    ///
    /// # Errors
    ///
    /// Same as [`create`](Self::create).
    pub async fn update(&self, desired: &VlanSpec, prior: &VlanState) -> Result<VlanState> {
        let resolved = self.resolve(desired).await?;
        let params = build_vlan_params(desired, resolved.parent_id, &resolved.vlan_id);

        self.cancel.check()?;
        self.api
            .update_vlan(&resolved.system_id, prior.id, &params)
            .await?;
        info!(
            "Updated VLAN interface {} on {}",
            prior.id, resolved.system_id
        );

        let prior = VlanState {
            machine: desired.machine.clone(),
            fabric: desired.fabric.clone(),
            ..prior.clone()
        };
        expect_present(self.read(&prior).await?, "vlan", prior.id)
    }

    /// Deletes the VLAN interface. An already-absent interface counts as deleted.
    ///
    /// # Errors
    ///
    /// Returns resolution errors other than a missing machine, and remote
    /// errors other than not-found.
    pub async fn delete(&self, prior: &VlanState) -> Result<()> {
        self.cancel.check()?;
        let machine = match resolve_machine(self.api.as_ref(), &prior.machine).await {
            Ok(machine) => machine,
            Err(NetifError::Resolve(ResolveError::NotFound { .. })) => {
                warn!(
                    "Machine {} is gone; VLAN interface {} is gone with it",
                    prior.machine, prior.id
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.cancel.check()?;
        match self
            .api
            .delete_interface(&machine.system_id, prior.id)
            .await
        {
            Ok(()) => {
                info!(
                    "Deleted VLAN interface {} on {}",
                    prior.id, machine.system_id
                );
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                info!(
                    "VLAN interface {} on {} was already absent",
                    prior.id, machine.system_id
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn resolve(&self, desired: &VlanSpec) -> Result<Resolved> {
        self.cancel.check()?;
        let machine = resolve_machine(self.api.as_ref(), &desired.machine).await?;

        self.cancel.check()?;
        let parent =
            resolve_interface(self.api.as_ref(), &machine.system_id, &desired.parent).await?;

        self.cancel.check()?;
        let fabric = resolve_fabric(self.api.as_ref(), &desired.fabric).await?;

        self.cancel.check()?;
        let vlan = resolve_vlan(self.api.as_ref(), fabric.id, &desired.vlan).await?;
        debug!(
            "VLAN '{}' in fabric '{}' is VLAN ID {} (VID {})",
            desired.vlan, fabric.name, vlan.id, vlan.vid
        );

        Ok(Resolved {
            system_id: machine.system_id,
            parent_id: parent.id,
            vlan_id: vlan.id.to_string(),
        })
    }
}

/// Builds a snapshot from the remote interface.
///
/// `vlan` is reported as the VID. `accept_ra` is only taken from the
/// parameter blob when MAAS included it there.
fn normalize(iface: &NetworkInterface, prior: &VlanState) -> VlanState {
    let mut state = prior.clone();

    state.id = iface.id;
    state.name = Some(iface.name.clone());
    state.parent = iface.first_parent().map(String::from);
    state.vlan = iface.vlan.map(|v| v.vid.to_string());
    state.vlan_id = iface.vlan.map(|v| v.id);
    state.mtu = Some(iface.effective_mtu);
    state.tags = iface.tags.iter().cloned().collect();

    if let Some(accept_ra) = iface.param_bool("accept-ra") {
        state.accept_ra = Some(accept_ra);
    }

    state
}
