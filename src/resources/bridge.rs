//! Bridge interface lifecycle.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::BridgeSpec;
use crate::error::{NetifError, ResolveError, Result, ValidationError};
use crate::maas::{MaasApi, NetworkInterface};
use crate::params::build_bridge_params;
use crate::resolver::{resolve_interface, resolve_machine};
use crate::state::BridgeState;

use super::{BRIDGE_IMPORT_COMPONENT, CancelFlag, ImportId, ReadOutcome, expect_present};

/// Creates, reads, updates, deletes and imports bridge interfaces.
pub struct BridgeReconciler {
    api: Arc<dyn MaasApi>,
    cancel: CancelFlag,
}

impl BridgeReconciler {
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

    /// Creates the bridge and returns the snapshot read back from MAAS.
    ///
    /// # Errors
    ///
    /// Fails without mutating anything if `parent` is unset or the machine
    /// or parent cannot be resolved; passes remote rejections through.
    pub async fn create(&self, desired: &BridgeSpec) -> Result<BridgeState> {
        let created = self.create_remote(desired).await?;
        self.read_created(&created).await
    }

    /// Creates the bridge without reading it back.
    ///
    /// The returned snapshot only carries `id`, `machine` and `name`;
    /// record it before calling [`read_created`](Self::read_created) so a
    /// failed read never loses the new interface.
    ///
    /// # Errors
    ///
    /// Same as [`create`](Self::create).
    pub async fn create_remote(&self, desired: &BridgeSpec) -> Result<BridgeState> {
        let parent_ref = required_parent(desired)?;

        let (system_id, parent_id) = self.resolve(desired, parent_ref).await?;
        let params = build_bridge_params(desired, parent_id);

        self.cancel.check()?;
        let created = self.api.create_bridge(&system_id, &params).await?;
        info!(
            "Created bridge {} (id {}) on {system_id}",
            created.name, created.id
        );

        Ok(BridgeState {
            id: created.id,
            machine: desired.machine.clone(),
            name: Some(created.name),
            ..BridgeState::default()
        })
    }

    /// Reads a freshly written bridge; absence is an error here.
    ///
    /// # Errors
    ///
    /// Returns resolution or remote errors, or an internal error if the
    /// bridge is gone.
    pub async fn read_created(&self, created: &BridgeState) -> Result<BridgeState> {
        expect_present(self.read(created).await?, "bridge", created.id)
    }

    /// Reads the bridge back from MAAS.
    ///
    /// Parameter-blob keys MAAS omitted keep their value from `prior`.
    ///
    /// # Errors
    ///
    /// Returns resolution or remote errors; a missing interface or machine
    /// is [`ReadOutcome::Gone`], not an error.
    pub async fn read(&self, prior: &BridgeState) -> Result<ReadOutcome<BridgeState>> {
        self.cancel.check()?;
        let machine = match resolve_machine(self.api.as_ref(), &prior.machine).await {
            Ok(machine) => machine,
            Err(NetifError::Resolve(ResolveError::NotFound { .. })) => {
                warn!(
                    "Machine {} no longer exists; bridge {} is gone with it",
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
                    "Bridge {} on {} no longer exists",
                    prior.id, machine.system_id
                );
                Ok(ReadOutcome::Gone)
            }
            Err(e) => Err(e),
        }
    }

    /// Updates the bridge in place and returns the refreshed snapshot.
    ///
    /// # Errors
    ///
    /// Same as [`create`](Self::create).
    pub async fn update(&self, desired: &BridgeSpec, prior: &BridgeState) -> Result<BridgeState> {
        let parent_ref = required_parent(desired)?;

        let (system_id, parent_id) = self.resolve(desired, parent_ref).await?;
        let params = build_bridge_params(desired, parent_id);

        self.cancel.check()?;
        self.api
            .update_bridge(&system_id, prior.id, &params)
            .await?;
        info!("Updated bridge {} on {system_id}", prior.id);

        let prior = BridgeState {
            machine: desired.machine.clone(),
            ..prior.clone()
        };
        expect_present(self.read(&prior).await?, "bridge", prior.id)
    }

    /// Deletes the bridge. An already-absent bridge counts as deleted.
    ///
    /// # Errors
    ///
    /// Returns resolution errors other than a missing machine, and remote
    /// errors other than not-found.
    pub async fn delete(&self, prior: &BridgeState) -> Result<()> {
        self.cancel.check()?;
        let machine = match resolve_machine(self.api.as_ref(), &prior.machine).await {
            Ok(machine) => machine,
            Err(NetifError::Resolve(ResolveError::NotFound { .. })) => {
                warn!(
                    "Machine {} is gone; bridge {} is gone with it",
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
                info!("Deleted bridge {} on {}", prior.id, machine.system_id);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                info!(
                    "Bridge {} on {} was already absent",
                    prior.id, machine.system_id
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Adopts an existing bridge from a `MACHINE:BRIDGE_ID` identifier.
    ///
    /// # Errors
    ///
    /// Fails with a validation error for a malformed identifier, before any
    /// remote call, and with not-found if the interface does not exist.
    pub async fn import(&self, id: &str) -> Result<BridgeState> {
        let import = ImportId::parse(id, BRIDGE_IMPORT_COMPONENT)?;
        let prior = BridgeState {
            id: import.interface_id,
            machine: import.machine,
            ..BridgeState::default()
        };

        match self.read(&prior).await? {
            ReadOutcome::Present(state) => {
                info!("Imported bridge {id}");
                Ok(state)
            }
            ReadOutcome::Gone => Err(ResolveError::not_found("bridge", id).into()),
        }
    }

    async fn resolve(&self, desired: &BridgeSpec, parent_ref: &str) -> Result<(String, i64)> {
        self.cancel.check()?;
        let machine = resolve_machine(self.api.as_ref(), &desired.machine).await?;

        self.cancel.check()?;
        let parent = resolve_interface(self.api.as_ref(), &machine.system_id, parent_ref).await?;
        debug!(
            "Bridge parent '{parent_ref}' is interface {} on {}",
            parent.id, machine.system_id
        );

        Ok((machine.system_id, parent.id))
    }
}

fn required_parent(desired: &BridgeSpec) -> Result<&str> {
    desired
        .parent
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| {
            ValidationError::MissingField {
                field: format!("bridges.{}.parent", desired.key),
            }
            .into()
        })
}

/// Builds a snapshot from the remote interface, keeping `prior` values for
/// parameter-blob keys MAAS left out.
fn normalize(iface: &NetworkInterface, prior: &BridgeState) -> BridgeState {
    let mut state = prior.clone();

    state.id = iface.id;
    state.name = Some(iface.name.clone());
    state.parent = iface.first_parent().map(String::from);
    state.accept_ra = Some(iface.accept_ra);
    state.autoconf = Some(iface.autoconf);
    state.mac_address = Some(iface.mac_address.clone()).filter(|m| !m.is_empty());
    state.mtu = Some(iface.effective_mtu);
    state.tags = iface.tags.iter().cloned().collect();
    state.vlan = iface.vlan.map(|v| v.id.to_string());

    if let Some(fd) = iface.param_i64("bridge_fd") {
        state.bridge_fd = Some(fd);
    }
    if let Some(stp) = iface.param_bool("bridge_stp") {
        state.bridge_stp = Some(stp);
    }
    if let Some(kind) = iface.param_str("bridge_type") {
        state.bridge_type = Some(kind.to_string());
    }

    state
}
