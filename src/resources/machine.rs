//! Read-only machine lookup.

use std::sync::Arc;
use tracing::debug;

use crate::config::MachineQuery;
use crate::error::Result;
use crate::maas::MaasApi;
use crate::resolver::{resolve_machine_by_hostname, resolve_machine_by_mac};
use crate::state::{MachineState, Sensitive};

use super::CancelFlag;

/// Looks up a machine by hostname or PXE MAC address.
pub struct MachineLookup {
    api: Arc<dyn MaasApi>,
    cancel: CancelFlag,
}

impl MachineLookup {
    /// Creates a lookup over the given MAAS API.
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

    /// Resolves the query and fetches the machine's power parameters.
    ///
    /// # Errors
    ///
    /// Fails with a validation error, before any remote call, unless exactly
    /// one of `hostname` and `pxe_mac_address` is set.
    pub async fn read(&self, query: &MachineQuery) -> Result<MachineState> {
        let identifier = query.identifier()?;
        let by_hostname = query
            .hostname
            .as_deref()
            .is_some_and(|h| !h.trim().is_empty());

        self.cancel.check()?;
        let machine = if by_hostname {
            resolve_machine_by_hostname(self.api.as_ref(), identifier).await?
        } else {
            resolve_machine_by_mac(self.api.as_ref(), identifier).await?
        };

        self.cancel.check()?;
        let power_parameters = self.api.get_power_parameters(&machine.system_id).await?;
        debug!(
            "Machine lookup '{}' resolved to {}",
            query.key, machine.system_id
        );

        let pxe_mac_address = machine.pxe_mac_address().map(String::from);
        Ok(MachineState {
            id: machine.system_id,
            hostname: machine.hostname,
            fqdn: machine.fqdn,
            power_type: machine.power_type,
            power_parameters: Sensitive::new(power_parameters),
            pxe_mac_address,
            architecture: machine.architecture,
            min_hwe_kernel: machine.min_hwe_kernel,
            domain: machine.domain.map(|d| d.name),
            zone: machine.zone.map(|z| z.name),
            pool: machine.pool.map(|p| p.name),
        })
    }
}
