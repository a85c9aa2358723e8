//! The remote inventory interface consumed by the reconciler.
//!
//! Every resolver and reconciler takes an implementation of [`MaasApi`]
//! from its caller, so tests swap in an in-memory fake.

use async_trait::async_trait;

use crate::error::Result;
use crate::params::{BridgeParams, VlanParams};

use super::types::{Fabric, Machine, NetworkInterface, PowerParameters, Vlan};

/// Typed calls against the MAAS inventory.
///
/// Implementations must map a missing object to
/// [`MaasError::NotFound`](crate::error::MaasError::NotFound).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MaasApi: Send + Sync {
    /// Lists all machines.
    async fn list_machines(&self) -> Result<Vec<Machine>>;

    /// Fetches the power parameters of a machine.
    async fn get_power_parameters(&self, system_id: &str) -> Result<PowerParameters>;

    /// Lists the interfaces of a machine.
    async fn list_interfaces(&self, system_id: &str) -> Result<Vec<NetworkInterface>>;

    /// Fetches one interface of a machine.
    async fn get_interface(&self, system_id: &str, interface_id: i64) -> Result<NetworkInterface>;

    /// Creates a bridge interface.
    async fn create_bridge(&self, system_id: &str, params: &BridgeParams)
    -> Result<NetworkInterface>;

    /// Creates a VLAN interface.
    async fn create_vlan(&self, system_id: &str, params: &VlanParams) -> Result<NetworkInterface>;

    /// Updates a bridge interface in place.
    async fn update_bridge(
        &self,
        system_id: &str,
        interface_id: i64,
        params: &BridgeParams,
    ) -> Result<NetworkInterface>;

    /// Updates a VLAN interface in place.
    async fn update_vlan(
        &self,
        system_id: &str,
        interface_id: i64,
        params: &VlanParams,
    ) -> Result<NetworkInterface>;

    /// Deletes an interface.
    async fn delete_interface(&self, system_id: &str, interface_id: i64) -> Result<()>;

    /// Lists all fabrics.
    async fn list_fabrics(&self) -> Result<Vec<Fabric>>;

    /// Lists the VLANs of a fabric.
    async fn list_vlans(&self, fabric_id: i64) -> Result<Vec<Vlan>>;
}
