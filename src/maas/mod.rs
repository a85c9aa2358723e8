//! MAAS API integration module.
//!
//! This module provides the remote inventory data model, the [`MaasApi`]
//! trait every resolver and reconciler consumes, and the HTTP client that
//! implements it.

mod api;
mod client;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use api::MaasApi;
#[cfg(test)]
pub use api::MockMaasApi;
pub use client::MaasClient;
pub use types::{
    BootInterface, Fabric, InterfaceVlan, Machine, NamedRef, NetworkInterface, ParamsBlob,
    PowerParameters, Vlan,
};
