//! Configuration module for the reconciler.
//!
//! This module handles everything about the desired state:
//! - Parsing and deserializing `maas-netif.yaml`
//! - Validation of manifest values before any remote call
//! - Hashing desired-state entries for change detection

mod spec;
mod parser;
mod validator;
mod hash;

pub use spec::{
    BridgeSpec, DEFAULT_API_VERSION, MaasConfig, MachineQuery, Manifest, ResourceKind,
    StateConfig, VlanSpec,
};
pub use parser::{API_KEY_VAR, ConfigParser, find_config_file};
pub use validator::{ConfigValidator, ValidationResult, is_valid_mac};
pub use hash::ConfigHasher;
