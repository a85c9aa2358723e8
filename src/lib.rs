// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # maas-netif
//!
//! Declarative, idempotent management of bridge and VLAN network interfaces
//! on MAAS machines.
//!
//! ## Overview
//!
//! Interfaces are described in `maas-netif.yaml`. The reconciler:
//!
//! - Resolves machines, parent interfaces, fabrics and VLANs from the
//!   identifiers people actually write (hostnames, names, VLAN tags)
//! - Creates, updates and deletes interfaces so MAAS matches the manifest
//! - Records what MAAS reported in a local state file and reports drift
//! - Adopts existing bridges with `MACHINE:BRIDGE_ID` import identifiers
//!
//! ## Architecture
//!
//! 1. **Desired State**: the manifest ([`config`])
//! 2. **Recorded State**: snapshots read back from MAAS ([`state`])
//! 3. **Observed State**: the MAAS API ([`maas`])
//! 4. **Reconciler**: diffs, plans and executes ([`planner`], [`reconciler`])
//!
//! ## Modules
//!
//! - [`config`]: Manifest parsing, validation and hashing
//! - [`maas`]: MAAS API data model, trait and HTTP client
//! - [`resolver`]: Identifier resolution
//! - [`params`]: Request parameter building
//! - [`resources`]: Bridge and VLAN reconcilers, machine lookup
//! - [`state`]: State document and file-backed store
//! - [`planner`]: Diff computation, planning and execution
//! - [`reconciler`]: Refresh, drift detection and apply
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! maas:
//!   url: http://maas.example:5240/MAAS
//!
//! vlans:
//!   - key: bond0-3342
//!     machine: mq4s3r
//!     parent: bond0
//!     fabric: fabric-hydc
//!     vlan: "3342"
//!     mtu: 9000
//!
//! bridges:
//!   - key: mgmt
//!     machine: mq4s3r
//!     name: cloud-brmgmt
//!     parent: bond0.3342
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod maas;
pub mod params;
pub mod planner;
pub mod reconciler;
pub mod resolver;
pub mod resources;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, Manifest};
pub use error::{NetifError, Result};
pub use maas::{MaasApi, MaasClient};
pub use planner::{DiffEngine, Plan, PlanExecutor};
pub use reconciler::{DriftReport, ReconciliationResult, Reconciler, RefreshReport};
pub use resources::{BridgeReconciler, CancelFlag, MachineLookup, VlanReconciler};
pub use state::{LocalStateStore, StateDocument, StateStore};
