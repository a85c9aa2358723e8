//! State management module.
//!
//! This module persists the snapshots read back from MAAS after every
//! operation, together with machine lookup results and a short history.

mod store;
mod local;
mod lock;
mod types;

pub use store::StateStore;
pub use local::{LocalStateStore, STATE_DIR};
pub use lock::{LockInfo, generate_holder_id};
pub use types::{
    BridgeState, HistoryEntry, MachineState, ManagedResource, Operation, STATE_VERSION,
    SENSITIVE_ATTRIBUTES, Sensitive, StateDocument, VlanState,
};
