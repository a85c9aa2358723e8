//! Lifecycle operations for managed interfaces and machine lookups.
//!
//! Each reconciler resolves identifiers, builds request parameters, calls
//! MAAS and reads the result back into a snapshot. Operations on one
//! resource never overlap; the cancellation flag is checked before every
//! remote call.

mod bridge;
mod machine;
mod vlan;

pub use bridge::BridgeReconciler;
pub use machine::MachineLookup;
pub use vlan::VlanReconciler;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{NetifError, Result, ValidationError};

/// Second component name of a bridge import ID.
pub const BRIDGE_IMPORT_COMPONENT: &str = "BRIDGE_ID";

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fails with [`NetifError::Cancelled`] once cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if the flag is set.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(NetifError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Outcome of reading a managed interface back from MAAS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome<S> {
    /// The interface exists; here is its current snapshot.
    Present(S),
    /// The interface no longer exists remotely.
    Gone,
}

impl<S> ReadOutcome<S> {
    /// Returns the snapshot, if present.
    pub fn present(self) -> Option<S> {
        match self {
            Self::Present(s) => Some(s),
            Self::Gone => None,
        }
    }
}

/// A parsed `MACHINE:INTERFACE_ID` import identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportId {
    /// Machine identifier (system ID, hostname or FQDN).
    pub machine: String,
    /// Interface ID.
    pub interface_id: i64,
}

impl ImportId {
    /// Parses `MACHINE:INTERFACE_ID` on a single separator.
    ///
    /// `expected` names the second component in the error message.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ImportIdFormat`] unless there are exactly
    /// two non-empty parts, and [`ValidationError::InterfaceId`] if the
    /// second part is not an integer.
    pub fn parse(id: &str, expected: &'static str) -> std::result::Result<Self, ValidationError> {
        let parts: Vec<&str> = id.split(':').collect();

        let [machine, interface] = parts.as_slice() else {
            return Err(ValidationError::ImportIdFormat {
                id: id.to_string(),
                expected,
            });
        };
        if machine.is_empty() || interface.is_empty() {
            return Err(ValidationError::ImportIdFormat {
                id: id.to_string(),
                expected,
            });
        }

        let interface_id = interface
            .parse::<i64>()
            .map_err(|_| ValidationError::InterfaceId {
                id: (*interface).to_string(),
            })?;

        Ok(Self {
            machine: (*machine).to_string(),
            interface_id,
        })
    }
}

/// Turns a `Gone` directly after a write into an error.
fn expect_present<S>(outcome: ReadOutcome<S>, kind: &str, id: i64) -> Result<S> {
    outcome.present().ok_or_else(|| {
        NetifError::internal(format!("{kind} {id} disappeared right after it was written"))
    })
}
