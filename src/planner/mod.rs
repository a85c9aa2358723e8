//! Planning module.
//!
//! This module compares the manifest with the recorded snapshots and turns
//! the differences into an ordered plan of create, update and delete calls.

mod diff;
mod plan;
mod executor;

pub use diff::{DiffDetail, DiffEngine, DiffResult, DiffType, ResourceDiff};
pub use plan::{ActionType, Plan, PlannedAction};
pub use executor::{ActionResult, ActionStatus, ExecutionResult, PlanExecutor};
