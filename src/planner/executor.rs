//! Plan executor.
//!
//! Runs a plan one action at a time and writes each successful result into
//! the state document straight away, so a failed run still records what
//! was already changed.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::{Manifest, ResourceKind};
use crate::error::{NetifError, Result, StateError};
use crate::resources::{BridgeReconciler, VlanReconciler};
use crate::state::{HistoryEntry, Operation, StateDocument};

use super::plan::{ActionType, Plan, PlannedAction};

/// Executor for plans.
pub struct PlanExecutor<'a> {
    bridges: &'a BridgeReconciler,
    vlans: &'a VlanReconciler,
    continue_on_error: bool,
}

/// Outcome of a single action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    /// The action completed.
    Succeeded,
    /// The action failed.
    Failed,
    /// The action was not attempted.
    Skipped,
}

/// Result of executing a single action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    /// Action that was executed.
    pub action: PlannedAction,
    /// Outcome.
    pub status: ActionStatus,
    /// Interface ID after the action (create/update).
    pub interface_id: Option<i64>,
    /// Error message (failed) or skip reason.
    pub error: Option<String>,
}

/// Result of executing the entire plan.
#[derive(Debug, Default, Serialize)]
pub struct ExecutionResult {
    /// Individual action results in plan order.
    pub results: Vec<ActionResult>,
    /// Number of successful actions.
    pub successful: usize,
    /// Number of failed actions.
    pub failed: usize,
    /// Number of skipped actions.
    pub skipped: usize,
    /// Whether the run stopped because of cancellation.
    pub cancelled: bool,
}

impl<'a> PlanExecutor<'a> {
    /// Creates a new plan executor.
    #[must_use]
    pub const fn new(bridges: &'a BridgeReconciler, vlans: &'a VlanReconciler) -> Self {
        Self {
            bridges,
            vlans,
            continue_on_error: false,
        }
    }

    /// Sets whether to continue on errors.
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Executes the plan against `state`.
    ///
    /// Action failures are reported in the result, not as an error.
    pub async fn execute(
        &self,
        plan: &Plan,
        manifest: &Manifest,
        state: &mut StateDocument,
    ) -> ExecutionResult {
        info!("Executing plan with {} actions", plan.action_count());

        let mut result = ExecutionResult::default();
        let mut stop_reason: Option<String> = None;

        for action in &plan.actions {
            if let Some(reason) = &stop_reason {
                result.push(action, ActionStatus::Skipped, None, Some(reason.clone()));
                continue;
            }

            // A replacement whose delete failed must not create a second interface.
            if action.action_type == ActionType::Create && state.contains(action.kind, &action.key) {
                warn!("Skipping {}: still tracked in state", action.description());
                result.push(
                    action,
                    ActionStatus::Skipped,
                    None,
                    Some(String::from("previous interface was not deleted")),
                );
                continue;
            }

            info!("{}", action.description());
            match self.execute_action(action, manifest, state).await {
                Ok(id) => result.push(action, ActionStatus::Succeeded, id, None),
                Err(NetifError::Cancelled) => {
                    warn!("Cancelled before {}", action.description());
                    result.cancelled = true;
                    result.push(action, ActionStatus::Skipped, None, Some(String::from("cancelled")));
                    stop_reason = Some(String::from("cancelled"));
                }
                Err(e) => {
                    error!("{} failed: {e}", action.description());
                    result.push(action, ActionStatus::Failed, None, Some(e.to_string()));
                    if !self.continue_on_error {
                        stop_reason = Some(String::from("an earlier action failed"));
                    }
                }
            }
        }

        let resources = plan
            .actions
            .iter()
            .map(|a| format!("{}.{}", a.kind, a.key))
            .collect();
        state.add_history(if result.failed == 0 && !result.cancelled {
            HistoryEntry::new(Operation::Apply, resources)
        } else {
            HistoryEntry::failed(
                Operation::Apply,
                resources,
                &format!("{} failed, {} skipped", result.failed, result.skipped),
            )
        });

        result
    }

    async fn execute_action(
        &self,
        action: &PlannedAction,
        manifest: &Manifest,
        state: &mut StateDocument,
    ) -> Result<Option<i64>> {
        let hash = action.new_hash.as_deref().unwrap_or_default();

        match (action.kind, action.action_type) {
            (ResourceKind::Bridge, ActionType::Create) => {
                let spec = manifest.bridge(&action.key).ok_or_else(|| missing_spec(action))?;
                let created = self.bridges.create_remote(spec).await?;
                let id = created.id;
                state.set_bridge(&action.key, hash, created.clone());
                let snapshot = self.bridges.read_created(&created).await?;
                state.set_bridge(&action.key, hash, snapshot);
                Ok(Some(id))
            }
            (ResourceKind::Bridge, ActionType::Update) => {
                let spec = manifest.bridge(&action.key).ok_or_else(|| missing_spec(action))?;
                let prior = state.bridge(&action.key).ok_or_else(|| untracked(action))?;
                let snapshot = self.bridges.update(spec, &prior.snapshot).await?;
                let id = snapshot.id;
                state.set_bridge(&action.key, hash, snapshot);
                Ok(Some(id))
            }
            (ResourceKind::Bridge, ActionType::Delete) => {
                let prior = state.bridge(&action.key).ok_or_else(|| untracked(action))?;
                self.bridges.delete(&prior.snapshot).await?;
                state.remove(ResourceKind::Bridge, &action.key);
                Ok(None)
            }
            (ResourceKind::Vlan, ActionType::Create) => {
                let spec = manifest.vlan(&action.key).ok_or_else(|| missing_spec(action))?;
                let created = self.vlans.create_remote(spec).await?;
                let id = created.id;
                state.set_vlan(&action.key, hash, created.clone());
                let snapshot = self.vlans.read_created(&created).await?;
                state.set_vlan(&action.key, hash, snapshot);
                Ok(Some(id))
            }
            (ResourceKind::Vlan, ActionType::Update) => {
                let spec = manifest.vlan(&action.key).ok_or_else(|| missing_spec(action))?;
                let prior = state.vlan(&action.key).ok_or_else(|| untracked(action))?;
                let snapshot = self.vlans.update(spec, &prior.snapshot).await?;
                let id = snapshot.id;
                state.set_vlan(&action.key, hash, snapshot);
                Ok(Some(id))
            }
            (ResourceKind::Vlan, ActionType::Delete) => {
                let prior = state.vlan(&action.key).ok_or_else(|| untracked(action))?;
                self.vlans.delete(&prior.snapshot).await?;
                state.remove(ResourceKind::Vlan, &action.key);
                Ok(None)
            }
        }
    }
}

fn missing_spec(action: &PlannedAction) -> NetifError {
    NetifError::internal(format!("{} is not in the manifest", action.description()))
}

fn untracked(action: &PlannedAction) -> NetifError {
    NetifError::State(StateError::UnknownResource {
        kind: action.kind.to_string(),
        key: action.key.clone(),
    })
}

impl ExecutionResult {
    fn push(
        &mut self,
        action: &PlannedAction,
        status: ActionStatus,
        interface_id: Option<i64>,
        error: Option<String>,
    ) {
        match status {
            ActionStatus::Succeeded => self.successful += 1,
            ActionStatus::Failed => self.failed += 1,
            ActionStatus::Skipped => self.skipped += 1,
        }
        self.results.push(ActionResult {
            action: action.clone(),
            status,
            interface_id,
            error,
        });
    }

    /// Returns true if all actions succeeded.
    #[must_use]
    pub const fn all_successful(&self) -> bool {
        self.failed == 0 && self.skipped == 0 && !self.cancelled
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Executed {} actions: {} successful, {} failed, {} skipped",
            self.results.len(),
            self.successful,
            self.failed,
            self.skipped
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}
