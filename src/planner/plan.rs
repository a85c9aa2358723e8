//! Execution plans built from diffs.
//!
//! Deletes run first, bridges before VLAN interfaces, because a bridge may
//! sit on top of a VLAN interface. Creates and updates follow in the
//! opposite order.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::ResourceKind;

use super::diff::{DiffResult, DiffType, ResourceDiff};

/// An ordered list of actions.
#[derive(Debug, Serialize)]
pub struct Plan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Planned actions in execution order.
    pub actions: Vec<PlannedAction>,
}

/// A single planned action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedAction {
    /// Action type.
    pub action_type: ActionType,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Resource key.
    pub key: String,
    /// Why the action is needed.
    pub reason: String,
    /// Spec hash to record on success (create/update).
    pub new_hash: Option<String>,
}

/// Types of actions in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Create the interface.
    Create,
    /// Update the interface in place.
    Update,
    /// Delete the interface.
    Delete,
}

/// Deletes run in this kind order; creates and updates in reverse.
const DELETE_ORDER: [ResourceKind; 2] = [ResourceKind::Bridge, ResourceKind::Vlan];
const APPLY_ORDER: [ResourceKind; 2] = [ResourceKind::Vlan, ResourceKind::Bridge];

impl Plan {
    /// Builds a plan from a diff result. Replacements become a delete
    /// followed by a create.
    #[must_use]
    pub fn from_diff(diff: &DiffResult) -> Self {
        let mut actions = Vec::new();

        for kind in DELETE_ORDER {
            for d in diff.diffs.iter().filter(|d| d.kind == kind) {
                match d.diff_type {
                    DiffType::Delete => {
                        actions.push(action(ActionType::Delete, d, "removed from manifest", None));
                    }
                    DiffType::Replace => {
                        actions.push(action(ActionType::Delete, d, &replace_reason(d), None));
                    }
                    _ => {}
                }
            }
        }

        for kind in APPLY_ORDER {
            for d in diff.diffs.iter().filter(|d| d.kind == kind) {
                match d.diff_type {
                    DiffType::Create => {
                        actions.push(action(ActionType::Create, d, "added to manifest", d.new_hash.clone()));
                    }
                    DiffType::Replace => {
                        actions.push(action(ActionType::Create, d, &replace_reason(d), d.new_hash.clone()));
                    }
                    DiffType::Update => {
                        let fields: Vec<&str> = d.details.iter().map(|x| x.field.as_str()).collect();
                        actions.push(action(
                            ActionType::Update,
                            d,
                            &format!("changed: {}", fields.join(", ")),
                            d.new_hash.clone(),
                        ));
                    }
                    _ => {}
                }
            }
        }

        Self {
            created_at: Utc::now(),
            actions,
        }
    }

    /// Returns true if the plan has no actions.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns the number of actions.
    #[must_use]
    pub const fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Returns the number of actions of one type.
    #[must_use]
    pub fn count(&self, action_type: ActionType) -> usize {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .count()
    }
}

fn action(action_type: ActionType, diff: &ResourceDiff, reason: &str, new_hash: Option<String>) -> PlannedAction {
    PlannedAction {
        action_type,
        kind: diff.kind,
        key: diff.key.clone(),
        reason: reason.to_string(),
        new_hash,
    }
}

fn replace_reason(diff: &ResourceDiff) -> String {
    let fields: Vec<&str> = diff.details.iter().map(|d| d.field.as_str()).collect();
    format!("replace: {} cannot change in place", fields.join(", "))
}

impl PlannedAction {
    /// Returns a human-readable description of the action.
    #[must_use]
    pub fn description(&self) -> String {
        let verb = match self.action_type {
            ActionType::Create => "Create",
            ActionType::Update => "Update",
            ActionType::Delete => "Delete",
        };
        format!("{verb} {} '{}'", self.kind, self.key)
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}.{}", self.action_type, self.kind, self.key)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.actions.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(f, "Plan ({} actions):", self.actions.len())?;
        for (i, action) in self.actions.iter().enumerate() {
            writeln!(f, "  {}. {action}", i + 1)?;
        }
        Ok(())
    }
}
