//! Output formatting for CLI commands.
//!
//! Text output uses colors and tables; JSON output is meant for scripts.
//! Power parameters are redacted in both.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ValidationResult;
use crate::planner::{ActionType, Plan};
use crate::reconciler::{DriftReport, ReconciliationResult, RefreshReport};
use crate::state::{BridgeState, MachineState, Sensitive, StateDocument};

use super::commands::OutputFormat;

const REDACTED: &str = "(sensitive value)";

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Tracked interface row for table display.
#[derive(Tabled)]
struct InterfaceRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Machine")]
    machine: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Parent")]
    parent: String,
    #[tabled(rename = "VLAN")]
    vlan: String,
    #[tabled(rename = "MTU")]
    mtu: String,
}

/// Machine lookup row for table display.
#[derive(Tabled)]
struct MachineRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "System ID")]
    id: String,
    #[tabled(rename = "FQDN")]
    fqdn: String,
    #[tabled(rename = "Power")]
    power_type: String,
    #[tabled(rename = "PXE MAC")]
    pxe_mac: String,
    #[tabled(rename = "Zone/Pool")]
    placement: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &Plan) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(plan).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    fn format_plan_text(plan: &Plan) -> String {
        if plan.is_empty() {
            return format!(
                "{} No changes required - interfaces match the manifest.\n",
                "✓".green()
            );
        }

        let rows: Vec<PlanActionRow> = plan
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| PlanActionRow {
                index: i + 1,
                action: Self::format_action_type(a.action_type),
                resource: format!("{}.{}", a.kind, a.key),
                reason: Self::truncate(&a.reason, 50),
            })
            .collect();

        let mut output = String::from("\nPlan\n\n");
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to delete\n",
            plan.count(ActionType::Create).to_string().green(),
            plan.count(ActionType::Update).to_string().yellow(),
            plan.count(ActionType::Delete).to_string().red()
        );

        output
    }

    /// Formats validation results.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "valid": result.is_valid(),
                "warnings": result.warnings,
            }))
            .unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = format!("{} Manifest is valid.\n", "✓".green());
                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats a drift report.
    #[must_use]
    pub fn format_drift(&self, report: &DriftReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                if report.is_converged() {
                    return format!("{} No drift detected - state is converged.\n", "✓".green());
                }

                let mut output = format!("{} Drift detected:\n\n", "⚠".yellow());
                for resource in &report.drifted_resources {
                    let _ = writeln!(output, "   - {resource}");
                }
                for resource in &report.removed_resources {
                    let _ = writeln!(output, "   - {resource}: {}", "deleted outside of maas-netif".red());
                }
                let _ = write!(
                    output,
                    "\n{}/{} resources have drifted ({} tracked).\n",
                    report.drifted_resources.len() + report.removed_resources.len(),
                    report.total_resources,
                    report.tracked_count
                );
                output
            }
        }
    }

    /// Formats an apply result.
    #[must_use]
    pub fn format_reconciliation(&self, result: &ReconciliationResult) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Text => {
                let status = if result.execution.cancelled {
                    format!("{} Apply cancelled", "✗".red())
                } else if result.success {
                    format!("{} Apply complete", "✓".green())
                } else {
                    format!("{} Apply failed", "✗".red())
                };

                let mut output = format!("{status}\n\n");
                let _ = writeln!(output, "   Created: {}", result.created);
                let _ = writeln!(output, "   Updated: {}", result.updated);
                let _ = writeln!(output, "   Replaced: {}", result.replaced);
                let _ = writeln!(output, "   Deleted: {}", result.deleted);
                let _ = writeln!(output, "   Unchanged: {}", result.unchanged);
                if result.execution.skipped > 0 {
                    let _ = writeln!(output, "   Skipped: {}", result.execution.skipped);
                }

                if !result.errors.is_empty() {
                    let _ = write!(output, "\n{} Errors:\n", "⚠".yellow());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }

                output
            }
        }
    }

    /// Formats a refresh report.
    #[must_use]
    pub fn format_refresh(&self, report: &RefreshReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = format!(
                    "{} Refreshed {} interfaces and {} machine lookups.\n",
                    "✓".green(),
                    report.refreshed,
                    report.lookups
                );
                for resource in &report.changed {
                    let _ = writeln!(output, "   ~ {resource}");
                }
                for resource in &report.removed {
                    let _ = writeln!(output, "   {} {resource} (gone)", "-".red());
                }
                output
            }
        }
    }

    /// Formats an imported bridge.
    #[must_use]
    pub fn format_import(&self, key: &str, bridge: &BridgeState) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(bridge).unwrap_or_default(),
            OutputFormat::Text => format!(
                "{} Imported bridge.{key} (interface {} on {})\n",
                "✓".green(),
                bridge.id,
                bridge.machine
            ),
        }
    }

    /// Formats machine lookup results.
    #[must_use]
    pub fn format_machines(&self, machines: &[(String, MachineState)]) -> String {
        match self.format {
            OutputFormat::Json => {
                let redacted: Vec<serde_json::Value> = machines
                    .iter()
                    .map(|(key, m)| serde_json::json!({ "key": key, "machine": redact(m) }))
                    .collect();
                serde_json::to_string_pretty(&redacted).unwrap_or_default()
            }
            OutputFormat::Text => {
                if machines.is_empty() {
                    return String::from("No machine lookups defined.\n");
                }
                let rows: Vec<MachineRow> = machines
                    .iter()
                    .map(|(key, m)| MachineRow {
                        key: key.clone(),
                        id: m.id.clone(),
                        fqdn: m.fqdn.clone(),
                        power_type: m.power_type.clone(),
                        pxe_mac: m.pxe_mac_address.clone().unwrap_or_default(),
                        placement: format!(
                            "{}/{}",
                            m.zone.as_deref().unwrap_or("-"),
                            m.pool.as_deref().unwrap_or("-")
                        ),
                    })
                    .collect();
                format!("{}\n", Table::new(rows))
            }
        }
    }

    /// Formats the state document.
    #[must_use]
    pub fn format_state(&self, state: &StateDocument, location: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let mut redacted = state.clone();
                for machine in redacted.machines.values_mut() {
                    *machine = redact(machine);
                }
                serde_json::to_string_pretty(&redacted).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_state_text(state, location),
        }
    }

    fn format_state_text(state: &StateDocument, location: &str) -> String {
        let mut output = String::new();

        let _ = write!(output, "\nState: {location}\n\n");
        let _ = writeln!(output, "   Version: {}", state.version);
        let _ = writeln!(output, "   Last updated: {}", state.last_updated);
        let _ = writeln!(output, "   Bridges: {}", state.bridges.len());
        let _ = writeln!(output, "   VLANs: {}", state.vlans.len());
        let _ = writeln!(output, "   Machine lookups: {}", state.machines.len());

        let rows: Vec<InterfaceRow> = state
            .bridges
            .iter()
            .map(|(key, r)| InterfaceRow {
                resource: format!("bridge.{key}"),
                id: r.snapshot.id,
                machine: r.snapshot.machine.clone(),
                name: r.snapshot.name.clone().unwrap_or_default(),
                parent: r.snapshot.parent.clone().unwrap_or_default(),
                vlan: r.snapshot.vlan.clone().unwrap_or_default(),
                mtu: r.snapshot.mtu.map(|m| m.to_string()).unwrap_or_default(),
            })
            .chain(state.vlans.iter().map(|(key, r)| InterfaceRow {
                resource: format!("vlan.{key}"),
                id: r.snapshot.id,
                machine: r.snapshot.machine.clone(),
                name: r.snapshot.name.clone().unwrap_or_default(),
                parent: r.snapshot.parent.clone().unwrap_or_default(),
                vlan: r.snapshot.vlan.clone().unwrap_or_default(),
                mtu: r.snapshot.mtu.map(|m| m.to_string()).unwrap_or_default(),
            }))
            .collect();

        if !rows.is_empty() {
            output.push('\n');
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        if !state.history.is_empty() {
            let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
            for entry in state.history.iter().rev().take(5) {
                let status = if entry.success { "✓" } else { "✗" };
                let _ = writeln!(
                    output,
                    "     {status} {} - {} ({})",
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.operation,
                    entry.resources.join(", ")
                );
            }
        }

        output
    }

    fn format_action_type(action_type: ActionType) -> String {
        match action_type {
            ActionType::Create => "+create".green().to_string(),
            ActionType::Update => "~update".yellow().to_string(),
            ActionType::Delete => "-delete".red().to_string(),
        }
    }

    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len - 3).collect();
            format!("{head}...")
        }
    }
}

/// Replaces every power parameter value with a placeholder, keeping the keys.
fn redact(machine: &MachineState) -> MachineState {
    let masked = machine
        .power_parameters
        .expose()
        .keys()
        .map(|k| (k.clone(), serde_json::Value::from(REDACTED)))
        .collect();

    MachineState {
        power_parameters: Sensitive::new(masked),
        ..machine.clone()
    }
}
