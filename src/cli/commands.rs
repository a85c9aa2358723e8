//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::ResourceKind;

/// maas-netif - Declarative MAAS bridge and VLAN interface manager.
#[derive(Parser, Debug)]
#[command(name = "maas-netif")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the manifest file.
    #[arg(short, long, global = true, env = "MAAS_NETIF_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the manifest without contacting MAAS.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Show the changes apply would make.
    Plan,

    /// Create, update and delete interfaces to match the manifest.
    Apply {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Keep going after a failed action.
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Re-read tracked interfaces from MAAS and update state.
    Refresh,

    /// Check for drift between the manifest, state and MAAS.
    Drift,

    /// Adopt an existing interface into state.
    Import {
        /// Import subcommand.
        #[command(subcommand)]
        command: ImportCommands,
    },

    /// Evaluate machine lookups and record them in state.
    Lookup,

    /// Inspect and edit local state.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// Import subcommands.
#[derive(Subcommand, Debug)]
pub enum ImportCommands {
    /// Import a bridge interface.
    Bridge {
        /// Resource key to track the bridge under.
        key: String,

        /// Composite identifier `MACHINE:BRIDGE_ID`.
        id: String,
    },
}

/// State management subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show current state.
    Show,

    /// Stop tracking a resource without touching MAAS.
    Rm {
        /// Resource kind (bridge, vlan).
        kind: ResourceKind,

        /// Resource key.
        key: String,
    },

    /// Remove the state lock left behind by an interrupted run.
    Unlock,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_import_and_state_rm() {
        let cli = Cli::try_parse_from(["maas-netif", "import", "bridge", "mgmt", "mq4s3r:7"])
            .expect("parse import");
        assert!(matches!(
            cli.command,
            Commands::Import {
                command: ImportCommands::Bridge { ref key, ref id }
            } if key == "mgmt" && id == "mq4s3r:7"
        ));

        let cli = Cli::try_parse_from(["maas-netif", "--output", "json", "state", "rm", "vlan", "bond0-3342"])
            .expect("parse state rm");
        assert!(matches!(cli.output, OutputFormat::Json));
        assert!(matches!(
            cli.command,
            Commands::State {
                command: StateCommands::Rm { kind: ResourceKind::Vlan, .. }
            }
        ));
    }

    #[test]
    fn test_rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["maas-netif", "state", "rm", "bond", "x"]).is_err());
    }
}
