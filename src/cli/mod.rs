//! CLI module for the MAAS interface reconciler.
//!
//! This module provides the command-line interface for managing
//! bridge and VLAN interfaces.

mod commands;
mod output;

pub use commands::{Cli, Commands, ImportCommands, OutputFormat, StateCommands};
pub use output::OutputFormatter;
