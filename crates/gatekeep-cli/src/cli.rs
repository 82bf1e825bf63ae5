use clap::{Parser, Subcommand};

use crate::config::BackendChoice;

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "gatekeep",
    about = "Secure storage gated by user presence",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Backend to use for this invocation, overriding the config file.
    #[arg(long, global = true, value_enum)]
    pub backend: Option<BackendChoice>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Store a value, replacing any existing one.
    Save { account: String, value: String },
    /// Update a value; stores it fresh when the account is empty.
    Update { account: String, value: String },
    /// Print the stored value.
    Load { account: String },
    /// Remove the stored value (succeeds when nothing is stored).
    Delete { account: String },
    /// Round-trip a probe value through the configured backend.
    Health,
    /// Print version and exit.
    Version,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
