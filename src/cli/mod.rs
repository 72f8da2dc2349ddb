//! Command-line interface definitions for the `hoist` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{ArgAction, Parser, Subcommand};

/// Top-level CLI for the `hoist` binary.
#[derive(Debug, Parser)]
#[command(
    name = "hoist",
    about = "Provision a Scaleway instance, bootstrap it over SSH and start a service on it",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Increase log verbosity (-v for debug, -vv for trace). `RUST_LOG`
    /// takes precedence when set.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub(crate) verbose: u8,
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Subcommands accepted by `hoist`.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Create an instance, deploy the service and wait until it answers.
    #[command(
        name = "start",
        about = "Create an instance, deploy the service and wait until it answers"
    )]
    Start(StartCommand),
    /// Terminate an instance and wait until it is gone.
    #[command(name = "stop", about = "Terminate an instance and wait until it is gone")]
    Stop(StopCommand),
}

/// Arguments for the `hoist start` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct StartCommand {
    /// JSON provision document. A missing file falls back to the built-in
    /// defaults.
    #[arg(long, value_name = "PATH", default_value = "config.json")]
    pub(crate) config: String,
}

/// Arguments for the `hoist stop` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct StopCommand {
    /// Identifier printed by `hoist start`.
    #[arg(value_name = "INSTANCE_ID")]
    pub(crate) instance_id: String,
}
