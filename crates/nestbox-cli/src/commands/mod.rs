//! CLI command definitions and dispatch.

pub mod run;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

/// Nestbox — run a command inside a freshly pulled container image.
#[derive(Parser, Debug)]
#[command(name = "nbx", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pull an image and run a command inside it.
    Run(run::RunArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command could not be run to completion.
pub fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Run(args) => run::execute(args),
    }
}
