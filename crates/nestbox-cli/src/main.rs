//! # nbx — Nestbox CLI
//!
//! Pulls an image from the registry and runs one command inside it,
//! isolated by a changed root and a fresh PID namespace.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod commands;

use std::process::ExitCode;

use clap::Parser;
use nestbox_runtime::exit::FAILURE_EXIT_CODE;

use crate::commands::Cli;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match commands::execute(cli) {
        Ok(code) => code,
        Err(err) => {
            #[allow(clippy::print_stderr)]
            {
                eprintln!("error: {err:#}");
            }
            ExitCode::from(FAILURE_EXIT_CODE)
        }
    }
}
