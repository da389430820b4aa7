//! `nbx run` — Pull an image and run a command inside it.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use nestbox_common::config::NestboxConfig;
use nestbox_runtime::engine::{Engine, RunRequest};
use nestbox_runtime::exit;
use nestbox_runtime::interrupt::{InterruptAction, InterruptGuard};

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Image to pull, as `name` or `name:tag` (tag defaults to `latest`).
    pub image: String,

    /// Command to run inside the container, resolved on the host.
    pub command: String,

    /// Arguments passed to the command.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 0..)]
    pub args: Vec<String>,
}

impl From<RunArgs> for RunRequest {
    fn from(args: RunArgs) -> Self {
        Self {
            image: args.image,
            command: args.command,
            args: args.args,
        }
    }
}

/// Executes the `run` command.
///
/// The returned exit code mirrors the container process. `SIGINT` or
/// `SIGTERM` before the container starts removes the run's directories and
/// exits with status 130; while it runs, the container process is killed
/// and the run finishes normally.
///
/// # Errors
///
/// Returns an error if the signal handler cannot be installed or any stage
/// before or during launch fails. The container root has already been
/// removed when this returns.
pub fn execute(args: RunArgs) -> anyhow::Result<ExitCode> {
    let config = NestboxConfig::from_env();
    tracing::debug!(work_dir = %config.work_dir.display(), "configuration loaded");

    let interrupts = install_interrupt_handler()?;
    let request = RunRequest::from(args);
    let engine = Engine::new(config).with_interrupts(interrupts);
    let outcome = engine
        .run(&request)
        .with_context(|| format!("cannot run {} in {}", request.command, request.image))?;

    tracing::debug!(?outcome, "container finished");
    Ok(ExitCode::from(exit::exit_code(outcome)))
}

fn install_interrupt_handler() -> anyhow::Result<Arc<InterruptGuard>> {
    let interrupts = Arc::new(InterruptGuard::new());
    let guard = Arc::clone(&interrupts);
    ctrlc::set_handler(move || {
        if guard.interrupt() == InterruptAction::Exit {
            std::process::exit(i32::from(exit::INTERRUPTED_EXIT_CODE));
        }
    })
    .context("failed to set interrupt handler")?;
    Ok(interrupts)
}
