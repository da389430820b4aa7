//! Isolated process launch contract.
//!
//! A launch moves through `NotStarted → Running` and ends in exactly one
//! terminal state. The two states a child can reach after it has started
//! are represented by [`LaunchOutcome`]; a child that never started
//! surfaces as `NestboxError::Launch`.

use std::path::PathBuf;

use nestbox_common::error::Result;
use nestbox_core::filesystem::rootfs::ContainerRoot;

use crate::interrupt::InterruptGuard;

/// Everything needed to start the container process.
///
/// Built only once the root filesystem is fully populated.
#[derive(Debug)]
pub struct LaunchSpec<'a> {
    /// Path of the executable as seen inside the container.
    pub executable: PathBuf,
    /// Arguments passed after the executable.
    pub arguments: Vec<String>,
    /// Directory that becomes the child's `/`.
    pub root: &'a ContainerRoot,
    /// Where the running child is registered so an interrupt can kill it.
    pub interrupts: &'a InterruptGuard,
}

/// Terminal state of a child that started successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The child called `exit` with this status.
    ExitedNormally(i32),
    /// The child was killed by this signal number.
    ExitedViaSignal(i32),
}

impl LaunchOutcome {
    /// Whether the child exited normally with status `0`.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::ExitedNormally(0))
    }
}

/// Starts a command inside an isolated root and waits for it to finish.
///
/// Implementations exist per platform; the pipeline only sees this trait.
pub trait IsolatedProcessLauncher: Send + Sync {
    /// Runs `spec` to completion with inherited standard streams.
    ///
    /// # Errors
    ///
    /// Returns `NestboxError::Launch` if the operating system refuses to
    /// create the process or the executable cannot be started.
    fn launch(&self, spec: &LaunchSpec<'_>) -> Result<LaunchOutcome>;

    /// Returns whether this launcher can isolate processes on this platform.
    fn is_available(&self) -> bool;
}
