//! Launcher for platforms without `chroot(2)` plus PID namespaces.

use nestbox_common::error::{NestboxError, Result};

use crate::process::{IsolatedProcessLauncher, LaunchOutcome, LaunchSpec};

/// Launcher that refuses every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedLauncher;

impl UnsupportedLauncher {
    /// Creates the launcher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl IsolatedProcessLauncher for UnsupportedLauncher {
    fn launch(&self, spec: &LaunchSpec<'_>) -> Result<LaunchOutcome> {
        Err(NestboxError::launch(format!(
            "cannot run {}: process isolation requires Linux (running on {})",
            spec.executable.display(),
            std::env::consts::OS
        )))
    }

    fn is_available(&self) -> bool {
        false
    }
}
