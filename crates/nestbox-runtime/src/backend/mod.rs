//! Platform launchers for the isolated container process.

#[cfg(target_os = "linux")]
pub mod linux;
pub mod unsupported;

use crate::process::IsolatedProcessLauncher;

/// Returns the launcher for the current platform.
#[must_use]
pub fn detect_launcher() -> Box<dyn IsolatedProcessLauncher> {
    #[cfg(target_os = "linux")]
    {
        tracing::debug!("using Linux namespace launcher");
        Box::new(linux::LinuxLauncher::new())
    }
    #[cfg(not(target_os = "linux"))]
    {
        tracing::debug!(os = std::env::consts::OS, "no isolation support on this platform");
        Box::new(unsupported::UnsupportedLauncher::new())
    }
}
