//! Cleanup after `SIGINT` or `SIGTERM`.
//!
//! The signal handler and the run pipeline share one [`InterruptGuard`].
//! The pipeline registers every directory it creates and takes a [`Hold`]
//! while it writes into them. The handler waits for the hold, removes what
//! is registered, and lets the process exit. While the container process
//! runs, the handler kills it instead so the pipeline can finish its own
//! cleanup.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use nestbox_common::error::{NestboxError, Result};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

/// What the caller of [`InterruptGuard::interrupt`] should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// Registered directories are removed; exit now.
    Exit,
    /// The container process was killed; the run unwinds by itself.
    ChildKilled,
}

#[derive(Debug, Default)]
struct State {
    paths: Vec<PathBuf>,
    child: Option<Pid>,
    interrupted: bool,
}

/// State shared between the run pipeline and the interrupt handler.
#[derive(Debug, Default)]
pub struct InterruptGuard {
    state: Mutex<State>,
}

/// Exclusive access to an [`InterruptGuard`].
///
/// An interrupt arriving while a hold is alive waits until it is dropped.
#[derive(Debug)]
pub struct Hold<'a> {
    state: MutexGuard<'a, State>,
}

impl InterruptGuard {
    /// Creates a guard with nothing registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes exclusive access to the guard.
    ///
    /// # Errors
    ///
    /// Returns `NestboxError::Setup` once the run has been interrupted, so
    /// no stage starts writing into a directory that is already gone.
    pub fn hold(&self) -> Result<Hold<'_>> {
        let state = self.lock();
        if state.interrupted {
            return Err(NestboxError::setup("run interrupted"));
        }
        Ok(Hold { state })
    }

    /// Handles one interrupt, blocking while a [`Hold`] is alive.
    pub fn interrupt(&self) -> InterruptAction {
        let mut state = self.lock();
        if let Some(pid) = state.child {
            tracing::warn!(pid = pid.as_raw(), "interrupted, killing container process");
            if let Err(e) = kill(pid, Signal::SIGKILL) {
                tracing::warn!(pid = pid.as_raw(), error = %e, "cannot kill container process");
            }
            return InterruptAction::ChildKilled;
        }

        state.interrupted = true;
        for path in state.paths.drain(..) {
            match std::fs::remove_dir_all(&path) {
                Ok(()) => tracing::info!(path = %path.display(), "removed after interrupt"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "cannot remove after interrupt"
                ),
            }
        }
        InterruptAction::Exit
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Hold<'_> {
    /// Registers a directory to remove if the run is interrupted.
    pub fn track(&mut self, path: &Path) {
        self.state.paths.push(path.to_path_buf());
    }

    /// Forgets a directory registered with [`Self::track`].
    pub fn untrack(&mut self, path: &Path) {
        self.state.paths.retain(|p| p != path);
    }

    /// Records the running container process, or clears it with `None`.
    pub fn set_child(&mut self, pid: Option<Pid>) {
        self.state.child = pid;
    }
}
