//! PID namespace isolation.
//!
//! Provides the container with its own process ID space, where the
//! launched command is PID 1 and cannot see or signal host processes.

use nestbox_common::error::{NestboxError, Result};
use nix::unistd::Pid;

/// Stack size handed to the cloned child.
pub const CHILD_STACK_SIZE: usize = 1024 * 1024;

/// Clones a child process into a new PID namespace and runs `child` in it.
///
/// Only the child is placed in the new namespace; the caller's own
/// namespace membership is left untouched, so this can be called any
/// number of times from one process. The child receives a copy of the
/// caller's memory and file descriptor table, and exits with the value
/// `child` returns. `SIGCHLD` is delivered to the caller on exit, so the
/// child is reaped with an ordinary `waitpid(2)`.
///
/// # Safety
///
/// `child` runs in a copy of a possibly multi-threaded process and must
/// only perform async-signal-safe operations (no allocation, no locking).
///
/// # Errors
///
/// Returns `NestboxError::Launch` if `clone(2)` fails, typically with
/// `EPERM` when the caller lacks `CAP_SYS_ADMIN`.
#[cfg(target_os = "linux")]
pub unsafe fn clone_into_new_pid_namespace(child: impl FnMut() -> isize) -> Result<Pid> {
    use nix::sched::{CloneFlags, clone};
    use nix::sys::signal::Signal;

    let mut stack = vec![0_u8; CHILD_STACK_SIZE];
    // SAFETY: the caller guarantees `child` is async-signal-safe; the child
    // runs on its own copy of `stack`, which outlives the call in the parent.
    let pid = unsafe {
        clone(
            Box::new(child),
            &mut stack,
            CloneFlags::CLONE_NEWPID,
            Some(Signal::SIGCHLD as i32),
        )
    }
    .map_err(|e| NestboxError::launch_caused("PID namespace creation failed", e))?;
    tracing::debug!(pid = pid.as_raw(), "child cloned into new PID namespace");
    Ok(pid)
}

/// Stub for non-Linux platforms.
///
/// # Safety
///
/// Never runs `child`; trivially safe.
///
/// # Errors
///
/// Always returns an error; PID namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub unsafe fn clone_into_new_pid_namespace(_child: impl FnMut() -> isize) -> Result<Pid> {
    Err(NestboxError::launch(
        "Linux required for PID namespace isolation",
    ))
}
