//! Maps the container's terminal state to the parent's exit status.

use nestbox_common::error::Result;

use crate::process::LaunchOutcome;

/// Exit status for every pipeline failure and for a child that never started.
pub const FAILURE_EXIT_CODE: u8 = 1;

/// Exit status when `nbx` itself is interrupted before the child runs.
pub const INTERRUPTED_EXIT_CODE: u8 = 130;

const SIGNAL_EXIT_BASE: i32 = 128;

/// Exit status that mirrors `outcome`.
///
/// A normal exit passes its status through unchanged. A signal death maps
/// to `128 + signal`, as shells report it.
#[must_use]
pub fn exit_code(outcome: LaunchOutcome) -> u8 {
    match outcome {
        LaunchOutcome::ExitedNormally(code) => u8::try_from(code).unwrap_or(FAILURE_EXIT_CODE),
        LaunchOutcome::ExitedViaSignal(signal) => {
            u8::try_from(SIGNAL_EXIT_BASE.saturating_add(signal)).unwrap_or(u8::MAX)
        }
    }
}

/// Exit status for the result of a whole run.
#[must_use]
pub fn resolve(result: &Result<LaunchOutcome>) -> u8 {
    match result {
        Ok(outcome) => exit_code(*outcome),
        Err(e) => {
            tracing::debug!(kind = e.kind(), "run failed");
            FAILURE_EXIT_CODE
        }
    }
}
