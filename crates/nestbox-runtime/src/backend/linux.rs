//! Linux launcher: `clone(2)` into a new PID namespace, `chroot(2)`, then
//! `execv(2)`.
//!
//! Everything the child touches is prepared in the parent beforehand. After
//! the clone the child only calls `chroot`, `chdir`, `execv` and `write`, so
//! it never allocates or takes a lock inherited from another thread.
//!
//! A close-on-exec pipe tells the parent whether the child got as far as
//! `execv`. A successful exec closes the write end without a byte written; a
//! failure writes the stage and `errno` before the child exits.

use std::ffi::{CString, c_char};
use std::fs::File;
use std::io::Read;
use std::os::fd::OwnedFd;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use nestbox_common::error::{NestboxError, Result};
use nestbox_core::filesystem::chroot::RootSwitch;
use nestbox_core::namespace::pid::clone_into_new_pid_namespace;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::Pid;

use crate::process::{IsolatedProcessLauncher, LaunchOutcome, LaunchSpec};

/// Exit status of a child that failed before `execv` replaced it.
const EXEC_FAILURE_STATUS: isize = 127;

const REPORT_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
enum Stage {
    Chroot = 1,
    Exec = 2,
}

impl Stage {
    const fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(Self::Chroot),
            2 => Some(Self::Exec),
            _ => None,
        }
    }

    const fn describe(self) -> &'static str {
        match self {
            Self::Chroot => "entering container root",
            Self::Exec => "executing command",
        }
    }
}

fn encode_report(stage: Stage, errno: Errno) -> [u8; REPORT_LEN] {
    let mut buf = [0_u8; REPORT_LEN];
    buf[..4].copy_from_slice(&(stage as i32).to_ne_bytes());
    buf[4..].copy_from_slice(&(errno as i32).to_ne_bytes());
    buf
}

fn decode_report(bytes: &[u8]) -> Option<(Stage, Errno)> {
    let stage = i32::from_ne_bytes(bytes.get(..4)?.try_into().ok()?);
    let errno = i32::from_ne_bytes(bytes.get(4..REPORT_LEN)?.try_into().ok()?);
    Some((Stage::from_raw(stage)?, Errno::from_raw(errno)))
}

/// Program path and argument vector in the layout `execv(2)` expects.
struct ExecImage {
    program: CString,
    // Owns the strings `argv_ptrs` points into.
    _argv: Vec<CString>,
    argv_ptrs: Vec<*const c_char>,
}

impl ExecImage {
    fn new(executable: &Path, arguments: &[String]) -> Result<Self> {
        let program = CString::new(executable.as_os_str().as_bytes()).map_err(|e| {
            NestboxError::launch_caused(format!("invalid command path {}", executable.display()), e)
        })?;
        let mut argv = Vec::with_capacity(arguments.len() + 1);
        argv.push(program.clone());
        for arg in arguments {
            argv.push(CString::new(arg.as_bytes()).map_err(|e| {
                NestboxError::launch_caused(format!("argument {arg:?} contains a NUL byte"), e)
            })?);
        }
        let argv_ptrs = argv
            .iter()
            .map(|a| a.as_ptr())
            .chain(std::iter::once(std::ptr::null()))
            .collect();
        Ok(Self {
            program,
            _argv: argv,
            argv_ptrs,
        })
    }

    /// Replaces the calling process image. Returns only on failure.
    fn exec(&self) -> Errno {
        // SAFETY: `program` and every non-null entry of `argv_ptrs` point into
        // NUL-terminated buffers owned by `self`, and `argv_ptrs` ends with a
        // null pointer.
        let _ = unsafe { libc::execv(self.program.as_ptr(), self.argv_ptrs.as_ptr()) };
        Errno::last()
    }
}

/// Launcher backed by Linux namespaces.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxLauncher;

impl LinuxLauncher {
    /// Creates the launcher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl IsolatedProcessLauncher for LinuxLauncher {
    fn launch(&self, spec: &LaunchSpec<'_>) -> Result<LaunchOutcome> {
        let image = ExecImage::new(&spec.executable, &spec.arguments)?;
        let switch = RootSwitch::new(spec.root.path())?;
        let (report_rx, report_tx) = nix::unistd::pipe2(OFlag::O_CLOEXEC)
            .map_err(|e| NestboxError::launch_caused("cannot create status pipe", e))?;

        let child = || -> isize {
            let (stage, errno) = match switch.enter() {
                Err(errno) => (Stage::Chroot, errno),
                Ok(()) => (Stage::Exec, image.exec()),
            };
            let _ = nix::unistd::write(&report_tx, &encode_report(stage, errno));
            EXEC_FAILURE_STATUS
        };

        tracing::debug!(
            root = %spec.root.path().display(),
            command = %spec.executable.display(),
            "launching container process"
        );
        let pid = {
            let mut hold = spec.interrupts.hold()?;
            // SAFETY: the closure only calls chroot, chdir, execv and write on
            // buffers prepared above; none of these allocate or lock.
            let pid = unsafe { clone_into_new_pid_namespace(child) }?;
            hold.set_child(Some(pid));
            pid
        };
        tracing::info!(pid = pid.as_raw(), "container process running");

        drop(report_tx);
        let report = read_report(report_rx);
        let status = wait_for(pid);
        if let Ok(mut hold) = spec.interrupts.hold() {
            hold.set_child(None);
        }
        let status = status?;

        match report? {
            Some((stage, errno)) => Err(NestboxError::launch_caused(
                format!(
                    "{} failed for {}",
                    stage.describe(),
                    spec.executable.display()
                ),
                errno,
            )),
            None => {
                tracing::info!(pid = pid.as_raw(), ?status, "container process exited");
                Ok(status)
            }
        }
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Reads the child's failure report. `None` means `execv` succeeded.
fn read_report(rx: OwnedFd) -> Result<Option<(Stage, Errno)>> {
    let mut bytes = Vec::with_capacity(REPORT_LEN);
    let _ = File::from(rx)
        .read_to_end(&mut bytes)
        .map_err(|e| NestboxError::launch_caused("cannot read status pipe", e))?;
    if bytes.is_empty() {
        return Ok(None);
    }
    decode_report(&bytes)
        .map(Some)
        .ok_or_else(|| NestboxError::launch("malformed report from container process"))
}

fn wait_for(pid: Pid) -> Result<LaunchOutcome> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(LaunchOutcome::ExitedNormally(code)),
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                return Ok(LaunchOutcome::ExitedViaSignal(signal as i32));
            }
            Ok(_) | Err(Errno::EINTR) => {}
            Err(e) => {
                return Err(NestboxError::launch_caused(
                    format!("waiting for process {pid} failed"),
                    e,
                ));
            }
        }
    }
}
