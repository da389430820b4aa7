//! Filesystem root switching via `chroot(2)`.
//!
//! The target path is converted to a C string up front so that
//! [`RootSwitch::enter`] neither allocates nor locks, and can run in a
//! freshly cloned child before `execve(2)`.

use std::ffi::{CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use nestbox_common::error::{NestboxError, Result};
use nix::errno::Errno;

/// A prepared switch into a new filesystem root.
#[derive(Debug, Clone)]
pub struct RootSwitch {
    root: CString,
}

impl RootSwitch {
    /// Prepares a switch into `root`.
    ///
    /// # Errors
    ///
    /// Returns `NestboxError::Launch` if the path contains a NUL byte.
    pub fn new(root: &Path) -> Result<Self> {
        let root = CString::new(root.as_os_str().as_bytes()).map_err(|e| {
            NestboxError::launch_caused(format!("invalid chroot target {}", root.display()), e)
        })?;
        Ok(Self { root })
    }

    /// Host path of the new root.
    #[must_use]
    pub fn root(&self) -> &CStr {
        &self.root
    }

    /// Changes the calling process's root to the prepared directory and
    /// moves its working directory to the new `/`.
    ///
    /// # Errors
    ///
    /// Returns the `errno` of the failing `chroot(2)` or `chdir(2)` call.
    pub fn enter(&self) -> std::result::Result<(), Errno> {
        nix::unistd::chroot(self.root.as_c_str())?;
        nix::unistd::chdir(c"/")?;
        Ok(())
    }
}
