//! The private root filesystem of one container invocation.
//!
//! A [`ContainerRoot`] is created before any layer is extracted, owned by
//! the invocation, and removed exactly once, through [`ContainerRoot::close`]
//! or, failing that, on drop.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs::{self, Permissions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use nestbox_common::constants::ROOT_DIR_PREFIX;
use nestbox_common::error::{NestboxError, Result};
use tempfile::TempDir;

const ROOT_MODE: u32 = 0o755;

/// Symlinks followed while resolving one path before giving up, as `ELOOP`.
const MAX_SYMLINK_HOPS: usize = 40;

/// Uniquely owned directory that becomes the child's `/`.
#[derive(Debug)]
pub struct ContainerRoot {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl ContainerRoot {
    /// Creates a fresh, uniquely named root under `parent`.
    ///
    /// `parent` is created if missing.
    ///
    /// # Errors
    ///
    /// Returns `NestboxError::Setup` if the directory cannot be created.
    pub fn create(parent: &Path) -> Result<Self> {
        fs::create_dir_all(parent).map_err(|e| {
            NestboxError::setup_caused(format!("cannot create {}", parent.display()), e)
        })?;
        let dir = tempfile::Builder::new()
            .prefix(ROOT_DIR_PREFIX)
            .tempdir_in(parent)
            .map_err(|e| {
                NestboxError::setup_caused(
                    format!("cannot create container root in {}", parent.display()),
                    e,
                )
            })?;
        let path = dir.path().to_path_buf();
        fs::set_permissions(&path, Permissions::from_mode(ROOT_MODE)).map_err(|e| {
            NestboxError::setup_caused(format!("cannot set mode on {}", path.display()), e)
        })?;
        tracing::info!(root = %path.display(), "container root created");
        Ok(Self {
            path,
            dir: Some(dir),
        })
    }

    /// Host path of the root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Maps a path as seen inside the container to its host location.
    ///
    /// Symlinks met along the way are followed the way the kernel follows
    /// them once the root is in place: absolute targets restart at the root
    /// and `..` never climbs above it. Components that do not exist yet are
    /// kept as written.
    ///
    /// # Errors
    ///
    /// Returns `NestboxError::Setup` on a symlink loop or an entry that
    /// cannot be inspected.
    pub fn resolve(&self, container_path: &Path) -> Result<PathBuf> {
        let mut pending: VecDeque<Step> = steps(container_path).into();
        let mut resolved: Vec<OsString> = Vec::new();
        let mut hops = 0;

        while let Some(step) = pending.pop_front() {
            let name = match step {
                Step::Up => {
                    let _ = resolved.pop();
                    continue;
                }
                Step::Name(name) => name,
            };
            let candidate = self.join(&resolved).join(&name);
            match candidate.symlink_metadata() {
                Ok(meta) if meta.file_type().is_symlink() => {
                    hops += 1;
                    if hops > MAX_SYMLINK_HOPS {
                        return Err(NestboxError::setup(format!(
                            "too many levels of symbolic links in {}",
                            container_path.display()
                        )));
                    }
                    let target = fs::read_link(&candidate).map_err(|e| {
                        NestboxError::setup_caused(
                            format!("cannot read link {}", candidate.display()),
                            e,
                        )
                    })?;
                    if target.has_root() {
                        resolved.clear();
                    }
                    for step in steps(&target).into_iter().rev() {
                        pending.push_front(step);
                    }
                }
                Ok(_) => resolved.push(name),
                Err(e) if e.kind() == io::ErrorKind::NotFound => resolved.push(name),
                Err(e) => {
                    return Err(NestboxError::setup_caused(
                        format!("cannot inspect {}", candidate.display()),
                        e,
                    ));
                }
            }
        }
        Ok(self.join(&resolved))
    }

    /// Ensures the directory that will hold `command` exists inside the root.
    ///
    /// # Errors
    ///
    /// Returns `NestboxError::Setup` if the directory cannot be resolved or
    /// created.
    pub fn ensure_command_dir(&self, command: &Path) -> Result<PathBuf> {
        let dir = self.resolve(command.parent().unwrap_or_else(|| Path::new("/")))?;
        fs::create_dir_all(&dir).map_err(|e| {
            NestboxError::setup_caused(format!("cannot create {}", dir.display()), e)
        })?;
        tracing::debug!(dir = %dir.display(), "command directory ready");
        Ok(dir)
    }

    /// Copies the host executable `source` to `command` inside the root.
    ///
    /// Parent directories are resolved with [`ContainerRoot::resolve`]. An
    /// existing entry at the destination is unlinked first, so a symlink
    /// shipped by the image is replaced rather than followed.
    ///
    /// # Errors
    ///
    /// Returns `NestboxError::Setup` if `command` does not name a file or
    /// names a directory, or if the copy fails (missing source, permission
    /// denied).
    pub fn install_binary(&self, source: &Path, command: &Path) -> Result<PathBuf> {
        let Some(file_name) = command.file_name() else {
            return Err(NestboxError::setup(format!(
                "command path {} does not name a file",
                command.display()
            )));
        };
        let dest = self
            .resolve(command.parent().unwrap_or_else(|| Path::new("/")))?
            .join(file_name);

        if let Ok(meta) = dest.symlink_metadata() {
            if meta.is_dir() {
                return Err(NestboxError::setup(format!(
                    "{} is a directory inside the image",
                    command.display()
                )));
            }
            fs::remove_file(&dest).map_err(|e| {
                NestboxError::setup_caused(format!("cannot replace {}", dest.display()), e)
            })?;
        }

        let bytes = fs::copy(source, &dest).map_err(|e| {
            NestboxError::setup_caused(
                format!("cannot copy {} into container root", source.display()),
                e,
            )
        })?;
        tracing::info!(
            source = %source.display(),
            dest = %dest.display(),
            bytes,
            "command binary installed"
        );
        Ok(dest)
    }

    /// Removes the root and everything beneath it.
    ///
    /// A root that is already gone counts as removed.
    ///
    /// # Errors
    ///
    /// Returns `NestboxError::Setup` if removal fails.
    pub fn close(mut self) -> Result<()> {
        self.remove()
    }

    fn join(&self, parts: &[OsString]) -> PathBuf {
        parts.iter().fold(self.path.clone(), |acc, part| acc.join(part))
    }

    fn remove(&mut self) -> Result<()> {
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };
        match dir.close() {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(root = %self.path.display(), "container root already removed");
            }
            Err(e) => {
                return Err(NestboxError::setup_caused(
                    format!("cannot remove {}", self.path.display()),
                    e,
                ));
            }
        }
        tracing::debug!(root = %self.path.display(), "container root removed");
        Ok(())
    }
}

impl Drop for ContainerRoot {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            tracing::warn!(error = %e, "container root cleanup failed");
        }
    }
}

enum Step {
    Up,
    Name(OsString),
}

fn steps(path: &Path) -> Vec<Step> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(Step::Name(part.to_os_string())),
            Component::ParentDir => Some(Step::Up),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => None,
        })
        .collect()
}
