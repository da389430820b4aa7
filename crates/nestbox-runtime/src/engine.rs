//! Runtime engine that drives one container invocation end to end.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use nestbox_common::config::NestboxConfig;
use nestbox_common::constants::SCRATCH_DIR_PREFIX;
use nestbox_common::error::{NestboxError, Result};
use nestbox_common::types::ImageReference;
use nestbox_core::filesystem::rootfs::ContainerRoot;
use nestbox_image::fetch::LayerFetcher;
use nestbox_image::registry::RegistryClient;
use tempfile::TempDir;

use crate::backend;
use crate::interrupt::InterruptGuard;
use crate::process::{IsolatedProcessLauncher, LaunchOutcome, LaunchSpec};

/// A single `run` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Image reference, `name` or `name:tag`.
    pub image: String,
    /// Command to run, as typed on the host.
    pub command: String,
    /// Arguments passed to the command.
    pub args: Vec<String>,
}

/// Coordinates the pull, root preparation, launch, and cleanup stages.
pub struct Engine {
    config: NestboxConfig,
    launcher: Box<dyn IsolatedProcessLauncher>,
    interrupts: Arc<InterruptGuard>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("isolation_available", &self.launcher.is_available())
            .finish_non_exhaustive()
    }
}

/// Directories owned by one run: the container root and the download area.
struct RunDirs {
    root: ContainerRoot,
    scratch: TempDir,
}

impl Engine {
    /// Creates an engine with the platform's launcher.
    #[must_use]
    pub fn new(config: NestboxConfig) -> Self {
        Self::with_launcher(config, backend::detect_launcher())
    }

    /// Creates an engine with a custom launcher.
    #[must_use]
    pub fn with_launcher(
        config: NestboxConfig,
        launcher: Box<dyn IsolatedProcessLauncher>,
    ) -> Self {
        Self {
            config,
            launcher,
            interrupts: Arc::new(InterruptGuard::new()),
        }
    }

    /// Shares `interrupts` with a signal handler installed by the caller.
    #[must_use]
    pub fn with_interrupts(mut self, interrupts: Arc<InterruptGuard>) -> Self {
        self.interrupts = interrupts;
        self
    }

    /// Pulls the image, runs the command inside it, and removes the root.
    ///
    /// The root and the download directory are removed before this
    /// returns, whether the run succeeded or failed at any stage. Every
    /// write into them happens under a hold on the interrupt guard.
    ///
    /// # Errors
    ///
    /// Returns the error of the first stage that failed. A removal failure
    /// after an otherwise successful run is logged at `warn` and the
    /// child's outcome is returned, so its exit status is preserved.
    pub fn run(&self, request: &RunRequest) -> Result<LaunchOutcome> {
        let reference = ImageReference::parse(&request.image)?;
        let command = resolve_command(&request.command)?;
        tracing::info!(
            image = %reference,
            command = %command.display(),
            args = request.args.len(),
            "starting container run"
        );

        let dirs = self.allocate()?;
        let result = self.provision(&reference, &command, &dirs).and_then(|()| {
            self.launcher.launch(&LaunchSpec {
                executable: command.clone(),
                arguments: request.args.clone(),
                root: &dirs.root,
                interrupts: &self.interrupts,
            })
        });

        match (result, self.release(dirs)) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(outcome), Err(e)) => {
                tracing::warn!(error = %e, "container root cleanup failed");
                Ok(outcome)
            }
            (Err(e), cleanup) => {
                if let Err(cleanup_err) = cleanup {
                    tracing::warn!(error = %cleanup_err, "container root cleanup failed");
                }
                Err(e)
            }
        }
    }

    /// Creates the root and download directories and registers both with
    /// the interrupt guard.
    fn allocate(&self) -> Result<RunDirs> {
        let mut hold = self.interrupts.hold()?;
        let root = ContainerRoot::create(&self.config.work_dir)?;
        hold.track(root.path());

        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_DIR_PREFIX)
            .tempdir_in(&self.config.work_dir)
            .map_err(|e| {
                NestboxError::setup_caused(
                    format!(
                        "cannot create download directory in {}",
                        self.config.work_dir.display()
                    ),
                    e,
                )
            });
        let scratch = match scratch {
            Ok(scratch) => scratch,
            Err(e) => {
                hold.untrack(root.path());
                return Err(e);
            }
        };
        hold.track(scratch.path());
        Ok(RunDirs { root, scratch })
    }

    /// Fills the root with the image layers and the command binary.
    ///
    /// The registry client is dropped before returning, so no connection
    /// pool outlives the pull.
    fn provision(
        &self,
        reference: &ImageReference,
        command: &Path,
        dirs: &RunDirs,
    ) -> Result<()> {
        let client = RegistryClient::new(self.config.registry.clone())?;
        let token = client.fetch_token(reference)?;
        let manifest = client.fetch_manifest(reference, &token)?;

        let layers = LayerFetcher::new(&client, dirs.scratch.path()).pull_all(
            reference,
            &token,
            &manifest,
            dirs.root.path(),
            || self.interrupts.hold(),
        )?;
        tracing::info!(layers = layers.len(), "image filesystem ready");

        let _hold = self.interrupts.hold()?;
        let _ = dirs.root.ensure_command_dir(command)?;
        let _ = dirs.root.install_binary(command, command)?;
        Ok(())
    }

    /// Removes both run directories while holding the interrupt guard.
    ///
    /// After an interrupt the guard refuses the hold; the handler has
    /// already removed everything, so removal here finds nothing.
    fn release(&self, dirs: RunDirs) -> Result<()> {
        let RunDirs { root, scratch } = dirs;
        let mut hold = self.interrupts.hold().ok();
        if let Some(hold) = hold.as_mut() {
            hold.untrack(root.path());
            hold.untrack(scratch.path());
        }

        let scratch_path = scratch.path().to_path_buf();
        let scratch_closed = match scratch.close() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(NestboxError::setup_caused(
                format!("cannot remove {}", scratch_path.display()),
                e,
            )),
        };
        let root_closed = root.close();
        drop(hold);
        root_closed.and(scratch_closed)
    }
}

/// Resolves `command` to an absolute host path.
///
/// A bare name is looked up on `PATH`. Anything containing `/` is taken as
/// a path, made absolute against the current directory, and normalized
/// lexically without following symlinks, so `argv[0]` keeps the name the
/// user typed.
///
/// # Errors
///
/// Returns `NestboxError::Setup` if the command is empty, cannot be found
/// on `PATH`, or the current directory is unavailable.
pub fn resolve_command(command: &str) -> Result<PathBuf> {
    if command.is_empty() {
        return Err(NestboxError::setup("command must not be empty"));
    }
    if !command.contains('/') {
        return which::which(command).map_err(|e| {
            NestboxError::setup_caused(format!("command {command:?} not found on PATH"), e)
        });
    }
    let absolute = std::path::absolute(command).map_err(|e| {
        NestboxError::setup_caused(format!("cannot resolve command path {command:?}"), e)
    })?;
    Ok(normalize(&absolute))
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::ParentDir => {
                let _ = out.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    out
}
