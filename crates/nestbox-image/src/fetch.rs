//! Sequential layer download and extraction.
//!
//! Each blob is streamed to a scratch file, extracted into the destination
//! root, and the scratch file removed before the next layer starts.

use std::path::{Path, PathBuf};

use nestbox_common::constants::SCRATCH_FILE_PREFIX;
use nestbox_common::error::{NestboxError, Result};
use nestbox_common::types::ImageReference;

use crate::auth::AuthToken;
use crate::layer::{self, ArchiveFormat};
use crate::manifest::{LayerDescriptor, Manifest};
use crate::registry::RegistryClient;

/// A layer that has been downloaded and applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulledLayer {
    /// Digest of the layer blob.
    pub digest: String,
    /// Detected archive format.
    pub format: ArchiveFormat,
    /// Downloaded size in bytes.
    pub size_bytes: u64,
}

/// Downloads layers through a [`RegistryClient`] and applies them to a root.
#[derive(Debug)]
pub struct LayerFetcher<'a> {
    client: &'a RegistryClient,
    scratch_dir: PathBuf,
}

impl<'a> LayerFetcher<'a> {
    /// Creates a fetcher that keeps scratch files under `scratch_dir`.
    #[must_use]
    pub fn new(client: &'a RegistryClient, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Downloads one layer and extracts it into `destination`.
    ///
    /// The value returned by `gate` is held while the archive is unpacked
    /// and dropped before the scratch file is removed.
    ///
    /// # Errors
    ///
    /// Returns `NestboxError::LayerFetch` if the blob cannot be downloaded or
    /// the scratch file cannot be written or removed, and
    /// `NestboxError::LayerExtract` if the archive cannot be unpacked. An
    /// error from `gate` is returned as is.
    pub fn fetch_layer<G>(
        &self,
        reference: &ImageReference,
        token: &AuthToken,
        layer: &LayerDescriptor,
        destination: &Path,
        gate: impl FnOnce() -> Result<G>,
    ) -> Result<PulledLayer> {
        let mut scratch = tempfile::Builder::new()
            .prefix(SCRATCH_FILE_PREFIX)
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| {
                NestboxError::layer_fetch_caused(
                    format!("cannot create scratch file in {}", self.scratch_dir.display()),
                    e,
                )
            })?;

        let size_bytes = self
            .client
            .download_blob(reference, token, &layer.digest, scratch.as_file_mut())?;
        tracing::info!(digest = %layer.digest, size = size_bytes, "layer downloaded");

        let extracted = gate().and_then(|held| {
            let extracted = layer::extract_layer(scratch.path(), destination);
            drop(held);
            extracted
        });
        let removed = scratch.close();
        let extracted = extracted?;
        removed.map_err(|e| NestboxError::layer_fetch_caused("cannot remove scratch file", e))?;

        Ok(PulledLayer {
            digest: layer.digest.clone(),
            format: extracted.format,
            size_bytes,
        })
    }

    /// Applies every layer of `manifest` to `destination`, in manifest order.
    ///
    /// `gate` is called once per layer, after its download, and its value is
    /// held while that layer is unpacked. Stops at the first failure; later
    /// layers are never requested.
    ///
    /// # Errors
    ///
    /// Propagates the first `LayerFetch`, `LayerExtract` or gate error.
    pub fn pull_all<G>(
        &self,
        reference: &ImageReference,
        token: &AuthToken,
        manifest: &Manifest,
        destination: &Path,
        mut gate: impl FnMut() -> Result<G>,
    ) -> Result<Vec<PulledLayer>> {
        let total = manifest.layers.len();
        let mut pulled = Vec::with_capacity(total);
        for (index, layer) in manifest.layers.iter().enumerate() {
            tracing::info!(
                layer = index + 1,
                total,
                digest = %layer.digest,
                "pulling layer"
            );
            pulled.push(self.fetch_layer(reference, token, layer, destination, &mut gate)?);
        }
        Ok(pulled)
    }
}
