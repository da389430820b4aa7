//! Image manifests.
//!
//! The legacy manifest lists layers under `fsLayers[].blobSum`; a schema-2
//! `layers[].digest` list is accepted when `fsLayers` is absent. A manifest
//! with neither, such as a multi-arch image index, yields no layers. Layer
//! order is extraction order and is never changed.

use nestbox_common::error::{NestboxError, Result};
use serde::Deserialize;

/// One filesystem layer referenced by a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerDescriptor {
    /// Content digest of the layer blob, e.g. `sha256:…`.
    pub digest: String,
}

/// Registry metadata describing an image's ordered filesystem layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Image name as reported by the registry.
    pub name: String,
    /// Image tag as reported by the registry.
    pub tag: String,
    /// Layers in extraction order. May be empty.
    pub layers: Vec<LayerDescriptor>,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    tag: String,
    #[serde(rename = "fsLayers", default)]
    fs_layers: Option<Vec<RawFsLayer>>,
    #[serde(default)]
    layers: Option<Vec<RawLayer>>,
}

#[derive(Debug, Deserialize)]
struct RawFsLayer {
    #[serde(rename = "blobSum")]
    blob_sum: String,
}

#[derive(Debug, Deserialize)]
struct RawLayer {
    digest: String,
}

impl Manifest {
    /// Decodes a manifest response body.
    ///
    /// # Errors
    ///
    /// Returns `NestboxError::Manifest` if the body is not a JSON object or
    /// a layer entry lacks its digest.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| NestboxError::manifest_caused("malformed manifest", e))?;
        if !value.is_object() {
            return Err(NestboxError::manifest("manifest is not a JSON object"));
        }
        let raw: RawManifest = serde_json::from_value(value)
            .map_err(|e| NestboxError::manifest_caused("malformed manifest", e))?;

        let layers = match (raw.fs_layers, raw.layers) {
            (Some(fs_layers), _) => fs_layers
                .into_iter()
                .map(|l| LayerDescriptor { digest: l.blob_sum })
                .collect(),
            (None, Some(layers)) => layers
                .into_iter()
                .map(|l| LayerDescriptor { digest: l.digest })
                .collect(),
            (None, None) => {
                tracing::warn!(
                    name = %raw.name,
                    tag = %raw.tag,
                    "manifest lists no layers, continuing with an empty image"
                );
                Vec::new()
            }
        };

        Ok(Self {
            name: raw.name,
            tag: raw.tag,
            layers,
        })
    }

    /// Digests of all layers, in extraction order.
    pub fn digests(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|l| l.digest.as_str())
    }
}
