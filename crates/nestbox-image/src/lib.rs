//! # nestbox-image
//!
//! Image resolution and layer management for the Nestbox runtime.
//!
//! Handles:
//! - **Auth**: Anonymous bearer tokens scoped to a single repository pull.
//! - **Manifests**: Decoding the ordered layer list of an image.
//! - **Registry**: Blocking HTTP client for the token, manifest, and blob endpoints.
//! - **Layers**: Archive format detection and extraction into a root directory.
//! - **Fetch**: Downloading every layer of a manifest, in order, via scratch files.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod auth;
pub mod fetch;
pub mod layer;
pub mod manifest;
pub mod registry;
