//! Blocking HTTP client for the registry token, manifest, and blob endpoints.
//!
//! Every request is a single attempt: no retries, no timeouts. A hung
//! connection hangs the invocation.

use std::io::Write;

use nestbox_common::config::RegistryConfig;
use nestbox_common::constants::MANIFEST_LIST_V1_MEDIA_TYPE;
use nestbox_common::error::{NestboxError, Result};
use nestbox_common::types::ImageReference;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION};

use crate::auth::AuthToken;
use crate::manifest::Manifest;

/// Client bound to one set of registry endpoints.
#[derive(Debug)]
pub struct RegistryClient {
    http: Client,
    config: RegistryConfig,
}

impl RegistryClient {
    /// Creates a client for the given endpoints.
    ///
    /// # Errors
    ///
    /// Returns `NestboxError::Setup` if the HTTP client cannot be built
    /// (e.g. the TLS backend fails to initialize).
    pub fn new(config: RegistryConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(None)
            .build()
            .map_err(|e| NestboxError::setup_caused("failed to build HTTP client", e))?;
        Ok(Self { http, config })
    }

    /// Requests an anonymous pull token for the referenced repository.
    ///
    /// # Errors
    ///
    /// Returns `NestboxError::Auth` on network failure, a non-2xx status,
    /// or a malformed body.
    pub fn fetch_token(&self, reference: &ImageReference) -> Result<AuthToken> {
        let url = self.config.auth_url.as_str();
        let scope = reference.pull_scope();
        tracing::info!(url, scope = %scope, "requesting registry token");

        let response = self
            .http
            .get(url)
            .query(&[
                ("service", self.config.auth_service.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .map_err(|e| NestboxError::auth_caused(format!("token request to {url} failed"), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NestboxError::auth(format!(
                "token endpoint {url} returned HTTP {status}"
            )));
        }

        let body = response
            .bytes()
            .map_err(|e| NestboxError::auth_caused("failed to read token response", e))?;
        let token = AuthToken::from_json(&body)?;
        tracing::debug!(expires_in = token.expires_in_seconds(), "registry token issued");
        Ok(token)
    }

    /// Fetches the manifest for the referenced image and tag.
    ///
    /// # Errors
    ///
    /// Returns `NestboxError::Manifest` on network failure, a non-2xx status
    /// (including 404 for an unknown tag), or a malformed body.
    pub fn fetch_manifest(
        &self,
        reference: &ImageReference,
        token: &AuthToken,
    ) -> Result<Manifest> {
        let url = format!(
            "{}/v2/{}/{}/manifests/{}",
            self.config.registry_url,
            reference.repository(),
            reference.name(),
            reference.tag()
        );
        tracing::info!(url = %url, "fetching manifest");

        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, token.bearer())
            .header(ACCEPT, MANIFEST_LIST_V1_MEDIA_TYPE)
            .send()
            .map_err(|e| {
                NestboxError::manifest_caused(format!("manifest request to {url} failed"), e)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NestboxError::manifest(format!(
                "manifest for {reference} returned HTTP {status}"
            )));
        }

        let body = response
            .bytes()
            .map_err(|e| NestboxError::manifest_caused("failed to read manifest response", e))?;
        let manifest = Manifest::from_json(&body)?;
        tracing::info!(layers = manifest.layers.len(), "manifest resolved");
        Ok(manifest)
    }

    /// Streams the blob for `digest` into `sink`, returning the byte count.
    ///
    /// # Errors
    ///
    /// Returns `NestboxError::LayerFetch` on network failure, a non-2xx
    /// status, or a failed write to `sink`.
    pub fn download_blob(
        &self,
        reference: &ImageReference,
        token: &AuthToken,
        digest: &str,
        sink: &mut impl Write,
    ) -> Result<u64> {
        let url = format!(
            "{}/v2/{}/{}/blobs/{}",
            self.config.blob_url,
            reference.repository(),
            reference.name(),
            digest
        );
        tracing::debug!(url = %url, "downloading blob");

        let mut response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, token.bearer())
            .send()
            .map_err(|e| {
                NestboxError::layer_fetch_caused(format!("blob request for {digest} failed"), e)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NestboxError::layer_fetch(format!(
                "blob {digest} returned HTTP {status}"
            )));
        }

        response.copy_to(sink).map_err(|e| {
            NestboxError::layer_fetch_caused(format!("failed to download blob {digest}"), e)
        })
    }
}
