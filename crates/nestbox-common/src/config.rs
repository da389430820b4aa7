//! Runtime configuration model.
//!
//! There are no configuration files: every value has a built-in default and
//! a handful can be overridden through `NESTBOX_*` environment variables.

use std::path::PathBuf;

use crate::constants;

/// Registry endpoints used by the pull pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Token endpoint URL.
    pub auth_url: String,
    /// Service name sent to the token endpoint.
    pub auth_service: String,
    /// Base URL for manifest requests.
    pub registry_url: String,
    /// Base URL for blob requests.
    pub blob_url: String,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            auth_url: constants::DEFAULT_AUTH_URL.into(),
            auth_service: constants::DEFAULT_AUTH_SERVICE.into(),
            registry_url: constants::DEFAULT_REGISTRY_URL.into(),
            blob_url: constants::DEFAULT_BLOB_URL.into(),
            user_agent: format!("{}/{}", constants::APP_NAME, env!("CARGO_PKG_VERSION")),
        }
    }
}

impl RegistryConfig {
    /// Points every endpoint at a single base URL.
    ///
    /// The token endpoint becomes `{base}/token`.
    #[must_use]
    pub fn single_host(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            auth_url: format!("{base}/token"),
            registry_url: base.to_string(),
            blob_url: base.to_string(),
            ..Self::default()
        }
    }
}

/// Root configuration for a Nestbox invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestboxConfig {
    /// Registry endpoints.
    pub registry: RegistryConfig,
    /// Directory under which container roots and scratch files are created.
    pub work_dir: PathBuf,
}

impl Default for NestboxConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            work_dir: std::env::temp_dir(),
        }
    }
}

impl NestboxConfig {
    /// Builds the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = get(constants::ENV_AUTH_URL) {
            config.registry.auth_url = url;
        }
        if let Some(url) = get(constants::ENV_REGISTRY_URL) {
            config.registry.registry_url = trim_base(&url);
        }
        if let Some(url) = get(constants::ENV_BLOB_URL) {
            config.registry.blob_url = trim_base(&url);
        }
        if let Some(dir) = get(constants::ENV_TMPDIR) {
            config.work_dir = PathBuf::from(dir);
        }
        config
    }
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
