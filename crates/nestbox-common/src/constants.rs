//! System-wide constants and default endpoints.

/// Default registry token endpoint.
pub const DEFAULT_AUTH_URL: &str = "https://auth.docker.io/token";

/// Service name requested from the token endpoint.
pub const DEFAULT_AUTH_SERVICE: &str = "registry.docker.io";

/// Default base URL for manifest requests.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.hub.docker.com";

/// Default base URL for blob requests.
pub const DEFAULT_BLOB_URL: &str = "https://registry-1.docker.io";

/// Repository every image is resolved under.
pub const DEFAULT_REPOSITORY: &str = "library";

/// Tag used when the image string carries no `:tag` suffix.
pub const DEFAULT_TAG: &str = "latest";

/// Media type requested from the manifest endpoint.
pub const MANIFEST_LIST_V1_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.list.v1+json";

/// Token lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_TOKEN_EXPIRY_SECS: u64 = 60;

/// Name prefix for per-invocation container root directories.
pub const ROOT_DIR_PREFIX: &str = "nestbox-root-";

/// Name prefix for the per-invocation directory holding layer downloads.
pub const SCRATCH_DIR_PREFIX: &str = "nestbox-scratch-";

/// Name prefix for downloaded layer scratch files.
pub const SCRATCH_FILE_PREFIX: &str = "nestbox-layer-";

/// Environment variable overriding the token endpoint.
pub const ENV_AUTH_URL: &str = "NESTBOX_AUTH_URL";

/// Environment variable overriding the manifest base URL.
pub const ENV_REGISTRY_URL: &str = "NESTBOX_REGISTRY_URL";

/// Environment variable overriding the blob base URL.
pub const ENV_BLOB_URL: &str = "NESTBOX_BLOB_URL";

/// Environment variable overriding the working directory for roots and downloads.
pub const ENV_TMPDIR: &str = "NESTBOX_TMPDIR";

/// Application name used in the HTTP user agent.
pub const APP_NAME: &str = "nestbox";
