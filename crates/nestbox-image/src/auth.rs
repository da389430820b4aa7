//! Registry bearer tokens.

use std::fmt;

use nestbox_common::constants::DEFAULT_TOKEN_EXPIRY_SECS;
use nestbox_common::error::{NestboxError, Result};
use serde::Deserialize;

/// Bearer token authorizing pull access to one repository.
///
/// Obtained once per invocation; never refreshed or persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
    value: String,
    expires_in_seconds: u64,
}

/// Wire shape of the token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl AuthToken {
    /// Creates a token from its raw parts.
    #[must_use]
    pub fn new(value: impl Into<String>, expires_in_seconds: u64) -> Self {
        Self {
            value: value.into(),
            expires_in_seconds,
        }
    }

    /// Decodes a token endpoint response body.
    ///
    /// `token` is preferred; `access_token` is used when `token` is absent.
    ///
    /// # Errors
    ///
    /// Returns `NestboxError::Auth` if the body is not valid JSON or carries
    /// neither token field.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let response: TokenResponse = serde_json::from_slice(body)
            .map_err(|e| NestboxError::auth_caused("malformed token response", e))?;

        let value = response
            .token
            .or(response.access_token)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| NestboxError::auth("token response carries no token"))?;

        Ok(Self {
            value,
            expires_in_seconds: response.expires_in.unwrap_or(DEFAULT_TOKEN_EXPIRY_SECS),
        })
    }

    /// Raw token value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Lifetime in seconds reported by the token endpoint.
    #[must_use]
    pub const fn expires_in_seconds(&self) -> u64 {
        self.expires_in_seconds
    }

    /// `Authorization` header value for this token.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("value", &"<redacted>")
            .field("expires_in_seconds", &self.expires_in_seconds)
            .finish()
    }
}
