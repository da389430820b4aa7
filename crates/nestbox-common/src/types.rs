//! Domain primitive types used across the Nestbox workspace.

use std::fmt;
use std::str::FromStr;

use crate::constants::{DEFAULT_REPOSITORY, DEFAULT_TAG};
use crate::error::{NestboxError, Result};

/// A parsed `image[:tag]` reference.
///
/// The repository is always [`DEFAULT_REPOSITORY`]; namespaced and
/// private-registry images are not supported.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    repository: String,
    name: String,
    tag: String,
}

impl ImageReference {
    /// Parses an image string, splitting on the last `:`.
    ///
    /// # Errors
    ///
    /// Returns `NestboxError::Setup` if the name is empty.
    pub fn parse(image: &str) -> Result<Self> {
        let image = image.trim();
        let (name, tag) = image.rsplit_once(':').unwrap_or((image, DEFAULT_TAG));
        if name.is_empty() {
            return Err(NestboxError::setup(format!(
                "image reference '{image}' has an empty name"
            )));
        }
        Ok(Self {
            repository: DEFAULT_REPOSITORY.to_string(),
            name: name.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Repository namespace (always `library`).
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Image name without the tag.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Image tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Token scope requesting pull access for this image.
    #[must_use]
    pub fn pull_scope(&self) -> String {
        format!("repository:{}/{}:pull", self.repository, self.name)
    }
}

impl FromStr for ImageReference {
    type Err = NestboxError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.repository, self.name, self.tag)
    }
}
