//! Unified error types for the Nestbox workspace.
//!
//! Every stage of the run pipeline fails with exactly one of these variants.
//! None of them are retried: each one terminates the invocation with exit
//! status `1` after the container root has been removed.

use thiserror::Error;

/// Boxed underlying cause attached to a [`NestboxError`].
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum NestboxError {
    /// The registry token endpoint could not be reached, rejected the
    /// request, or returned an undecodable body.
    #[error("registry authentication failed: {message}")]
    Auth {
        /// Description of the failure.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<BoxedCause>,
    },

    /// The image manifest could not be fetched or decoded.
    #[error("manifest resolution failed: {message}")]
    Manifest {
        /// Description of the failure.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<BoxedCause>,
    },

    /// A layer blob could not be downloaded or persisted to scratch storage.
    #[error("layer fetch failed: {message}")]
    LayerFetch {
        /// Description of the failure.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<BoxedCause>,
    },

    /// A downloaded layer archive was corrupt or in an unsupported format.
    #[error("layer extraction failed: {message}")]
    LayerExtract {
        /// Description of the failure.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<BoxedCause>,
    },

    /// The container root filesystem could not be prepared.
    #[error("container setup failed: {message}")]
    Setup {
        /// Description of the failure.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<BoxedCause>,
    },

    /// The operating system refused to start the isolated process.
    #[error("container launch failed: {message}")]
    Launch {
        /// Description of the failure.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<BoxedCause>,
    },
}

macro_rules! constructors {
    ($($variant:ident => $plain:ident, $caused:ident;)*) => {
        impl NestboxError {
            $(
                #[doc = concat!(
                    "Creates a `", stringify!($variant), "` error without an underlying cause."
                )]
                #[must_use]
                pub fn $plain(message: impl Into<String>) -> Self {
                    Self::$variant {
                        message: message.into(),
                        source: None,
                    }
                }

                #[doc = concat!("Creates a `", stringify!($variant), "` error wrapping `cause`.")]
                #[must_use]
                pub fn $caused(
                    message: impl Into<String>,
                    cause: impl Into<BoxedCause>,
                ) -> Self {
                    Self::$variant {
                        message: message.into(),
                        source: Some(cause.into()),
                    }
                }
            )*
        }
    };
}

constructors! {
    Auth => auth, auth_caused;
    Manifest => manifest, manifest_caused;
    LayerFetch => layer_fetch, layer_fetch_caused;
    LayerExtract => layer_extract, layer_extract_caused;
    Setup => setup, setup_caused;
    Launch => launch, launch_caused;
}

impl NestboxError {
    /// Short machine-readable name of the error kind, used in log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Manifest { .. } => "manifest",
            Self::LayerFetch { .. } => "layer_fetch",
            Self::LayerExtract { .. } => "layer_extract",
            Self::Setup { .. } => "setup",
            Self::Launch { .. } => "launch",
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, NestboxError>;
