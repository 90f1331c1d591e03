//! Node configuration errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the node configuration store and its backends.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No address was provided.
    #[error("node address is empty")]
    EmptyAddress,

    /// The address could not be parsed or is not usable.
    #[error("invalid node address '{input}': {reason}")]
    InvalidAddress { input: String, reason: String },

    /// The per-user configuration directory could not be determined.
    #[error("could not determine the per-user config directory")]
    NoConfigDir,

    /// Reading or writing the state file failed.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The state file is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn invalid(input: &str, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true for user input errors (as opposed to storage failures).
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::EmptyAddress | Self::InvalidAddress { .. })
    }
}
