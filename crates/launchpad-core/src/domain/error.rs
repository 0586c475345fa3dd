//! Domain-level error taxonomy for Launchpad.

use std::path::PathBuf;

/// Configuration errors. All of them are fatal before any build job starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("target matrix is empty")]
    EmptyMatrix,

    #[error("target matrix has no active entries ({disabled} disabled)")]
    NoActiveEntries { disabled: usize },

    #[error("duplicate platform name in target matrix: {name}")]
    DuplicatePlatform { name: String },

    #[error("matrix entry #{index}: {field} must not be empty")]
    EmptyField { index: usize, field: &'static str },

    #[error("invalid executable name '{0}'")]
    InvalidExecutable(String),

    #[error("invalid manifest path '{0}': must be a relative path inside the checkout")]
    InvalidManifest(String),
}

/// Failure talking to git about the checkout.
#[derive(Debug, thiserror::Error)]
#[error("git error: {0}")]
pub struct GitError(pub String);
