//! Error types for launchpad-store

use thiserror::Error;

/// Errors that can occur while talking to a release store
#[derive(Error, Debug)]
pub enum StoreError {
    /// No release exists for the requested tag
    #[error("release not found for tag: {tag}")]
    ReleaseNotFound { tag: String },

    /// Local file to upload could not be read
    #[error("cannot read {path}: {source}")]
    LocalFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Store-side I/O failure (directory backend)
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Transport error talking to a remote store
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote store answered with an unexpected status
    #[error("remote store returned {status} for {operation}: {body}")]
    Remote {
        operation: String,
        status: u16,
        body: String,
    },

    /// Upload rejected by the store
    #[error("upload of {name} rejected: {reason}")]
    UploadRejected { name: String, reason: String },

    /// Tag or file name that cannot be stored verbatim
    #[error("invalid name '{name}': must be a single non-empty path component")]
    InvalidName { name: String },

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Unparseable store spec string
    #[error("invalid store spec '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Transport(err.to_string())
    }
}
