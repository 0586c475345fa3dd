//! Storage trait definitions for Launchpad
//!
//! `ReleaseStore` is the opaque release-hosting surface the engine publishes
//! into: lookup-or-create a release by tag, upload a file under a remote
//! name, list what a release already holds.
//!
//! The trait is async and backend-agnostic. An in-memory fake is provided
//! for testing via the `fakes` module.

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StoreError;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A release entry as the store sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    /// Store-assigned identifier (numeric id on GitHub, the tag elsewhere).
    pub id: String,
    /// Tag the release is keyed by.
    pub tag: String,
    /// Draft releases are visible to maintainers only.
    pub draft: bool,
    pub created_at: DateTime<Utc>,
}

/// Acknowledgement returned by a completed upload.
///
/// `files` lists every remote file the transfer touched. A well-behaved
/// store reports exactly one entry equal to the requested remote name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadAck {
    pub files: Vec<String>,
    /// SHA-256 of the uploaded bytes (lowercase hex).
    pub sha256: String,
    pub size: u64,
}

impl UploadAck {
    /// Ack for a single file transfer.
    pub fn single(name: impl Into<String>, data: &[u8]) -> Self {
        Self {
            files: vec![name.into()],
            sha256: sha256_hex(data),
            size: data.len() as u64,
        }
    }

    /// Whether the ack reports exactly one file named `name`.
    pub fn is_exact(&self, name: &str) -> bool {
        self.files.len() == 1 && self.files[0] == name
    }
}

/// SHA-256 of `data` as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Read a local file for upload, mapping failures to `StoreError::LocalFile`.
pub async fn read_local(path: &Path) -> StoreResult<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|source| StoreError::LocalFile {
            path: path.display().to_string(),
            source,
        })
}

/// Release hosting store.
///
/// Guarantees:
/// - `get_or_create_release(tag, _)` returns the same release for the same
///   tag on every call; the `draft` flag only applies on creation.
/// - `upload_file` with an existing remote name replaces that file.
/// - Concurrent uploads of distinct names into one release are safe.
#[async_trait]
pub trait ReleaseStore: Send + Sync {
    /// Human-readable backend name for logs.
    fn describe(&self) -> String;

    /// Return the release for `tag`, creating it when absent.
    async fn get_or_create_release(&self, tag: &str, draft: bool) -> StoreResult<ReleaseRecord>;

    /// Return the release for `tag` if one exists.
    async fn find_release(&self, tag: &str) -> StoreResult<Option<ReleaseRecord>>;

    /// Upload `local_path` into `release` as `remote_name`.
    async fn upload_file(
        &self,
        release: &ReleaseRecord,
        local_path: &Path,
        remote_name: &str,
    ) -> StoreResult<UploadAck>;

    /// Names of all files attached to `release`.
    async fn list_files(&self, release: &ReleaseRecord) -> StoreResult<BTreeSet<String>>;
}
