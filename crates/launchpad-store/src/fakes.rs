//! In-memory fake for the release store (testing only)
//!
//! `MemoryReleaseStore` satisfies the `ReleaseStore` contract without any
//! external dependencies, and lets tests inject upload failures or
//! misbehaving upload acknowledgements.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StoreError;
use crate::storage_traits::*;

#[derive(Debug)]
struct FakeRelease {
    record: ReleaseRecord,
    files: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Default)]
struct FakeState {
    releases: HashMap<String, FakeRelease>,
    created: usize,
    upload_attempts: Vec<String>,
    failing: HashSet<String>,
    ack_overrides: HashMap<String, Vec<String>>,
}

/// In-memory release store backed by a `HashMap<tag, release>`.
#[derive(Debug, Default)]
pub struct MemoryReleaseStore {
    state: Mutex<FakeState>,
}

impl MemoryReleaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every upload of `remote_name` fail with `UploadRejected`.
    pub fn fail_uploads_of(&self, remote_name: &str) {
        self.lock().failing.insert(remote_name.to_string());
    }

    /// Report `files` in the ack for uploads of `remote_name` instead of the
    /// real single-file ack. The bytes are still stored.
    pub fn override_ack(&self, remote_name: &str, files: Vec<String>) {
        self.lock()
            .ack_overrides
            .insert(remote_name.to_string(), files);
    }

    /// Number of releases created since construction.
    pub fn releases_created(&self) -> usize {
        self.lock().created
    }

    /// Every remote name an upload was attempted for, in call order.
    pub fn upload_attempts(&self) -> Vec<String> {
        self.lock().upload_attempts.clone()
    }

    /// Stored bytes of `name` in the release for `tag`.
    pub fn file_bytes(&self, tag: &str, name: &str) -> Option<Vec<u8>> {
        self.lock()
            .releases
            .get(tag)
            .and_then(|r| r.files.get(name).cloned())
    }

    /// Seed a release as if a previous run had created it.
    pub fn seed_release(&self, tag: &str, draft: bool) -> ReleaseRecord {
        let mut state = self.lock();
        let record = ReleaseRecord {
            id: tag.to_string(),
            tag: tag.to_string(),
            draft,
            created_at: Utc::now(),
        };
        state.releases.insert(
            tag.to_string(),
            FakeRelease {
                record: record.clone(),
                files: BTreeMap::new(),
            },
        );
        record
    }
}

#[async_trait]
impl ReleaseStore for MemoryReleaseStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn get_or_create_release(&self, tag: &str, draft: bool) -> StoreResult<ReleaseRecord> {
        let mut state = self.lock();
        if let Some(existing) = state.releases.get(tag) {
            return Ok(existing.record.clone());
        }
        let record = ReleaseRecord {
            id: tag.to_string(),
            tag: tag.to_string(),
            draft,
            created_at: Utc::now(),
        };
        state.releases.insert(
            tag.to_string(),
            FakeRelease {
                record: record.clone(),
                files: BTreeMap::new(),
            },
        );
        state.created += 1;
        Ok(record)
    }

    async fn find_release(&self, tag: &str) -> StoreResult<Option<ReleaseRecord>> {
        Ok(self.lock().releases.get(tag).map(|r| r.record.clone()))
    }

    async fn upload_file(
        &self,
        release: &ReleaseRecord,
        local_path: &Path,
        remote_name: &str,
    ) -> StoreResult<UploadAck> {
        let data = read_local(local_path).await?;

        let mut state = self.lock();
        state.upload_attempts.push(remote_name.to_string());
        if state.failing.contains(remote_name) {
            return Err(StoreError::UploadRejected {
                name: remote_name.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        let files_override = state.ack_overrides.get(remote_name).cloned();

        let entry = state
            .releases
            .get_mut(&release.tag)
            .ok_or_else(|| StoreError::ReleaseNotFound {
                tag: release.tag.clone(),
            })?;

        let mut ack = UploadAck::single(remote_name, &data);
        entry.files.insert(remote_name.to_string(), data);
        if let Some(files) = files_override {
            ack.files = files;
        }
        Ok(ack)
    }

    async fn list_files(&self, release: &ReleaseRecord) -> StoreResult<BTreeSet<String>> {
        let state = self.lock();
        let entry = state
            .releases
            .get(&release.tag)
            .ok_or_else(|| StoreError::ReleaseNotFound {
                tag: release.tag.clone(),
            })?;
        Ok(entry.files.keys().cloned().collect())
    }
}
