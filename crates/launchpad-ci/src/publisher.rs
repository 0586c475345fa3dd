//! Artifact publishing into draft releases.
//!
//! A [`ReleaseLedger`] holds the one [`ReleaseHandle`] per tag that a run is
//! allowed to have. Every publisher and the manifest gate go through it, so
//! lookup-or-create against the store happens at most once per tag per run.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use launchpad_core::{is_windows_target, obs};
use launchpad_store::{ReleaseRecord, ReleaseStore, StoreResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PublishError;

/// Remote file name for an executable built for `build_target`.
///
/// `<executable>-<build_target>`, plus `.exe` for Windows targets. The name
/// depends only on its inputs so a re-run overwrites the previous upload.
pub fn artifact_file_name(executable: &str, build_target: &str) -> String {
    if is_windows_target(build_target) {
        format!("{}-{}.exe", executable, build_target)
    } else {
        format!("{}-{}", executable, build_target)
    }
}

#[derive(Debug)]
struct HandleInner {
    record: ReleaseRecord,
    uploaded: Mutex<BTreeSet<String>>,
}

/// The remote release for one tag, shared by every job in a run.
///
/// Cloning is cheap; clones share the uploaded-files set, which accepts
/// concurrent inserts from publishers running in parallel.
#[derive(Debug, Clone)]
pub struct ReleaseHandle {
    inner: Arc<HandleInner>,
}

impl ReleaseHandle {
    fn new(record: ReleaseRecord, existing: BTreeSet<String>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                record,
                uploaded: Mutex::new(existing),
            }),
        }
    }

    pub fn tag(&self) -> &str {
        &self.inner.record.tag
    }

    pub fn draft(&self) -> bool {
        self.inner.record.draft
    }

    /// Store-side record backing this handle.
    pub fn record(&self) -> &ReleaseRecord {
        &self.inner.record
    }

    fn files(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.inner
            .uploaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of every file known to be attached to the release.
    pub fn uploaded_files(&self) -> BTreeSet<String> {
        self.files().clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files().contains(name)
    }

    pub(crate) fn record_upload(&self, name: &str) {
        self.files().insert(name.to_string());
    }
}

/// Serializable view of a handle, for reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSummary {
    pub tag: String,
    pub draft: bool,
    pub files: BTreeSet<String>,
}

impl From<&ReleaseHandle> for ReleaseSummary {
    fn from(handle: &ReleaseHandle) -> Self {
        Self {
            tag: handle.tag().to_string(),
            draft: handle.draft(),
            files: handle.uploaded_files(),
        }
    }
}

/// Per-run map of tag to release handle.
///
/// Only handles resolved through this ledger count as "created in this
/// run". A release left behind by an earlier run is not visible here until
/// a publisher in the current run resolves it.
pub struct ReleaseLedger {
    store: Arc<dyn ReleaseStore>,
    handles: tokio::sync::Mutex<HashMap<String, ReleaseHandle>>,
}

impl ReleaseLedger {
    pub fn new(store: Arc<dyn ReleaseStore>) -> Self {
        Self {
            store,
            handles: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ReleaseStore> {
        &self.store
    }

    /// Handle for `tag` if a publisher resolved it during this run.
    pub async fn get(&self, tag: &str) -> Option<ReleaseHandle> {
        self.handles.lock().await.get(tag).cloned()
    }

    /// Resolve the handle for `tag`, creating the release as a draft when
    /// the store has none.
    ///
    /// The map lock is held across the store call so concurrent first
    /// publishes for one tag resolve a single release. Files the release
    /// already holds seed the uploaded set, so a re-run overwrites names
    /// it already knows about.
    pub async fn get_or_create(&self, tag: &str) -> StoreResult<ReleaseHandle> {
        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.get(tag) {
            return Ok(handle.clone());
        }

        let record = self.store.get_or_create_release(tag, true).await?;
        let existing = self.store.list_files(&record).await?;
        if !record.draft {
            warn!(tag = %tag, "Release already exists and is not a draft");
        }
        debug!(tag = %tag, existing = existing.len(), store = %self.store.describe(), "Resolved release");

        let handle = ReleaseHandle::new(record, existing);
        handles.insert(tag.to_string(), handle.clone());
        Ok(handle)
    }

}

/// Outcome of one successful publish.
#[derive(Debug, Clone)]
pub struct Published {
    pub handle: ReleaseHandle,
    pub remote_name: String,
    pub sha256: String,
    pub size: u64,
}

/// Uploads single artifacts into the release for a tag.
#[derive(Clone)]
pub struct ArtifactPublisher {
    ledger: Arc<ReleaseLedger>,
}

impl ArtifactPublisher {
    pub fn new(ledger: Arc<ReleaseLedger>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Arc<ReleaseLedger> {
        &self.ledger
    }

    /// Upload `artifact_path` into the draft release for `tag`.
    ///
    /// A failed upload affects only this call: nothing already uploaded is
    /// removed and nothing is retried.
    pub async fn publish(
        &self,
        tag: &str,
        executable: &str,
        artifact_path: &Path,
        build_target: &str,
    ) -> Result<Published, PublishError> {
        let handle = self
            .ledger
            .get_or_create(tag)
            .await
            .map_err(|source| PublishError::Release {
                tag: tag.to_string(),
                source,
            })?;

        let remote_name = artifact_file_name(executable, build_target);
        let ack = self
            .ledger
            .store()
            .upload_file(handle.record(), artifact_path, &remote_name)
            .await
            .map_err(|source| PublishError::Upload {
                tag: tag.to_string(),
                name: remote_name.clone(),
                source,
            })?;

        if !ack.is_exact(&remote_name) {
            warn!(tag = %tag, name = %remote_name, reported = ?ack.files, "Store acknowledged unexpected files");
        }
        handle.record_upload(&remote_name);

        Ok(Published {
            handle,
            remote_name,
            sha256: ack.sha256,
            size: ack.size,
        })
    }

    /// [`publish`](Self::publish) for a build job, with lifecycle events.
    pub(crate) async fn publish_for(
        &self,
        platform: &str,
        tag: &str,
        executable: &str,
        artifact_path: &Path,
        build_target: &str,
    ) -> Result<Published, PublishError> {
        match self.publish(tag, executable, artifact_path, build_target).await {
            Ok(published) => {
                obs::emit_artifact_published(platform, tag, &published.remote_name, &published.sha256);
                Ok(published)
            }
            Err(e) => {
                obs::emit_publish_failed(platform, tag, &e);
                Err(e)
            }
        }
    }
}
