//! Directory-backed release store.
//!
//! Layout under the root:
//!
//! ```text
//! <root>/<tag>/release.json   release record
//! <root>/<tag>/files/<name>   uploaded files
//! <root>/<tag>/.staging/      temp files awaiting rename
//! ```
//!
//! Every write lands in `.staging` first and is renamed into place, so a
//! reader never sees a half-written record or upload and a re-upload of the
//! same name replaces the old file atomically.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::storage_traits::*;

const RECORD_FILE: &str = "release.json";
const FILES_DIR: &str = "files";
const STAGING_DIR: &str = ".staging";

/// Release store rooted at a local directory.
#[derive(Debug)]
pub struct DirReleaseStore {
    root: PathBuf,
    // Serializes lookup-or-create so two publishers cannot both write a record.
    create: Mutex<()>,
}

impl DirReleaseStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            create: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn release_dir(&self, tag: &str) -> StoreResult<PathBuf> {
        check_component(tag)?;
        Ok(self.root.join(tag))
    }

    async fn read_record(&self, tag: &str) -> StoreResult<Option<ReleaseRecord>> {
        let path = self.release_dir(tag)?.join(RECORD_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write `data` to `dest` through a temp file in `staging`.
///
/// `staging` must be on the same filesystem as `dest`.
async fn write_atomic(staging: PathBuf, dest: PathBuf, data: Vec<u8>) -> StoreResult<()> {
    tokio::fs::create_dir_all(&staging).await?;
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut tmp = NamedTempFile::new_in(&staging)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;
    Ok(())
}

fn check_component(name: &str) -> StoreResult<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\');
    if bad {
        return Err(StoreError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl ReleaseStore for DirReleaseStore {
    fn describe(&self) -> String {
        format!("dir:{}", self.root.display())
    }

    async fn get_or_create_release(&self, tag: &str, draft: bool) -> StoreResult<ReleaseRecord> {
        let _guard = self.create.lock().await;
        if let Some(existing) = self.read_record(tag).await? {
            debug!(tag, "Reusing existing release record");
            return Ok(existing);
        }

        let dir = self.release_dir(tag)?;
        tokio::fs::create_dir_all(dir.join(FILES_DIR)).await?;
        let record = ReleaseRecord {
            id: tag.to_string(),
            tag: tag.to_string(),
            draft,
            created_at: Utc::now(),
        };
        write_atomic(
            dir.join(STAGING_DIR),
            dir.join(RECORD_FILE),
            serde_json::to_vec_pretty(&record)?,
        )
        .await?;
        info!(tag, draft, root = %self.root.display(), "Created release");
        Ok(record)
    }

    async fn find_release(&self, tag: &str) -> StoreResult<Option<ReleaseRecord>> {
        self.read_record(tag).await
    }

    async fn upload_file(
        &self,
        release: &ReleaseRecord,
        local_path: &Path,
        remote_name: &str,
    ) -> StoreResult<UploadAck> {
        check_component(remote_name)?;
        let dir = self.release_dir(&release.tag)?;
        let files_dir = dir.join(FILES_DIR);
        if !tokio::fs::try_exists(&files_dir).await? {
            return Err(StoreError::ReleaseNotFound {
                tag: release.tag.clone(),
            });
        }

        let data = read_local(local_path).await?;
        let ack = UploadAck::single(remote_name, &data);
        write_atomic(dir.join(STAGING_DIR), files_dir.join(remote_name), data).await?;
        Ok(ack)
    }

    async fn list_files(&self, release: &ReleaseRecord) -> StoreResult<BTreeSet<String>> {
        let files_dir = self.release_dir(&release.tag)?.join(FILES_DIR);
        let mut entries = match tokio::fs::read_dir(&files_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::ReleaseNotFound {
                    tag: release.tag.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let mut names = BTreeSet::new();
        while let Some(entry) = entries.next_entry().await? {
            names.insert(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_path_like_names() {
        assert!(check_component("v1.2.3").is_ok());
        assert!(check_component("tool-x86_64-pc-windows-msvc.exe").is_ok());
        assert!(check_component("").is_err());
        assert!(check_component("..").is_err());
        assert!(check_component("a/b").is_err());
    }

    #[tokio::test]
    async fn upload_into_unknown_release_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirReleaseStore::new(dir.path());
        let record = ReleaseRecord {
            id: "v9.9.9".to_string(),
            tag: "v9.9.9".to_string(),
            draft: true,
            created_at: Utc::now(),
        };
        let src = dir.path().join("artifact");
        std::fs::write(&src, b"bin").unwrap();

        let err = store.upload_file(&record, &src, "tool").await.unwrap_err();
        assert!(matches!(err, StoreError::ReleaseNotFound { .. }));
    }

    #[tokio::test]
    async fn dotted_partial_names_are_listed_like_any_upload() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirReleaseStore::new(dir.path());
        let record = store.get_or_create_release("v1.0.0", true).await.unwrap();
        let src = dir.path().join("artifact");
        std::fs::write(&src, b"bin").unwrap();

        store.upload_file(&record, &src, ".tool.partial").await.unwrap();
        store.upload_file(&record, &src, "tool").await.unwrap();

        let files = store.list_files(&record).await.unwrap();
        assert_eq!(
            files,
            BTreeSet::from([".tool.partial".to_string(), "tool".to_string()])
        );
    }

    #[tokio::test]
    async fn writes_leave_no_temp_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirReleaseStore::new(dir.path());
        let record = store.get_or_create_release("v1.0.0", true).await.unwrap();
        let src = dir.path().join("artifact");
        std::fs::write(&src, b"bin").unwrap();
        store.upload_file(&record, &src, "tool").await.unwrap();

        let release_dir = dir.path().join("v1.0.0");
        let staged = std::fs::read_dir(release_dir.join(STAGING_DIR)).unwrap().count();
        assert_eq!(staged, 0);

        let on_disk: ReleaseRecord =
            serde_json::from_slice(&std::fs::read(release_dir.join(RECORD_FILE)).unwrap()).unwrap();
        assert_eq!(on_disk, record);
    }

    #[tokio::test]
    async fn record_write_replaces_without_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join(RECORD_FILE);
        std::fs::write(&dest, b"old contents that are longer").unwrap();

        write_atomic(dir.path().join(STAGING_DIR), dest.clone(), b"new".to_vec())
            .await
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
    }
}
