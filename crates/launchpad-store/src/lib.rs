//! Launchpad release store
//!
//! This crate is the persistence layer of the release engine: the opaque
//! release-hosting surface artifacts and manifests are published into.
//!
//! ## Key Components
//!
//! - `ReleaseStore`: async trait (lookup-or-create, upload, list)
//! - `DirReleaseStore`: releases as directories on local disk
//! - `GitHubReleaseStore`: GitHub Releases over the REST API
//! - `fakes::MemoryReleaseStore`: in-memory store with fault injection

pub mod dir_store;
mod error;
pub mod fakes;
pub mod github;
mod locator;
pub mod storage_traits;

pub use dir_store::DirReleaseStore;
pub use error::StoreError;
pub use github::{GitHubConfig, GitHubReleaseStore};
pub use locator::StoreLocator;
pub use storage_traits::{
    read_local, sha256_hex, ReleaseRecord, ReleaseStore, StoreResult, UploadAck,
};
