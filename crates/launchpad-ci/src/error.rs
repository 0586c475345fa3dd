//! Error taxonomy for the release engine.
//!
//! Job-local errors (`BuildError`, `PublishError`) are recorded on the job
//! and never stop sibling jobs. `GateError` and `PipelineError` are
//! run-level and make the run fail.

use std::path::PathBuf;

use launchpad_core::ConfigError;
use launchpad_store::StoreError;

use crate::gate::GateState;

/// A single platform build failed. Always names the platform.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("{platform}: failed to launch {program}: {source}")]
    Spawn {
        platform: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{platform}: build for {target} exited with code {code}: {stderr_tail}")]
    Toolchain {
        platform: String,
        target: String,
        code: i32,
        stderr_tail: String,
    },

    #[error("{platform}: build timed out after {secs}s")]
    Timeout { platform: String, secs: u64 },

    #[error("{platform}: expected artifact missing at {}", path.display())]
    ArtifactMissing { platform: String, path: PathBuf },

    #[error("{platform}: build task aborted: {reason}")]
    Aborted { platform: String, reason: String },
}

/// Publishing one artifact failed. Not retried; earlier uploads stay.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("cannot resolve release {tag}: {source}")]
    Release {
        tag: String,
        #[source]
        source: StoreError,
    },

    #[error("upload of {name} to release {tag} failed: {source}")]
    Upload {
        tag: String,
        name: String,
        #[source]
        source: StoreError,
    },
}

/// The manifest gate refused to complete the release.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("required manifest missing: {}", path.display())]
    ManifestMissing { path: PathBuf },

    #[error("no release exists for tag {tag}: no platform artifact was published in this run")]
    NoRelease { tag: String },

    #[error(
        "manifest upload of {name} was ambiguous: expected exactly one file named {name}, store reported {reported:?}"
    )]
    ManifestUploadAmbiguous { name: String, reported: Vec<String> },

    #[error("manifest upload of {name} failed: {source}")]
    Upload {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("illegal gate transition {from} -> {to}")]
    IllegalTransition { from: GateState, to: GateState },
}

/// The run could not start.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// A build job was asked to make a transition its state machine forbids.
#[derive(Debug, thiserror::Error)]
#[error("job {platform}: cannot move from {from} to {to}")]
pub struct JobStateError {
    pub platform: String,
    pub from: crate::executor::JobStatus,
    pub to: crate::executor::JobStatus,
}
