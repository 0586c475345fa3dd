//! Launchpad Core Library
//!
//! Domain types shared by the release engine and its CLI: the target
//! matrix, trigger classification, configuration, git queries, and the
//! tracing setup and lifecycle events every binary uses.

pub mod config;
pub mod domain;
pub mod git;
pub mod obs;
pub mod telemetry;

pub use config::{
    GatePolicy, LaunchpadConfig, ToolchainConfig, DEFAULT_CONFIG_FILE, DEFAULT_MANIFEST,
    DEFAULT_TIMEOUT_SECS,
};
pub use domain::{
    is_release_tag, is_windows_target, ConfigError, GitError, MatrixEntry, TargetMatrix, Trigger,
};
pub use git::{capture_head_sha, tag_at_head};
pub use obs::RunSpan;
pub use telemetry::init_tracing;

/// Launchpad version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
