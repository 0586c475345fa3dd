//! Domain models for Launchpad.
//!
//! Canonical definitions for the core entities:
//! - `MatrixEntry` / `TargetMatrix`: the platforms a release is built for
//! - `Trigger`: the ref that started a run, classified as release or not
//! - `ConfigError`: configuration failures, fatal before any job starts

pub mod error;
pub mod matrix;
pub mod trigger;

pub use error::{ConfigError, GitError};
pub use matrix::{is_windows_target, MatrixEntry, TargetMatrix};
pub use trigger::{is_release_tag, Trigger};
