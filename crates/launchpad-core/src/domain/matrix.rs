//! Target matrix: the platforms a release is built for.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

fn default_active() -> bool {
    true
}

/// Whether a target triple builds Windows executables.
pub fn is_windows_target(build_target: &str) -> bool {
    build_target.contains("windows")
}

/// One platform/target combination to build for.
///
/// Field names on the wire follow the matrix record layout
/// (`os-name`, `runs-on`, `target`). `active = false` disables an entry
/// without deleting it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatrixEntry {
    /// Platform name, unique within a run.
    #[serde(rename = "os-name")]
    pub platform_name: String,

    /// Execution environment label (runner image).
    #[serde(rename = "runs-on")]
    pub execution_environment: String,

    /// Toolchain target triple.
    #[serde(rename = "target")]
    pub build_target: String,

    #[serde(default = "default_active")]
    pub active: bool,
}

impl MatrixEntry {
    pub fn new(
        platform_name: impl Into<String>,
        execution_environment: impl Into<String>,
        build_target: impl Into<String>,
    ) -> Self {
        Self {
            platform_name: platform_name.into(),
            execution_environment: execution_environment.into(),
            build_target: build_target.into(),
            active: true,
        }
    }

    /// Mark this entry inactive.
    pub fn disabled(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Ordered, immutable list of matrix entries as configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetMatrix {
    entries: Vec<MatrixEntry>,
}

impl TargetMatrix {
    pub fn new(entries: Vec<MatrixEntry>) -> Self {
        Self { entries }
    }

    /// Every configured entry, active or not, in configuration order.
    pub fn entries(&self) -> &[MatrixEntry] {
        &self.entries
    }

    /// Inactive entries, in configuration order.
    pub fn skipped(&self) -> impl Iterator<Item = &MatrixEntry> {
        self.entries.iter().filter(|e| !e.active)
    }

    /// Expand the matrix into the entries that produce build jobs.
    ///
    /// Validation runs over all entries before anything is returned, so a
    /// bad matrix never yields a partial expansion. Platform names must be
    /// unique across active and inactive entries alike.
    pub fn expand(&self) -> Result<Vec<MatrixEntry>, ConfigError> {
        if self.entries.is_empty() {
            return Err(ConfigError::EmptyMatrix);
        }

        let mut seen = HashSet::new();
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.platform_name.trim().is_empty() {
                return Err(ConfigError::EmptyField {
                    index,
                    field: "os-name",
                });
            }
            if entry.execution_environment.trim().is_empty() {
                return Err(ConfigError::EmptyField {
                    index,
                    field: "runs-on",
                });
            }
            if entry.build_target.trim().is_empty() {
                return Err(ConfigError::EmptyField {
                    index,
                    field: "target",
                });
            }
            if !seen.insert(entry.platform_name.as_str()) {
                return Err(ConfigError::DuplicatePlatform {
                    name: entry.platform_name.clone(),
                });
            }
        }

        let active: Vec<MatrixEntry> = self.entries.iter().filter(|e| e.active).cloned().collect();
        if active.is_empty() {
            return Err(ConfigError::NoActiveEntries {
                disabled: self.entries.len(),
            });
        }
        Ok(active)
    }
}
