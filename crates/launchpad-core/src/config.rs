//! `launchpad.toml` loading and validation.

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{ConfigError, MatrixEntry, TargetMatrix};

/// Config file looked up at the checkout root when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "launchpad.toml";

/// Manifest that must accompany every release unless configured otherwise.
pub const DEFAULT_MANIFEST: &str = "autoschematic.connector.ron";

/// Per-job timeout used when the config does not set one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

/// When the manifest gate may run, given the build outcomes of this run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GatePolicy {
    /// At least one job built and published in this run.
    #[default]
    AnySucceeded,
    /// Every active job built and published in this run.
    AllSucceeded,
}

/// External build tool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ToolchainConfig {
    /// Build program (`cargo`, `cross`, ...).
    #[serde(default = "default_program")]
    pub program: String,

    /// Extra arguments appended to every build invocation.
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_program() -> String {
    "cargo".to_string()
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
        }
    }
}

fn default_manifest() -> String {
    DEFAULT_MANIFEST.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LaunchpadConfig {
    /// Name of the binary to build and publish.
    pub executable: String,

    /// Manifest path relative to the checkout root.
    #[serde(default = "default_manifest")]
    pub manifest: String,

    #[serde(default)]
    pub gate_policy: GatePolicy,

    /// Per-job timeout in seconds; 0 disables the timeout.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub toolchain: ToolchainConfig,

    #[serde(default)]
    pub matrix: Vec<MatrixEntry>,
}

impl LaunchpadConfig {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&text, path)?;
        info!(
            path = %path.display(),
            entries = config.matrix.len(),
            executable = %config.executable,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse and validate config text; `origin` is only used in errors.
    pub fn parse(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: LaunchpadConfig = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.message().to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the fields serde cannot: executable and manifest shape, and the
    /// matrix itself.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let exe = self.executable.trim();
        if exe.is_empty() || exe != self.executable || exe.contains(['/', '\\']) {
            return Err(ConfigError::InvalidExecutable(self.executable.clone()));
        }

        let manifest = Path::new(&self.manifest);
        let escapes = manifest
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if self.manifest.trim().is_empty() || escapes {
            return Err(ConfigError::InvalidManifest(self.manifest.clone()));
        }

        self.target_matrix().expand().map(|_| ())
    }

    pub fn target_matrix(&self) -> TargetMatrix {
        TargetMatrix::new(self.matrix.clone())
    }

    /// Remote file name of the manifest (its final path component).
    pub fn manifest_file_name(&self) -> &str {
        Path::new(&self.manifest)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.manifest)
    }

    /// Starter config written by `launchpad init`.
    pub fn starter_toml(executable: &str) -> String {
        format!(
            r#"# Launchpad release configuration.
executable = "{executable}"
manifest = "{DEFAULT_MANIFEST}"
gate-policy = "any-succeeded"
timeout-secs = {DEFAULT_TIMEOUT_SECS}

[toolchain]
program = "cargo"
args = []

[[matrix]]
os-name = "linux-x86_64"
runs-on = "ubuntu-latest"
target = "x86_64-unknown-linux-gnu"

[[matrix]]
os-name = "macos-aarch64"
runs-on = "macos-latest"
target = "aarch64-apple-darwin"

[[matrix]]
os-name = "windows-x86_64"
runs-on = "windows-latest"
target = "x86_64-pc-windows-msvc"
active = false
"#
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<LaunchpadConfig, ConfigError> {
        LaunchpadConfig::parse(text, Path::new("launchpad.toml"))
    }

    #[test]
    fn starter_config_round_trips() {
        let config = parse(&LaunchpadConfig::starter_toml("my-connector")).unwrap();
        assert_eq!(config.executable, "my-connector");
        assert_eq!(config.manifest, DEFAULT_MANIFEST);
        assert_eq!(config.gate_policy, GatePolicy::AnySucceeded);
        assert_eq!(config.matrix.len(), 3);
        assert!(!config.matrix[2].active);
        assert_eq!(config.target_matrix().expand().unwrap().len(), 2);
    }

    #[test]
    fn defaults_fill_optional_fields() {
        let config = parse(
            r#"
executable = "tool"

[[matrix]]
os-name = "linux-x86_64"
runs-on = "ubuntu-latest"
target = "x86_64-unknown-linux-gnu"
"#,
        )
        .unwrap();

        assert_eq!(config.manifest, DEFAULT_MANIFEST);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.toolchain, ToolchainConfig::default());
        assert!(config.matrix[0].active);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = parse(
            r#"
executable = "tool"
publish-public = true
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn duplicate_platforms_fail_validation() {
        let err = parse(
            r#"
executable = "tool"

[[matrix]]
os-name = "linux"
runs-on = "ubuntu-latest"
target = "x86_64-unknown-linux-gnu"

[[matrix]]
os-name = "linux"
runs-on = "ubuntu-latest"
target = "aarch64-unknown-linux-gnu"
active = false
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePlatform { .. }));
    }

    #[test]
    fn manifest_must_stay_inside_checkout() {
        let base = LaunchpadConfig::starter_toml("tool");
        for bad in ["../outside.ron", "/etc/passwd", ""] {
            let text = base.replace(
                &format!("manifest = \"{}\"", DEFAULT_MANIFEST),
                &format!("manifest = \"{}\"", bad),
            );
            assert!(
                matches!(parse(&text), Err(ConfigError::InvalidManifest(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn executable_with_path_separator_is_rejected() {
        let text = LaunchpadConfig::starter_toml("bin/tool");
        assert!(matches!(
            parse(&text),
            Err(ConfigError::InvalidExecutable(_))
        ));
    }

    #[test]
    fn manifest_file_name_is_last_component() {
        let mut config = parse(&LaunchpadConfig::starter_toml("tool")).unwrap();
        config.manifest = "meta/connector.ron".to_string();
        assert_eq!(config.manifest_file_name(), "connector.ron");
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = LaunchpadConfig::load(&dir.path().join(DEFAULT_CONFIG_FILE)).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
