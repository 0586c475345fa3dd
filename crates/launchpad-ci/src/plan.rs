//! Run identity and the expanded job list.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use launchpad_core::{ConfigError, LaunchpadConfig, MatrixEntry, Trigger};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Everything a run is going to do, fixed before the first job starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPlan {
    pub run_id: Uuid,
    pub trigger: Trigger,

    /// Active entries, one build job each, in configuration order.
    pub jobs: Vec<MatrixEntry>,

    /// Platform names of inactive entries.
    pub skipped: Vec<String>,

    /// SHA-256 over the active entries (deterministic, order sensitive).
    pub matrix_digest: String,

    /// Checkout root.
    pub checkout: PathBuf,

    /// HEAD commit when known.
    pub git_sha: Option<String>,

    pub started_at: DateTime<Utc>,
}

impl RunPlan {
    /// Expand the matrix for `trigger`. Fails before anything runs if the
    /// matrix is invalid.
    pub fn new(
        config: &LaunchpadConfig,
        trigger: Trigger,
        checkout: impl Into<PathBuf>,
        git_sha: Option<String>,
    ) -> Result<Self, ConfigError> {
        let matrix = config.target_matrix();
        let jobs = matrix.expand()?;
        let skipped = matrix.skipped().map(|e| e.platform_name.clone()).collect();
        Ok(Self {
            run_id: Uuid::new_v4(),
            trigger,
            matrix_digest: compute_matrix_digest(&jobs),
            jobs,
            skipped,
            checkout: checkout.into(),
            git_sha,
            started_at: Utc::now(),
        })
    }

    pub fn release_tag(&self) -> Option<&str> {
        self.trigger.release_tag()
    }
}

/// Digest of the ordered active entries.
fn compute_matrix_digest(entries: &[MatrixEntry]) -> String {
    let mut hasher = Sha256::new();
    for entry in entries {
        for field in [
            &entry.platform_name,
            &entry.execution_environment,
            &entry.build_target,
        ] {
            hasher.update(field.as_bytes());
            hasher.update(b"\0");
        }
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn config() -> LaunchpadConfig {
        LaunchpadConfig::parse(&LaunchpadConfig::starter_toml("tool"), Path::new("t.toml")).unwrap()
    }

    #[test]
    fn plan_lists_active_jobs_and_skipped_names() {
        let plan = RunPlan::new(&config(), Trigger::from_ref("v1.2.3"), ".", None).unwrap();
        assert_eq!(plan.jobs.len(), 2);
        assert_eq!(plan.skipped, vec!["windows-x86_64".to_string()]);
        assert_eq!(plan.release_tag(), Some("v1.2.3"));
    }

    #[test]
    fn matrix_digest_is_deterministic_and_order_sensitive() {
        let a = MatrixEntry::new("a", "ubuntu-latest", "x86_64-unknown-linux-gnu");
        let b = MatrixEntry::new("b", "macos-latest", "aarch64-apple-darwin");

        assert_eq!(
            compute_matrix_digest(&[a.clone(), b.clone()]),
            compute_matrix_digest(&[a.clone(), b.clone()])
        );
        assert_ne!(
            compute_matrix_digest(&[a.clone(), b.clone()]),
            compute_matrix_digest(&[b, a])
        );
    }

    #[test]
    fn run_ids_are_unique() {
        let a = RunPlan::new(&config(), Trigger::from_ref("main"), ".", None).unwrap();
        let b = RunPlan::new(&config(), Trigger::from_ref("main"), ".", None).unwrap();
        assert_ne!(a.run_id, b.run_id);
        assert_eq!(a.matrix_digest, b.matrix_digest);
    }
}
