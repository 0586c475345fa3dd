//! Build execution for a single matrix entry.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use launchpad_core::{obs, MatrixEntry};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{BuildError, JobStateError};
use crate::publisher::ArtifactPublisher;
use crate::toolchain::{BuildRequest, BuildToolchain};

/// Status of a build job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One build attempt for one matrix entry.
///
/// Moves `Pending -> Running -> (Succeeded | Failed)`, and reaches a
/// terminal state exactly once. A job may also fail straight from
/// `Pending` when its task never got to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildJob {
    pub entry: MatrixEntry,
    status: JobStatus,
    produced_artifact_path: Option<PathBuf>,
    error: Option<String>,
}

impl BuildJob {
    pub fn new(entry: MatrixEntry) -> Self {
        Self {
            entry,
            status: JobStatus::Pending,
            produced_artifact_path: None,
            error: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn produced_artifact_path(&self) -> Option<&PathBuf> {
        self.produced_artifact_path.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn platform(&self) -> &str {
        &self.entry.platform_name
    }

    fn illegal(&self, to: JobStatus) -> JobStateError {
        JobStateError {
            platform: self.entry.platform_name.clone(),
            from: self.status,
            to,
        }
    }

    pub fn start(&mut self) -> Result<(), JobStateError> {
        if self.status != JobStatus::Pending {
            return Err(self.illegal(JobStatus::Running));
        }
        self.status = JobStatus::Running;
        Ok(())
    }

    pub fn succeed(&mut self, artifact: PathBuf) -> Result<(), JobStateError> {
        if self.status != JobStatus::Running {
            return Err(self.illegal(JobStatus::Succeeded));
        }
        self.status = JobStatus::Succeeded;
        self.produced_artifact_path = Some(artifact);
        Ok(())
    }

    pub fn fail(&mut self, error: impl fmt::Display) -> Result<(), JobStateError> {
        if self.status.is_terminal() {
            return Err(self.illegal(JobStatus::Failed));
        }
        self.status = JobStatus::Failed;
        self.error = Some(error.to_string());
        Ok(())
    }

    /// Fail regardless of the current status. Used when publishing an
    /// already built artifact fails, and for aborted tasks. Keeps any
    /// artifact path.
    fn force_failed(&mut self, error: impl fmt::Display) {
        self.status = JobStatus::Failed;
        self.error = Some(error.to_string());
    }
}

/// Whether and how a job's artifact reached the release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// Not a release run, or the build failed.
    Skipped,
    Uploaded {
        remote_name: String,
        sha256: String,
        size: u64,
    },
    Failed {
        error: String,
    },
}

/// Terminal job plus what happened when publishing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job: BuildJob,
    pub publish: PublishOutcome,
    pub duration_ms: u64,
}

impl JobReport {
    /// Built and, when publishing was attempted, uploaded.
    pub fn succeeded(&self) -> bool {
        self.job.status() == JobStatus::Succeeded
            && !matches!(self.publish, PublishOutcome::Failed { .. })
    }

    /// A report for a job whose task was cancelled or panicked.
    pub fn aborted(entry: MatrixEntry, reason: impl Into<String>) -> Self {
        let mut job = BuildJob::new(entry);
        let error = BuildError::Aborted {
            platform: job.platform().to_string(),
            reason: reason.into(),
        };
        job.force_failed(&error);
        Self {
            job,
            publish: PublishOutcome::Skipped,
            duration_ms: 0,
        }
    }
}

#[derive(Clone)]
struct PublishTarget {
    publisher: ArtifactPublisher,
    tag: String,
}

/// Runs one build per matrix entry and publishes successful artifacts
/// immediately, within the same job.
#[derive(Clone)]
pub struct BuildExecutor {
    toolchain: Arc<dyn BuildToolchain>,
    executable: String,
    timeout: Option<Duration>,
    publish: Option<PublishTarget>,
}

impl BuildExecutor {
    pub fn new(toolchain: Arc<dyn BuildToolchain>, executable: impl Into<String>) -> Self {
        Self {
            toolchain,
            executable: executable.into(),
            timeout: None,
            publish: None,
        }
    }

    /// Per-job timeout; 0 disables it.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    /// Publish successful artifacts into the release for `tag`.
    pub fn with_publisher(mut self, publisher: ArtifactPublisher, tag: impl Into<String>) -> Self {
        self.publish = Some(PublishTarget {
            publisher,
            tag: tag.into(),
        });
        self
    }

    /// Build `entry` and return the terminal job. Does not publish.
    pub async fn build(&self, entry: MatrixEntry) -> BuildJob {
        let mut job = BuildJob::new(entry);
        let request = BuildRequest::for_entry(&job.entry, &self.executable);
        if let Err(e) = job.start() {
            warn!(error = %e, "Ignoring illegal job transition");
        }
        debug!(platform = %job.platform(), toolchain = %self.toolchain.name(), "Build started");

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.toolchain.build(&request)).await {
                Ok(result) => result,
                Err(_) => Err(BuildError::Timeout {
                    platform: request.platform.clone(),
                    secs: limit.as_secs(),
                }),
            },
            None => self.toolchain.build(&request).await,
        };

        let transition = match result {
            Ok(artifact) => job.succeed(artifact),
            Err(e) => {
                warn!(platform = %job.platform(), error = %e, "Build failed");
                job.fail(e)
            }
        };
        if let Err(e) = transition {
            warn!(error = %e, "Ignoring illegal job transition");
        }
        job
    }

    /// Build `entry`, then publish its artifact when a publisher is set.
    pub async fn run(&self, entry: MatrixEntry) -> JobReport {
        let start = Instant::now();
        let mut job = self.build(entry).await;

        let publish = match (&self.publish, job.produced_artifact_path().cloned()) {
            (Some(target), Some(artifact)) if job.status() == JobStatus::Succeeded => {
                let result = target
                    .publisher
                    .publish_for(
                        job.platform(),
                        &target.tag,
                        &self.executable,
                        &artifact,
                        &job.entry.build_target,
                    )
                    .await;
                match result {
                    Ok(published) => PublishOutcome::Uploaded {
                        remote_name: published.remote_name,
                        sha256: published.sha256,
                        size: published.size,
                    },
                    Err(e) => {
                        job.force_failed(&e);
                        PublishOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                }
            }
            _ => PublishOutcome::Skipped,
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let report = JobReport {
            job,
            publish,
            duration_ms,
        };
        obs::emit_job_finished(
            report.job.platform(),
            &report.job.entry.build_target,
            report.succeeded(),
            duration_ms,
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::ReleaseLedger;
    use async_trait::async_trait;
    use launchpad_store::fakes::MemoryReleaseStore;
    use tracing_test::traced_test;

    struct FixedToolchain {
        artifact: Option<PathBuf>,
        delay: Duration,
    }

    #[async_trait]
    impl BuildToolchain for FixedToolchain {
        fn name(&self) -> String {
            "fixed".to_string()
        }

        async fn build(&self, request: &BuildRequest) -> Result<PathBuf, BuildError> {
            tokio::time::sleep(self.delay).await;
            self.artifact.clone().ok_or_else(|| BuildError::Toolchain {
                platform: request.platform.clone(),
                target: request.target.clone(),
                code: 101,
                stderr_tail: "error: could not compile".to_string(),
            })
        }
    }

    fn entry() -> MatrixEntry {
        MatrixEntry::new("linux-x86_64", "ubuntu-latest", "x86_64-unknown-linux-gnu")
    }

    fn executor(artifact: Option<PathBuf>, delay: Duration) -> BuildExecutor {
        BuildExecutor::new(Arc::new(FixedToolchain { artifact, delay }), "tool")
    }

    #[traced_test]
    #[tokio::test]
    async fn successful_build_moves_through_running_cleanly() {
        let job = executor(Some(PathBuf::from("/tmp/tool")), Duration::ZERO)
            .build(entry())
            .await;

        assert_eq!(job.status(), JobStatus::Succeeded);
        assert!(job.error().is_none());
        assert!(logs_contain("Build started"));
        assert!(!logs_contain("Ignoring illegal job transition"));
    }

    #[test]
    fn job_reaches_a_terminal_state_once() {
        let mut job = BuildJob::new(entry());
        job.start().unwrap();
        job.succeed(PathBuf::from("/tmp/tool")).unwrap();

        assert!(job.fail("late").is_err());
        assert!(job.start().is_err());
        assert_eq!(job.status(), JobStatus::Succeeded);
    }

    #[test]
    fn succeed_requires_running() {
        let mut job = BuildJob::new(entry());
        let err = job.succeed(PathBuf::from("/tmp/tool")).unwrap_err();
        assert_eq!(err.from, JobStatus::Pending);
        assert_eq!(err.to, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn failed_build_names_platform_and_publishes_nothing() {
        let store = Arc::new(MemoryReleaseStore::new());
        let publisher = ArtifactPublisher::new(Arc::new(ReleaseLedger::new(store.clone())));
        let report = executor(None, Duration::ZERO)
            .with_publisher(publisher, "v1.0.0")
            .run(entry())
            .await;

        assert_eq!(report.job.status(), JobStatus::Failed);
        assert!(report.job.error().unwrap().contains("linux-x86_64"));
        assert!(report.job.produced_artifact_path().is_none());
        assert_eq!(report.publish, PublishOutcome::Skipped);
        assert_eq!(store.releases_created(), 0);
    }

    #[tokio::test]
    async fn successful_build_publishes_within_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("tool");
        std::fs::write(&bin, b"binary").unwrap();

        let store = Arc::new(MemoryReleaseStore::new());
        let publisher = ArtifactPublisher::new(Arc::new(ReleaseLedger::new(store.clone())));
        let report = executor(Some(bin), Duration::ZERO)
            .with_publisher(publisher, "v1.0.0")
            .run(entry())
            .await;

        assert!(report.succeeded());
        assert!(matches!(
            report.publish,
            PublishOutcome::Uploaded { ref remote_name, .. } if remote_name == "tool-x86_64-unknown-linux-gnu"
        ));
        assert_eq!(
            store.file_bytes("v1.0.0", "tool-x86_64-unknown-linux-gnu"),
            Some(b"binary".to_vec())
        );
    }

    #[tokio::test]
    async fn publish_failure_fails_the_job_but_keeps_the_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("tool");
        std::fs::write(&bin, b"binary").unwrap();

        let store = Arc::new(MemoryReleaseStore::new());
        store.fail_uploads_of("tool-x86_64-unknown-linux-gnu");
        let publisher = ArtifactPublisher::new(Arc::new(ReleaseLedger::new(store)));
        let report = executor(Some(bin.clone()), Duration::ZERO)
            .with_publisher(publisher, "v1.0.0")
            .run(entry())
            .await;

        assert!(!report.succeeded());
        assert_eq!(report.job.status(), JobStatus::Failed);
        assert_eq!(report.job.produced_artifact_path(), Some(&bin));
        assert!(matches!(report.publish, PublishOutcome::Failed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_build_times_out() {
        let report = executor(Some(PathBuf::from("/tmp/tool")), Duration::from_secs(120))
            .with_timeout_secs(5)
            .run(entry())
            .await;

        assert_eq!(report.job.status(), JobStatus::Failed);
        assert!(report.job.error().unwrap().contains("timed out after 5s"));
    }

    #[tokio::test]
    async fn without_publisher_nothing_is_published() {
        let report = executor(Some(PathBuf::from("/tmp/tool")), Duration::ZERO)
            .run(entry())
            .await;
        assert!(report.succeeded());
        assert_eq!(report.publish, PublishOutcome::Skipped);
    }

    #[test]
    fn aborted_report_is_failed() {
        let report = JobReport::aborted(entry(), "task panicked");
        assert!(!report.succeeded());
        assert!(report.job.error().unwrap().contains("task panicked"));
    }
}
