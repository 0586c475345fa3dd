//! Release pipeline orchestration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use launchpad_core::{obs, GatePolicy, LaunchpadConfig, RunSpan, Trigger};
use launchpad_store::ReleaseStore;
use serde::{Deserialize, Serialize};
use tracing::{info, Instrument};

use crate::error::PipelineError;
use crate::executor::{BuildExecutor, JobReport};
use crate::gate::{GateReport, ManifestGate};
use crate::plan::RunPlan;
use crate::publisher::{ArtifactPublisher, ReleaseLedger, ReleaseSummary};
use crate::toolchain::BuildToolchain;

/// Result of a complete release run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub git_ref: String,
    pub release_tag: Option<String>,
    pub git_sha: Option<String>,
    pub matrix_digest: String,

    /// Inactive platforms, never built.
    pub skipped: Vec<String>,

    /// One report per active entry, in configuration order.
    pub jobs: Vec<JobReport>,

    pub gate: GateReport,

    /// The release this run published into, if any.
    pub release: Option<ReleaseSummary>,

    /// Every job succeeded and, for releases, the gate reached Done.
    pub success: bool,

    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl PipelineReport {
    /// Number of jobs that built and published.
    pub fn succeeded_count(&self) -> usize {
        self.jobs.iter().filter(|j| j.succeeded()).count()
    }

    /// Number of jobs that failed to build or publish.
    pub fn failed_count(&self) -> usize {
        self.jobs.iter().filter(|j| !j.succeeded()).count()
    }

    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }

    /// Files attached to the release, empty when nothing was published.
    pub fn release_files(&self) -> Vec<String> {
        self.release
            .as_ref()
            .map(|r| r.files.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Whether `policy` lets the gate run given this run's job outcomes.
pub fn gate_allowed(policy: GatePolicy, jobs: &[JobReport]) -> bool {
    match policy {
        GatePolicy::AnySucceeded => jobs.iter().any(JobReport::succeeded),
        GatePolicy::AllSucceeded => !jobs.is_empty() && jobs.iter().all(JobReport::succeeded),
    }
}

/// Release pipeline controller.
///
/// Fans out one build job per active matrix entry, joins them all, then
/// runs the manifest gate once for release triggers.
pub struct Pipeline {
    config: LaunchpadConfig,
    toolchain: Arc<dyn BuildToolchain>,
    store: Arc<dyn ReleaseStore>,
    checkout: PathBuf,
    git_sha: Option<String>,
}

impl Pipeline {
    pub fn new(
        config: LaunchpadConfig,
        toolchain: Arc<dyn BuildToolchain>,
        store: Arc<dyn ReleaseStore>,
        checkout: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            toolchain,
            store,
            checkout: checkout.into(),
            git_sha: None,
        }
    }

    /// Record the commit being released in the report.
    pub fn with_git_sha(mut self, sha: impl Into<String>) -> Self {
        self.git_sha = Some(sha.into());
        self
    }

    pub fn config(&self) -> &LaunchpadConfig {
        &self.config
    }

    pub fn checkout(&self) -> &Path {
        &self.checkout
    }

    /// Execute a run for `trigger`.
    ///
    /// Only configuration problems are returned as `Err`; build, publish
    /// and gate failures are recorded in the report.
    pub async fn run(&self, trigger: &Trigger) -> Result<PipelineReport, PipelineError> {
        let plan = RunPlan::new(
            &self.config,
            trigger.clone(),
            self.checkout.clone(),
            self.git_sha.clone(),
        )?;
        let span = RunSpan::span(&plan.run_id.to_string(), trigger.git_ref());
        Ok(self.execute(plan).instrument(span).await)
    }

    async fn execute(&self, plan: RunPlan) -> PipelineReport {
        let start = Instant::now();
        let run_id = plan.run_id.to_string();
        let tag = plan.release_tag().map(str::to_string);

        obs::emit_run_started(&run_id, plan.trigger.git_ref(), tag.as_deref(), plan.jobs.len());
        for platform in &plan.skipped {
            obs::emit_job_skipped(platform);
        }

        // A fresh ledger per run: only releases resolved here count for the gate.
        let ledger = Arc::new(ReleaseLedger::new(self.store.clone()));
        let mut executor = BuildExecutor::new(self.toolchain.clone(), self.config.executable.clone())
            .with_timeout_secs(self.config.timeout_secs);
        if let Some(tag) = &tag {
            executor = executor.with_publisher(ArtifactPublisher::new(ledger.clone()), tag.clone());
        } else {
            info!(git_ref = %plan.trigger.git_ref(), "Not a release ref; artifacts will not be published");
        }

        let handles: Vec<_> = plan
            .jobs
            .iter()
            .cloned()
            .map(|entry| {
                let executor = executor.clone();
                tokio::spawn(async move { executor.run(entry).await }.in_current_span())
            })
            .collect();

        // Barrier: the gate only ever sees terminal jobs.
        let jobs: Vec<JobReport> = join_all(handles)
            .await
            .into_iter()
            .zip(plan.jobs.iter())
            .map(|(joined, entry)| {
                joined.unwrap_or_else(|e| {
                    let reason = if e.is_panic() { "task panicked" } else { "task cancelled" };
                    JobReport::aborted(entry.clone(), reason)
                })
            })
            .collect();

        let gate = match &tag {
            Some(tag) if gate_allowed(self.config.gate_policy, &jobs) => {
                let mut gate = ManifestGate::new(
                    ledger.clone(),
                    self.checkout.clone(),
                    self.config.manifest_file_name(),
                );
                gate.report(tag, Path::new(&self.config.manifest)).await
            }
            Some(tag) => {
                info!(tag = %tag, policy = ?self.config.gate_policy, "Gate policy not met; manifest not attached");
                GateReport::not_run()
            }
            None => GateReport::not_run(),
        };

        let release = match &tag {
            Some(tag) => ledger.get(tag).await.as_ref().map(ReleaseSummary::from),
            None => None,
        };

        let all_jobs_ok = jobs.iter().all(JobReport::succeeded);
        let success = all_jobs_ok && (tag.is_none() || gate.is_done());
        let duration_ms = start.elapsed().as_millis() as u64;

        let report = PipelineReport {
            run_id,
            git_ref: plan.trigger.git_ref().to_string(),
            release_tag: tag,
            git_sha: plan.git_sha,
            matrix_digest: plan.matrix_digest,
            skipped: plan.skipped,
            jobs,
            gate,
            release,
            success,
            started_at: plan.started_at,
            duration_ms,
        };
        obs::emit_run_finished(
            &report.run_id,
            duration_ms,
            report.succeeded_count(),
            report.failed_count(),
            success,
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{BuildJob, PublishOutcome};
    use launchpad_core::MatrixEntry;

    fn report(ok: bool) -> JobReport {
        let mut job = BuildJob::new(MatrixEntry::new("p", "r", "t"));
        job.start().unwrap();
        if ok {
            job.succeed(PathBuf::from("/tmp/p")).unwrap();
        } else {
            job.fail("boom").unwrap();
        }
        JobReport {
            job,
            publish: PublishOutcome::Skipped,
            duration_ms: 1,
        }
    }

    #[test]
    fn any_succeeded_needs_one_success() {
        assert!(gate_allowed(GatePolicy::AnySucceeded, &[report(false), report(true)]));
        assert!(!gate_allowed(GatePolicy::AnySucceeded, &[report(false), report(false)]));
    }

    #[test]
    fn all_succeeded_needs_every_success() {
        assert!(gate_allowed(GatePolicy::AllSucceeded, &[report(true), report(true)]));
        assert!(!gate_allowed(GatePolicy::AllSucceeded, &[report(true), report(false)]));
        assert!(!gate_allowed(GatePolicy::AllSucceeded, &[]));
    }
}
