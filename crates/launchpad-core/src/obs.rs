//! Structured observability hooks for the release run lifecycle.
//!
//! - Run-scoped tracing span via the `RunSpan` RAII guard
//! - Emission functions for lifecycle events: run start/finish, job finish,
//!   artifact publish, gate transitions
//!
//! Every event carries an `event` field so JSON log consumers can filter on
//! it. Set `LAUNCHPAD_LOG` to adjust verbosity.

use tracing::{error, info, warn};

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// ```ignore
/// let _span = RunSpan::enter("3f1c...", "refs/tags/v1.2.3");
/// // every event below is tagged with run_id and git_ref
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str, git_ref: &str) -> Self {
        Self {
            _span: Self::span(run_id, git_ref).entered(),
        }
    }

    /// The run span itself, for instrumenting futures that cross `.await`.
    pub fn span(run_id: &str, git_ref: &str) -> tracing::Span {
        tracing::info_span!("launchpad.run", run_id = %run_id, git_ref = %git_ref)
    }
}

/// Emit event: run started with the number of jobs it will spawn.
pub fn emit_run_started(run_id: &str, git_ref: &str, release_tag: Option<&str>, jobs: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        git_ref = %git_ref,
        release_tag = release_tag.unwrap_or("-"),
        jobs = jobs,
    );
}

/// Emit event: a matrix entry was skipped because it is inactive.
pub fn emit_job_skipped(platform: &str) {
    info!(event = "job.skipped", platform = %platform);
}

/// Emit event: a build job reached its terminal state.
pub fn emit_job_finished(platform: &str, target: &str, succeeded: bool, duration_ms: u64) {
    if succeeded {
        info!(event = "job.finished", platform = %platform, target = %target, succeeded = succeeded, duration_ms = duration_ms);
    } else {
        warn!(event = "job.finished", platform = %platform, target = %target, succeeded = succeeded, duration_ms = duration_ms);
    }
}

/// Emit event: an artifact landed in a release.
pub fn emit_artifact_published(platform: &str, tag: &str, remote_name: &str, sha256: &str) {
    info!(
        event = "artifact.published",
        platform = %platform,
        tag = %tag,
        remote_name = %remote_name,
        sha256 = %sha256,
    );
}

/// Emit event: an artifact upload failed (job-local, not retried).
pub fn emit_publish_failed(platform: &str, tag: &str, error: &dyn std::fmt::Display) {
    warn!(event = "artifact.publish_failed", platform = %platform, tag = %tag, error = %error);
}

/// Emit event: the manifest gate moved between states.
pub fn emit_gate_transition(tag: &str, from: &str, to: &str) {
    info!(event = "gate.transition", tag = %tag, from = %from, to = %to);
}

/// Emit event: the manifest gate stopped the release.
pub fn emit_gate_failed(tag: &str, error: &dyn std::fmt::Display) {
    error!(event = "gate.failed", tag = %tag, error = %error);
}

/// Emit event: run finished with overall outcome.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, succeeded: usize, failed: usize, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        succeeded = succeeded,
        failed = failed,
        success = success,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let _span = RunSpan::enter("test-run-id", "refs/tags/v1.0.0");
        emit_run_started("test-run-id", "refs/tags/v1.0.0", Some("v1.0.0"), 2);
        emit_job_finished("linux-x86_64", "x86_64-unknown-linux-gnu", true, 10);
    }
}
