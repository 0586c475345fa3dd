//! Manifest gate: the fail-fast check that completes a release.
//!
//! After every build job is terminal, the gate asserts the manifest exists
//! in the checkout and attaches it to the release this run created. The
//! upload must be acknowledged as exactly one file with the exact name.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use launchpad_core::obs;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::GateError;
use crate::publisher::ReleaseLedger;

/// Gate state machine.
///
/// `NotRun -> Asserting -> (Failed | Attaching) -> (Done | Failed)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    #[default]
    NotRun,
    Asserting,
    Attaching,
    Done,
    Failed,
}

impl GateState {
    pub fn is_terminal(self) -> bool {
        matches!(self, GateState::Done | GateState::Failed)
    }

    pub fn can_move_to(self, next: GateState) -> bool {
        use GateState::*;
        matches!(
            (self, next),
            (NotRun, Asserting)
                | (Asserting, Failed)
                | (Asserting, Attaching)
                | (Attaching, Done)
                | (Attaching, Failed)
        )
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GateState::NotRun => "not_run",
            GateState::Asserting => "asserting",
            GateState::Attaching => "attaching",
            GateState::Done => "done",
            GateState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of checking the checkout for the manifest. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestAssertion {
    pub required_path: PathBuf,
    pub present: bool,
}

impl ManifestAssertion {
    /// Check whether `required_path` is a regular file.
    pub async fn check(required_path: &Path) -> Self {
        let present = tokio::fs::metadata(required_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        Self {
            required_path: required_path.to_path_buf(),
            present,
        }
    }
}

/// What the gate did, for reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateReport {
    pub state: GateState,
    pub manifest: Option<String>,
    pub sha256: Option<String>,
    pub error: Option<String>,
}

impl GateReport {
    pub fn not_run() -> Self {
        Self {
            state: GateState::NotRun,
            manifest: None,
            sha256: None,
            error: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == GateState::Done
    }
}

/// Attaches the manifest to the release for a tag.
pub struct ManifestGate {
    ledger: Arc<ReleaseLedger>,
    checkout: PathBuf,
    manifest_name: String,
    state: GateState,
    tag: String,
}

impl ManifestGate {
    /// `checkout` is the source tree relative manifest paths resolve against;
    /// `manifest_name` is the file name the manifest is uploaded under.
    pub fn new(
        ledger: Arc<ReleaseLedger>,
        checkout: impl Into<PathBuf>,
        manifest_name: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            checkout: checkout.into(),
            manifest_name: manifest_name.into(),
            state: GateState::NotRun,
            tag: String::new(),
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    fn transition(&mut self, next: GateState) -> Result<(), GateError> {
        if !self.state.can_move_to(next) {
            return Err(GateError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        obs::emit_gate_transition(&self.tag, &self.state.to_string(), &next.to_string());
        self.state = next;
        Ok(())
    }

    /// Assert the manifest and attach it to the release at `tag`.
    ///
    /// Returns the sha256 the store acknowledged. Any error leaves the gate
    /// in `Failed`; a second call fails with `IllegalTransition`.
    pub async fn attach(&mut self, tag: &str, required_path: &Path) -> Result<String, GateError> {
        if self.state == GateState::NotRun {
            self.tag = tag.to_string();
        }
        let result = self.assert_and_upload(tag, required_path).await;
        if let Err(e) = &result {
            obs::emit_gate_failed(tag, e);
            // A second attach leaves the earlier terminal state alone.
            if !self.state.is_terminal() {
                self.state = GateState::Failed;
            }
        }
        result
    }

    /// Run [`attach`](Self::attach) and fold the outcome into a report.
    pub async fn report(&mut self, tag: &str, required_path: &Path) -> GateReport {
        let manifest = Some(self.manifest_name.clone());
        match self.attach(tag, required_path).await {
            Ok(sha256) => GateReport {
                state: self.state,
                manifest,
                sha256: Some(sha256),
                error: None,
            },
            Err(e) => GateReport {
                state: self.state,
                manifest,
                sha256: None,
                error: Some(e.to_string()),
            },
        }
    }

    async fn assert_and_upload(&mut self, tag: &str, required_path: &Path) -> Result<String, GateError> {
        self.transition(GateState::Asserting)?;

        let path = self.checkout.join(required_path);
        let assertion = ManifestAssertion::check(&path).await;
        if !assertion.present {
            self.transition(GateState::Failed)?;
            return Err(GateError::ManifestMissing {
                path: assertion.required_path,
            });
        }

        let Some(handle) = self.ledger.get(tag).await else {
            self.transition(GateState::Failed)?;
            return Err(GateError::NoRelease {
                tag: tag.to_string(),
            });
        };

        self.transition(GateState::Attaching)?;
        let name = self.manifest_name.clone();

        let ack = match self
            .ledger
            .store()
            .upload_file(handle.record(), &path, &name)
            .await
        {
            Ok(ack) => ack,
            Err(source) => {
                self.transition(GateState::Failed)?;
                return Err(GateError::Upload { name, source });
            }
        };

        if !ack.is_exact(&name) {
            self.transition(GateState::Failed)?;
            return Err(GateError::ManifestUploadAmbiguous {
                name,
                reported: ack.files,
            });
        }

        handle.record_upload(&name);
        self.transition(GateState::Done)?;
        info!(tag = %tag, manifest = %name, "Manifest attached");
        Ok(ack.sha256)
    }
}
