//! Launchpad CI - release pipeline execution
//!
//! Provides the release orchestrator that:
//! - Builds one artifact per active matrix entry, in parallel
//! - Publishes each artifact into a draft release as soon as it is built
//! - Attaches the required manifest once every job has finished

pub mod error;
pub mod executor;
pub mod gate;
pub mod pipeline;
pub mod plan;
pub mod publisher;
pub mod toolchain;

// Re-export key types
pub use error::{BuildError, GateError, JobStateError, PipelineError, PublishError};
pub use executor::{BuildExecutor, BuildJob, JobReport, JobStatus, PublishOutcome};
pub use gate::{GateReport, GateState, ManifestAssertion, ManifestGate};
pub use pipeline::{gate_allowed, Pipeline, PipelineReport};
pub use plan::RunPlan;
pub use publisher::{
    artifact_file_name, ArtifactPublisher, Published, ReleaseHandle, ReleaseLedger,
    ReleaseSummary,
};
pub use toolchain::{BuildRequest, BuildToolchain, CommandToolchain};
