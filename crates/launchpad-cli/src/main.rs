//! Launchpad - release orchestration CLI
//!
//! The `launchpad` command builds an executable for every platform in the
//! target matrix, publishes the binaries to a draft release, and attaches
//! the required manifest once all builds are done.
//!
//! ## Commands
//!
//! - `run`: run the release pipeline for a git ref
//! - `matrix`: show which platforms a run would build
//! - `verify`: preflight the configuration and manifest without building
//! - `init`: write a starter `launchpad.toml`

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use launchpad_ci::{
    CommandToolchain, GateState, JobReport, JobStatus, ManifestAssertion, Pipeline,
    PipelineReport, PublishOutcome,
};
use launchpad_core::{
    capture_head_sha, tag_at_head, LaunchpadConfig, Trigger, DEFAULT_CONFIG_FILE,
};
use launchpad_store::{ReleaseStore, StoreLocator};
use tracing::{info, warn, Level};

/// Default release store, relative to the checkout.
const DEFAULT_STORE: &str = "dir:target/launchpad/releases";

/// Per-platform target directories live under this checkout-relative root.
const TARGET_ROOT: &str = "target/launchpad/build";

#[derive(Parser)]
#[command(name = "launchpad")]
#[command(version = launchpad_core::VERSION)]
#[command(about = "Build, publish and gate multi-platform releases", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and JSON reports
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the release pipeline for a git ref
    Run {
        /// Triggering ref (`v1.2.3`, `refs/tags/v1.2.3`, a branch...).
        /// Defaults to the tag at HEAD.
        #[arg(long = "ref", env = "GITHUB_REF")]
        git_ref: Option<String>,

        #[command(flatten)]
        paths: PathArgs,

        /// Release store: dir:<path> or github:<owner>/<repo>
        #[arg(long, env = "LAUNCHPAD_STORE", default_value = DEFAULT_STORE)]
        store: String,

        /// Token for the GitHub store
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Override the per-job timeout in seconds (0 disables)
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Override the build program (`cargo`, `cross`, ...)
        #[arg(long)]
        toolchain: Option<String>,

        /// Also write the JSON report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Show the expanded target matrix
    Matrix {
        #[command(flatten)]
        paths: PathArgs,
    },

    /// Validate configuration and check the manifest is present
    Verify {
        #[command(flatten)]
        paths: PathArgs,
    },

    /// Write a starter launchpad.toml
    Init {
        /// Directory to initialize (default: current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Executable name (default: the directory name)
        #[arg(long)]
        executable: Option<String>,
    },
}

#[derive(clap::Args, Clone)]
struct PathArgs {
    /// Source checkout to build from
    #[arg(long, default_value = ".")]
    checkout: PathBuf,

    /// Config file (default: <checkout>/launchpad.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl PathArgs {
    fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| self.checkout.join(DEFAULT_CONFIG_FILE))
    }

    fn load(&self) -> Result<LaunchpadConfig> {
        let path = self.config_path();
        LaunchpadConfig::load(&path).with_context(|| format!("Failed to load {}", path.display()))
    }
}

struct RunArgs {
    git_ref: Option<String>,
    paths: PathArgs,
    store: String,
    token: Option<String>,
    timeout_secs: Option<u64>,
    toolchain: Option<String>,
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    launchpad_core::init_tracing(cli.json, level);

    let result = match cli.command {
        Commands::Run {
            git_ref,
            paths,
            store,
            token,
            timeout_secs,
            toolchain,
            report,
        } => {
            let args = RunArgs {
                git_ref,
                paths,
                store,
                token,
                timeout_secs,
                toolchain,
                report,
            };
            cmd_run(args, cli.json).await
        }
        Commands::Matrix { paths } => cmd_matrix(&paths, cli.json),
        Commands::Verify { paths } => cmd_verify(&paths).await,
        Commands::Init { path, executable } => cmd_init(&path, executable.as_deref()),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// The ref to run for: explicit, else the tag at HEAD, else `HEAD`.
fn resolve_ref(explicit: Option<&str>, checkout: &Path) -> String {
    if let Some(r) = explicit.map(str::trim).filter(|r| !r.is_empty()) {
        return r.to_string();
    }
    match tag_at_head(checkout) {
        Ok(Some(tag)) => tag,
        Ok(None) => "HEAD".to_string(),
        Err(e) => {
            warn!(error = %e, "Could not read tags; treating run as non-release");
            "HEAD".to_string()
        }
    }
}

/// Open the store, resolving relative directory stores against the checkout.
fn open_store(spec: &str, token: Option<&str>, checkout: &Path) -> Result<Arc<dyn ReleaseStore>> {
    let locator = match spec.parse::<StoreLocator>()? {
        StoreLocator::Dir(path) if path.is_relative() => StoreLocator::Dir(checkout.join(path)),
        other => other,
    };
    Ok(locator.open(token)?)
}

async fn execute_run(args: &RunArgs) -> Result<PipelineReport> {
    // The build program runs inside the checkout; every path handed to it
    // must survive that change of directory.
    let checkout = args
        .paths
        .checkout
        .canonicalize()
        .with_context(|| format!("checkout {} not found", args.paths.checkout.display()))?;
    let checkout = &checkout;
    let mut config = args.paths.load()?;
    if let Some(secs) = args.timeout_secs {
        config.timeout_secs = secs;
    }
    if let Some(program) = &args.toolchain {
        config.toolchain.program = program.clone();
    }

    let trigger = Trigger::from_ref(&resolve_ref(args.git_ref.as_deref(), checkout));
    let store = open_store(&args.store, args.token.as_deref(), checkout)?;
    let toolchain = CommandToolchain::new(&config.toolchain, checkout.clone(), checkout.join(TARGET_ROOT));

    info!(
        git_ref = %trigger.git_ref(),
        release = trigger.is_release(),
        store = %store.describe(),
        "Starting release run"
    );

    let mut pipeline = Pipeline::new(config, Arc::new(toolchain), store, checkout.clone());
    match capture_head_sha(checkout) {
        Ok(sha) => pipeline = pipeline.with_git_sha(sha),
        Err(e) => warn!(error = %e, "Could not determine HEAD commit"),
    }

    let report = pipeline.run(&trigger).await?;

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }
    Ok(report)
}

/// Run the release pipeline; `Ok(false)` when the run failed
async fn cmd_run(args: RunArgs, json: bool) -> Result<bool> {
    let report = execute_run(&args).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_summary(&report));
    }

    Ok(report.success)
}

fn job_line(job: &JobReport) -> String {
    let mark = if job.succeeded() { "✓" } else { "✗" };
    let entry = &job.job.entry;
    let detail = match (&job.publish, job.job.status()) {
        (PublishOutcome::Uploaded { remote_name, .. }, _) => format!("-> {}", remote_name),
        (PublishOutcome::Failed { error }, _) => format!("publish failed: {}", error),
        (PublishOutcome::Skipped, JobStatus::Failed) => {
            job.job.error().unwrap_or("failed").to_string()
        }
        (PublishOutcome::Skipped, _) => "built".to_string(),
    };
    format!(
        "  {} {} [{}] ({}ms) {}\n",
        mark, entry.platform_name, entry.build_target, job.duration_ms, detail
    )
}

/// Human-readable report for the terminal.
fn render_summary(report: &PipelineReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("Run ID: {}\n", report.run_id));
    out.push_str(&format!("Ref: {}\n", report.git_ref));
    match &report.release_tag {
        Some(tag) => out.push_str(&format!("Release: {} (draft)\n", tag)),
        None => out.push_str("Release: none (not a release tag; nothing published)\n"),
    }
    out.push('\n');

    for job in &report.jobs {
        out.push_str(&job_line(job));
    }
    for platform in &report.skipped {
        out.push_str(&format!("  - {} (inactive)\n", platform));
    }
    out.push('\n');

    let gate = match report.gate.state {
        GateState::Done => "✓ manifest attached".to_string(),
        GateState::NotRun => "not run".to_string(),
        _ => format!(
            "✗ {}",
            report.gate.error.as_deref().unwrap_or("manifest gate failed")
        ),
    };
    out.push_str(&format!("Gate: {}\n", gate));

    if !report.release_files().is_empty() {
        out.push_str("Release files:\n");
        for file in report.release_files() {
            out.push_str(&format!("  {}\n", file));
        }
    }

    out.push_str(&format!(
        "Summary: {}/{} jobs succeeded in {}ms\n",
        report.succeeded_count(),
        report.jobs.len(),
        report.duration_ms
    ));
    out.push_str(if report.success {
        "✓ Release run passed\n"
    } else {
        "✗ Release run failed\n"
    });
    out
}

/// Print the expanded matrix
fn cmd_matrix(paths: &PathArgs, json: bool) -> Result<bool> {
    let config = paths.load()?;
    let matrix = config.target_matrix();
    let active = matrix.expand()?;

    if json {
        let view = serde_json::json!({
            "active": active,
            "skipped": matrix.skipped().collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(true);
    }

    println!("Executable: {}", config.executable);
    println!("Jobs:");
    for entry in &active {
        println!(
            "  {:<20} {:<18} {}",
            entry.platform_name, entry.execution_environment, entry.build_target
        );
    }
    let skipped: Vec<_> = matrix.skipped().collect();
    if !skipped.is_empty() {
        println!("Inactive:");
        for entry in skipped {
            println!("  {:<20} {}", entry.platform_name, entry.build_target);
        }
    }
    Ok(true)
}

/// Preflight: configuration and manifest
async fn cmd_verify(paths: &PathArgs) -> Result<bool> {
    let config = paths.load()?;
    let jobs = config.target_matrix().expand()?.len();
    println!("✓ Configuration valid ({} active platform(s))", jobs);

    let assertion = ManifestAssertion::check(&paths.checkout.join(&config.manifest)).await;
    if !assertion.present {
        println!("✗ Manifest missing: {}", assertion.required_path.display());
        return Ok(false);
    }
    println!("✓ Manifest present: {}", assertion.required_path.display());
    Ok(true)
}

/// Write a starter configuration
fn cmd_init(path: &Path, executable: Option<&str>) -> Result<bool> {
    let target = path.join(DEFAULT_CONFIG_FILE);
    if target.exists() {
        bail!("{} already exists", target.display());
    }

    let name = match executable {
        Some(name) => name.to_string(),
        None => {
            let dir = path
                .canonicalize()
                .with_context(|| format!("Failed to resolve {}", path.display()))?;
            dir.file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .context("Cannot derive an executable name; pass --executable")?
        }
    };

    let text = LaunchpadConfig::starter_toml(&name);
    // Never write a config the loader would reject.
    LaunchpadConfig::parse(&text, &target)?;
    std::fs::write(&target, text)
        .with_context(|| format!("Failed to write {}", target.display()))?;

    println!("✓ Wrote {}", target.display());
    Ok(true)
}
