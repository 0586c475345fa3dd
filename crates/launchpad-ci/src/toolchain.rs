//! External build toolchain invocation.
//!
//! The engine does not compile anything itself: a [`BuildToolchain`] turns a
//! [`BuildRequest`] into a path to a stripped release binary.
//! [`CommandToolchain`] drives `cargo build` (or a drop-in such as `cross`)
//! with a private target directory per platform.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use launchpad_core::{is_windows_target, MatrixEntry, ToolchainConfig};
use tokio::process::Command;
use tracing::debug;

use crate::error::BuildError;

/// Lines of stderr kept in a toolchain failure.
const STDERR_TAIL_LINES: usize = 20;

/// What one build job asks of the toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub platform: String,
    pub target: String,
    pub environment: String,
    pub executable: String,
    pub release: bool,
    pub strip: bool,
}

impl BuildRequest {
    /// Release-mode, stripped build of `executable` for `entry`.
    pub fn for_entry(entry: &MatrixEntry, executable: &str) -> Self {
        Self {
            platform: entry.platform_name.clone(),
            target: entry.build_target.clone(),
            environment: entry.execution_environment.clone(),
            executable: executable.to_string(),
            release: true,
            strip: true,
        }
    }

    fn profile_dir(&self) -> &'static str {
        if self.release {
            "release"
        } else {
            "debug"
        }
    }
}

/// Produces a binary for one target triple.
#[async_trait]
pub trait BuildToolchain: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> String;

    /// Build and return the path of the finished artifact.
    async fn build(&self, request: &BuildRequest) -> Result<PathBuf, BuildError>;
}

/// Runs a cargo-compatible build command in the checkout.
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    program: String,
    extra_args: Vec<String>,
    checkout: PathBuf,
    target_root: PathBuf,
}

impl CommandToolchain {
    /// Build in `checkout`, with per-platform target dirs under `target_root`.
    ///
    /// Relative paths are anchored to the current directory here: the build
    /// program runs inside the checkout and would otherwise resolve
    /// `--target-dir` against it a second time.
    pub fn new(config: &ToolchainConfig, checkout: impl Into<PathBuf>, target_root: impl Into<PathBuf>) -> Self {
        Self {
            program: config.program.clone(),
            extra_args: config.args.clone(),
            checkout: anchored(checkout.into()),
            target_root: anchored(target_root.into()),
        }
    }

    /// Target directory owned by a single platform's job.
    pub fn target_dir(&self, request: &BuildRequest) -> PathBuf {
        self.target_root.join(&request.platform)
    }

    /// Where the toolchain leaves the binary for `request`.
    pub fn artifact_path(&self, request: &BuildRequest) -> PathBuf {
        let file = if is_windows_target(&request.target) {
            format!("{}.exe", request.executable)
        } else {
            request.executable.clone()
        };
        self.target_dir(request)
            .join(&request.target)
            .join(request.profile_dir())
            .join(file)
    }

    /// Arguments passed to the build program.
    pub fn arguments(&self, request: &BuildRequest) -> Vec<String> {
        let mut args = vec!["build".to_string()];
        if request.release {
            args.push("--release".to_string());
        }
        args.extend([
            "--target".to_string(),
            request.target.clone(),
            "--bin".to_string(),
            request.executable.clone(),
            "--target-dir".to_string(),
            self.target_dir(request).to_string_lossy().into_owned(),
        ]);
        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// Environment for the build program. Stripping goes through cargo's
    /// profile override so it applies to whichever profile is built.
    pub fn environment(&self, request: &BuildRequest) -> Vec<(String, String)> {
        let mut env = vec![
            ("LAUNCHPAD_PLATFORM".to_string(), request.platform.clone()),
            ("LAUNCHPAD_RUNS_ON".to_string(), request.environment.clone()),
        ];
        if request.strip {
            let profile = if request.release { "RELEASE" } else { "DEV" };
            env.push((format!("CARGO_PROFILE_{}_STRIP", profile), "symbols".to_string()));
        }
        env
    }
}

fn anchored(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

#[async_trait]
impl BuildToolchain for CommandToolchain {
    fn name(&self) -> String {
        self.program.clone()
    }

    async fn build(&self, request: &BuildRequest) -> Result<PathBuf, BuildError> {
        let args = self.arguments(request);
        debug!(platform = %request.platform, program = %self.program, ?args, "Invoking toolchain");

        // kill_on_drop: a timed-out or cancelled job takes its build down with it.
        let output = Command::new(&self.program)
            .args(&args)
            .envs(self.environment(request))
            .current_dir(&self.checkout)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| BuildError::Spawn {
                platform: request.platform.clone(),
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(BuildError::Toolchain {
                platform: request.platform.clone(),
                target: request.target.clone(),
                code: output.status.code().unwrap_or(-1),
                stderr_tail: stderr_tail(&output.stderr),
            });
        }

        let artifact = self.artifact_path(request);
        if !is_file(&artifact).await {
            return Err(BuildError::ArtifactMissing {
                platform: request.platform.clone(),
                path: artifact,
            });
        }
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(target: &str) -> BuildRequest {
        BuildRequest::for_entry(
            &MatrixEntry::new("plat", "ubuntu-latest", target),
            "tool",
        )
    }

    fn toolchain(program: &str, root: &Path) -> CommandToolchain {
        CommandToolchain::new(
            &ToolchainConfig {
                program: program.to_string(),
                args: vec!["--locked".to_string()],
            },
            root,
            root.join("target"),
        )
    }

    #[test]
    fn requests_are_release_and_stripped() {
        let req = request("x86_64-unknown-linux-gnu");
        assert!(req.release);
        assert!(req.strip);
    }

    #[test]
    fn arguments_pin_target_binary_and_private_target_dir() {
        let tc = toolchain("cargo", Path::new("/work"));
        let args = tc.arguments(&request("aarch64-apple-darwin"));

        assert_eq!(&args[..2], &["build", "--release"]);
        let target_at = args.iter().position(|a| a == "--target").unwrap();
        assert_eq!(args[target_at + 1], "aarch64-apple-darwin");
        let bin_at = args.iter().position(|a| a == "--bin").unwrap();
        assert_eq!(args[bin_at + 1], "tool");
        assert!(args.contains(&"/work/target/plat".to_string()));
        assert_eq!(args.last().unwrap(), "--locked");
    }

    #[test]
    fn strip_is_requested_through_profile_env() {
        let tc = toolchain("cargo", Path::new("/work"));
        let env = tc.environment(&request("x86_64-unknown-linux-gnu"));
        assert!(env.contains(&("CARGO_PROFILE_RELEASE_STRIP".to_string(), "symbols".to_string())));
        assert!(env.contains(&("LAUNCHPAD_RUNS_ON".to_string(), "ubuntu-latest".to_string())));
    }

    #[test]
    fn windows_artifacts_get_exe_suffix() {
        let tc = toolchain("cargo", Path::new("/work"));
        assert_eq!(
            tc.artifact_path(&request("x86_64-pc-windows-msvc")),
            PathBuf::from("/work/target/plat/x86_64-pc-windows-msvc/release/tool.exe")
        );
        assert_eq!(
            tc.artifact_path(&request("x86_64-unknown-linux-gnu")),
            PathBuf::from("/work/target/plat/x86_64-unknown-linux-gnu/release/tool")
        );
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let text: String = (0..50).map(|i| format!("line {}\n", i)).collect();
        let tail = stderr_tail(text.as_bytes());
        assert!(tail.starts_with("line 30"));
        assert!(tail.ends_with("line 49"));
    }

    #[tokio::test]
    async fn failing_program_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let err = toolchain("false", dir.path())
            .build(&request("x86_64-unknown-linux-gnu"))
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Toolchain { code, .. } if code != 0));
    }

    #[tokio::test]
    async fn successful_program_without_output_is_artifact_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = toolchain("true", dir.path())
            .build(&request("x86_64-unknown-linux-gnu"))
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::ArtifactMissing { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = toolchain("launchpad-no-such-toolchain", dir.path())
            .build(&request("x86_64-unknown-linux-gnu"))
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Spawn { .. }));
    }

    /// Stand-in for cargo: writes `<target-dir>/<target>/release/<bin>`
    /// relative to its working directory, the way cargo does.
    const FAKE_CARGO: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    --target) target="$2"; shift 2 ;;
    --bin) bin="$2"; shift 2 ;;
    --target-dir) dir="$2"; shift 2 ;;
    *) shift ;;
  esac
done
mkdir -p "$dir/$target/release"
printf 'binary' > "$dir/$target/release/$bin"
"#;

    #[tokio::test]
    async fn nested_relative_checkout_finds_built_artifact() {
        let scratch = tempfile::Builder::new()
            .prefix("launchpad-toolchain")
            .tempdir_in(".")
            .unwrap();
        let absolute = scratch.path().join("sub").join("proj");
        std::fs::create_dir_all(&absolute).unwrap();
        // `sh build <args>` runs the checkout's `build` script with the
        // toolchain arguments, so the script needs no exec bit.
        std::fs::write(absolute.join("build"), FAKE_CARGO).unwrap();

        let cwd = std::env::current_dir().unwrap();
        let relative = absolute
            .canonicalize()
            .unwrap()
            .strip_prefix(cwd.canonicalize().unwrap())
            .unwrap()
            .to_path_buf();
        assert!(relative.is_relative());
        assert!(relative.components().count() >= 3);

        let tc = CommandToolchain::new(
            &ToolchainConfig {
                program: "sh".to_string(),
                args: Vec::new(),
            },
            relative.clone(),
            relative.join("target").join("launchpad"),
        );
        let artifact = tc
            .build(&request("x86_64-unknown-linux-gnu"))
            .await
            .unwrap();

        assert!(artifact.is_absolute());
        assert_eq!(std::fs::read(&artifact).unwrap(), b"binary");
        assert!(artifact
            .canonicalize()
            .unwrap()
            .starts_with(absolute.canonicalize().unwrap()));
    }

    #[test]
    fn relative_paths_are_anchored_to_current_dir() {
        let tc = toolchain("cargo", Path::new("sub/proj"));
        let dir = tc.target_dir(&request("x86_64-unknown-linux-gnu"));
        assert!(dir.is_absolute());
        assert!(dir.ends_with("sub/proj/target/plat"));
    }
}

