//! Git queries against the checkout (read-only).

use std::path::Path;
use std::process::Command;

use crate::domain::GitError;

/// Capture the HEAD commit SHA from a git repository.
pub fn capture_head_sha(repo_dir: &Path) -> Result<String, GitError> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo_dir)
        .output()
        .map_err(|e| GitError(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GitError(format!("git rev-parse HEAD failed: {stderr}")));
    }

    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if sha.is_empty() {
        return Err(GitError("git rev-parse HEAD returned empty output".to_string()));
    }

    Ok(sha)
}

/// The tag pointing exactly at HEAD, if any.
///
/// Used as the trigger ref when none is passed explicitly. A HEAD without a
/// tag is `Ok(None)`; only a failure to run git is an error.
pub fn tag_at_head(repo_dir: &Path) -> Result<Option<String>, GitError> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--exact-match", "HEAD"])
        .current_dir(repo_dir)
        .output()
        .map_err(|e| GitError(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        return Ok(None);
    }
    let tag = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok((!tag.is_empty()).then_some(tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["commit", "--allow-empty", "-m", "initial"]);
        dir
    }

    #[test]
    fn capture_head_sha_returns_40_hex_chars() {
        let repo = make_git_repo();
        let sha = capture_head_sha(repo.path()).unwrap();
        assert_eq!(sha.len(), 40, "SHA should be 40 hex chars, got: {sha}");
        assert!(sha.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn capture_head_sha_fails_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(capture_head_sha(dir.path()).is_err());
    }

    #[test]
    fn tag_at_head_finds_lightweight_tag() {
        let repo = make_git_repo();
        assert_eq!(tag_at_head(repo.path()).unwrap(), None);

        run_git(repo.path(), &["tag", "v1.2.3"]);
        assert_eq!(tag_at_head(repo.path()).unwrap(), Some("v1.2.3".to_string()));
    }
}
