//! Trigger events and release-tag recognition.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const TAG_REF_PREFIX: &str = "refs/tags/";

fn release_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^v(0|[1-9][0-9]*)\.(0|[1-9][0-9]*)\.(0|[1-9][0-9]*)(-[0-9A-Za-z-]+(\.[0-9A-Za-z-]+)*)?(\+[0-9A-Za-z-]+(\.[0-9A-Za-z-]+)*)?$",
        )
        .unwrap_or_else(|e| panic!("release tag pattern must compile: {e}"))
    })
}

/// Whether `tag` looks like `v<major>.<minor>.<patch>[-pre][+build]`.
pub fn is_release_tag(tag: &str) -> bool {
    release_tag_pattern().is_match(tag)
}

/// The event that started a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// A version tag: builds are published and the manifest gate runs.
    Release { git_ref: String, tag: String },
    /// Anything else: builds run, nothing is published.
    Other { git_ref: String },
}

impl Trigger {
    /// Classify a ref string. Accepts bare tags (`v1.2.3`) and full tag
    /// refs (`refs/tags/v1.2.3`); branch refs never count as releases.
    pub fn from_ref(git_ref: &str) -> Self {
        let git_ref = git_ref.trim();
        let candidate = git_ref.strip_prefix(TAG_REF_PREFIX).unwrap_or(git_ref);
        if !candidate.starts_with("refs/") && is_release_tag(candidate) {
            Trigger::Release {
                git_ref: git_ref.to_string(),
                tag: candidate.to_string(),
            }
        } else {
            Trigger::Other {
                git_ref: git_ref.to_string(),
            }
        }
    }

    pub fn git_ref(&self) -> &str {
        match self {
            Trigger::Release { git_ref, .. } | Trigger::Other { git_ref } => git_ref,
        }
    }

    /// The release tag, when this trigger is a release.
    pub fn release_tag(&self) -> Option<&str> {
        match self {
            Trigger::Release { tag, .. } => Some(tag),
            Trigger::Other { .. } => None,
        }
    }

    pub fn is_release(&self) -> bool {
        matches!(self, Trigger::Release { .. })
    }
}
