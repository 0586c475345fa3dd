//! Store locator strings (`dir:<path>`, `github:<owner>/<repo>`).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::dir_store::DirReleaseStore;
use crate::error::StoreError;
use crate::github::{GitHubConfig, GitHubReleaseStore};
use crate::storage_traits::{ReleaseStore, StoreResult};

/// Where releases are published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocator {
    Dir(PathBuf),
    GitHub { owner: String, repo: String },
}

impl FromStr for StoreLocator {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| StoreError::InvalidSpec {
            spec: s.to_string(),
            reason: reason.to_string(),
        };

        match s.split_once(':') {
            Some(("dir", path)) if !path.is_empty() => Ok(StoreLocator::Dir(PathBuf::from(path))),
            Some(("dir", _)) => Err(invalid("missing directory path")),
            Some(("github", slug)) => match slug.split_once('/') {
                Some((owner, repo))
                    if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') =>
                {
                    Ok(StoreLocator::GitHub {
                        owner: owner.to_string(),
                        repo: repo.to_string(),
                    })
                }
                _ => Err(invalid("expected github:<owner>/<repo>")),
            },
            _ => Err(invalid("expected dir:<path> or github:<owner>/<repo>")),
        }
    }
}

impl fmt::Display for StoreLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreLocator::Dir(path) => write!(f, "dir:{}", path.display()),
            StoreLocator::GitHub { owner, repo } => write!(f, "github:{}/{}", owner, repo),
        }
    }
}

impl StoreLocator {
    /// Open the store this locator names. GitHub requires a token.
    pub fn open(&self, token: Option<&str>) -> StoreResult<Arc<dyn ReleaseStore>> {
        match self {
            StoreLocator::Dir(path) => Ok(Arc::new(DirReleaseStore::new(path.clone()))),
            StoreLocator::GitHub { owner, repo } => {
                let token = token.filter(|t| !t.is_empty()).ok_or_else(|| {
                    StoreError::InvalidSpec {
                        spec: self.to_string(),
                        reason: "a GitHub token is required (GITHUB_TOKEN)".to_string(),
                    }
                })?;
                let store = GitHubReleaseStore::new(GitHubConfig::new(
                    owner.clone(),
                    repo.clone(),
                    token,
                ))?;
                Ok(Arc::new(store))
            }
        }
    }
}
