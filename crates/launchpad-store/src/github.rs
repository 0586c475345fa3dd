//! GitHub Releases backend.
//!
//! Talks to the GitHub REST API with `reqwest`. Draft releases are not
//! addressable through `/releases/tags/{tag}`, so lookup walks the release
//! list instead. Asset names are unique per release on GitHub, so an upload
//! of an existing name first deletes the old asset.

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::storage_traits::*;

const DEFAULT_API_BASE: &str = "https://api.github.com";
const DEFAULT_UPLOAD_BASE: &str = "https://uploads.github.com";
const PER_PAGE: usize = 100;

/// Connection settings for a GitHub repository's releases.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub owner: String,
    pub repo: String,
    pub token: String,
    pub api_base: String,
    pub upload_base: String,
}

impl GitHubConfig {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            token: token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            upload_base: DEFAULT_UPLOAD_BASE.to_string(),
        }
    }

    /// Point at a GitHub Enterprise (or test) server.
    pub fn with_bases(mut self, api_base: impl Into<String>, upload_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self.upload_base = upload_base.into().trim_end_matches('/').to_string();
        self
    }

    fn repo_url(&self) -> String {
        format!("{}/repos/{}/{}", self.api_base, self.owner, self.repo)
    }

    fn releases_url(&self) -> String {
        format!("{}/releases", self.repo_url())
    }

    fn assets_url(&self, release_id: &str) -> String {
        format!("{}/releases/{}/assets", self.repo_url(), release_id)
    }

    fn asset_url(&self, asset_id: u64) -> String {
        format!("{}/releases/assets/{}", self.repo_url(), asset_id)
    }

    fn upload_url(&self, release_id: &str) -> String {
        format!(
            "{}/repos/{}/{}/releases/{}/assets",
            self.upload_base, self.owner, self.repo, release_id
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GhRelease {
    id: u64,
    tag_name: String,
    draft: bool,
    created_at: Option<DateTime<Utc>>,
}

impl GhRelease {
    fn into_record(self) -> ReleaseRecord {
        ReleaseRecord {
            id: self.id.to_string(),
            tag: self.tag_name,
            draft: self.draft,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GhAsset {
    id: u64,
    name: String,
}

#[derive(Debug, Serialize)]
struct CreateRelease<'a> {
    tag_name: &'a str,
    name: &'a str,
    draft: bool,
}

/// Release store backed by GitHub Releases.
pub struct GitHubReleaseStore {
    config: GitHubConfig,
    client: Client,
    create: Mutex<()>,
}

impl GitHubReleaseStore {
    pub fn new(config: GitHubConfig) -> StoreResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("launchpad/", env!("CARGO_PKG_VERSION"))),
        );
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|e| StoreError::Transport(format!("invalid token header: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder().default_headers(headers).build()?;
        Ok(Self {
            config,
            client,
            create: Mutex::new(()),
        })
    }

    async fn list_releases(&self) -> StoreResult<Vec<GhRelease>> {
        let mut all = Vec::new();
        let mut page = 1usize;
        loop {
            let resp = self
                .client
                .get(self.config.releases_url())
                .query(&[("per_page", PER_PAGE), ("page", page)])
                .send()
                .await?;
            let batch: Vec<GhRelease> = check(resp, "list releases").await?.json().await?;
            let done = batch.len() < PER_PAGE;
            all.extend(batch);
            if done {
                return Ok(all);
            }
            page += 1;
        }
    }

    async fn list_assets(&self, release_id: &str) -> StoreResult<Vec<GhAsset>> {
        let mut all = Vec::new();
        let mut page = 1usize;
        loop {
            let resp = self
                .client
                .get(self.config.assets_url(release_id))
                .query(&[("per_page", PER_PAGE), ("page", page)])
                .send()
                .await?;
            let batch: Vec<GhAsset> = check(resp, "list assets").await?.json().await?;
            let done = batch.len() < PER_PAGE;
            all.extend(batch);
            if done {
                return Ok(all);
            }
            page += 1;
        }
    }
}

async fn check(resp: Response, operation: &str) -> StoreResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(StoreError::Remote {
        operation: operation.to_string(),
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ReleaseStore for GitHubReleaseStore {
    fn describe(&self) -> String {
        format!("github:{}/{}", self.config.owner, self.config.repo)
    }

    async fn get_or_create_release(&self, tag: &str, draft: bool) -> StoreResult<ReleaseRecord> {
        let _guard = self.create.lock().await;
        if let Some(existing) = self.find_release(tag).await? {
            return Ok(existing);
        }

        let resp = self
            .client
            .post(self.config.releases_url())
            .json(&CreateRelease {
                tag_name: tag,
                name: tag,
                draft,
            })
            .send()
            .await?;
        let created: GhRelease = check(resp, "create release").await?.json().await?;
        info!(tag, id = created.id, draft, "Created GitHub release");
        Ok(created.into_record())
    }

    async fn find_release(&self, tag: &str) -> StoreResult<Option<ReleaseRecord>> {
        Ok(self
            .list_releases()
            .await?
            .into_iter()
            .find(|r| r.tag_name == tag)
            .map(GhRelease::into_record))
    }

    async fn upload_file(
        &self,
        release: &ReleaseRecord,
        local_path: &Path,
        remote_name: &str,
    ) -> StoreResult<UploadAck> {
        let data = read_local(local_path).await?;

        for stale in self
            .list_assets(&release.id)
            .await?
            .into_iter()
            .filter(|a| a.name == remote_name)
        {
            debug!(asset = %stale.name, id = stale.id, "Deleting existing asset before re-upload");
            let resp = self
                .client
                .delete(self.config.asset_url(stale.id))
                .send()
                .await?;
            check(resp, "delete asset").await?;
        }

        let sha256 = sha256_hex(&data);
        let size = data.len() as u64;
        let resp = self
            .client
            .post(self.config.upload_url(&release.id))
            .query(&[("name", remote_name)])
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await?;
        let asset: GhAsset = check(resp, "upload asset").await?.json().await?;

        Ok(UploadAck {
            files: vec![asset.name],
            sha256,
            size,
        })
    }

    async fn list_files(&self, release: &ReleaseRecord) -> StoreResult<BTreeSet<String>> {
        Ok(self
            .list_assets(&release.id)
            .await?
            .into_iter()
            .map(|a| a.name)
            .collect())
    }
}
