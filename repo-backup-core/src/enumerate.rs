//! Repository enumeration against the GitHub REST API.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, error, info, instrument};

use crate::contract::{RepositoryDescriptor, RepositoryLister};
use crate::error::BackupError;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Page size requested from `/user/repos`.
pub const PAGE_SIZE: usize = 40;

/// Lists the authenticated user's repositories via `GET /user/repos`.
pub struct GitHubLister {
    client: reqwest::Client,
    api_url: String,
}

impl GitHubLister {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for GitHubLister {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

#[async_trait]
impl RepositoryLister for GitHubLister {
    #[instrument(skip(self, access_token), fields(api_url = %self.api_url))]
    async fn list_repositories(
        &self,
        access_token: &str,
    ) -> Result<Vec<RepositoryDescriptor>, BackupError> {
        let mut repositories = Vec::new();
        let mut page = 1usize;

        loop {
            let url = format!("{}/user/repos", self.api_url);
            let resp = self
                .client
                .get(&url)
                .query(&[("per_page", PAGE_SIZE), ("page", page)])
                .bearer_auth(access_token)
                .header("Accept", "application/vnd.github+json")
                .header("User-Agent", "repo-backup")
                .send()
                .await
                .map_err(|e| {
                    error!(error = ?e, url = %url, page, "Failed to reach repository listing endpoint");
                    BackupError::Provider(format!("request to {url} failed: {e}"))
                })?;

            let status = resp.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                let body = resp.text().await.unwrap_or_default();
                error!(%status, url = %url, "Provider rejected the access token");
                return Err(BackupError::Auth(format!("{status}: {}", body.trim())));
            }
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                error!(%status, url = %url, page, "Repository listing returned error");
                return Err(BackupError::Provider(format!(
                    "{url} returned {status}: {}",
                    body.trim()
                )));
            }

            let batch: Vec<RepositoryDescriptor> = resp.json().await.map_err(|e| {
                error!(error = ?e, url = %url, page, "Failed to decode repository listing");
                BackupError::Provider(format!("invalid repository listing from {url}: {e}"))
            })?;

            let size = batch.len();
            debug!(page, size, "Fetched repository page");
            repositories.extend(batch);

            if size < PAGE_SIZE {
                break;
            }
            page += 1;
        }

        info!(count = repositories.len(), "Enumerated repositories");
        Ok(repositories)
    }
}
