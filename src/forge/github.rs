//! GitHub / GitHub Enterprise client implementation.
//!
//! Maps the REST v3 release, asset, and repository endpoints onto the
//! [`ForgeClient`] trait. Every response updates the shared
//! [`RateLimitState`] so metrics and health checks track the remaining
//! quota.

use serde::Deserialize;
use tracing::{debug, warn};

use super::rate_limit::RateLimitState;
use super::{Asset, ForgeClient, ForgeError, Release, Repository};
use crate::config::UpstreamConfig;

const ACCEPT: &str = "application/vnd.github.v3+json";

// ---------------------------------------------------------------------------
// Client struct
// ---------------------------------------------------------------------------

pub struct GitHubClient {
    api_url: String,
    token_env: String,
    http_client: reqwest::Client,
    rate_limit: RateLimitState,
}

impl GitHubClient {
    pub fn new(config: &UpstreamConfig, http_client: reqwest::Client) -> Self {
        Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token_env: config.token_env.clone(),
            http_client,
            rate_limit: RateLimitState::new(),
        }
    }

    /// Shared rate-limit state, read by metrics and the health endpoint.
    pub fn rate_limit(&self) -> &RateLimitState {
        &self.rate_limit
    }

    /// Base API URL, used by the health endpoint's reachability probe.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn auth_header(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.is_empty())
            .map(|t| format!("Bearer {t}"))
    }

    /// Issue a GET and decode the JSON body, mapping HTTP failures onto
    /// [`ForgeError`].
    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ForgeError> {
        let mut request = self.http_client.get(url).header("Accept", ACCEPT);
        if let Some(auth) = self.auth_header() {
            request = request.header("Authorization", auth);
        }

        let resp = request.send().await?;
        self.rate_limit.update_from_headers(resp.headers());

        let status = resp.status();
        if !status.is_success() {
            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            let message = error_message(&body);
            warn!(%url, %status, message, "upstream API returned non-success");
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(ForgeError::NotFound { message });
            }
            return Err(ForgeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.json().await?)
    }
}

// ---------------------------------------------------------------------------
// Wire formats
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RepositoryWire {
    name: String,
    created_at: String,
    owner: OwnerWire,
}

#[derive(Deserialize)]
struct OwnerWire {
    login: String,
}

// ---------------------------------------------------------------------------
// Trait implementation
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl ForgeClient for GitHubClient {
    async fn list_releases(
        &self,
        owner: &str,
        repo: &str,
        per_page: u32,
        page: u32,
    ) -> Result<Vec<Release>, ForgeError> {
        let url = format!(
            "{}/repos/{owner}/{repo}/releases?per_page={per_page}&page={page}",
            self.api_url
        );
        debug!(%owner, %repo, page, "listing releases");
        self.get_json(&url).await
    }

    async fn list_release_assets(
        &self,
        owner: &str,
        repo: &str,
        release_id: u64,
    ) -> Result<Vec<Asset>, ForgeError> {
        let url = format!(
            "{}/repos/{owner}/{repo}/releases/{release_id}/assets",
            self.api_url
        );
        debug!(%owner, %repo, release_id, "listing release assets");
        self.get_json(&url).await
    }

    async fn get_repository(&self, owner: &str, repo: &str) -> Result<Repository, ForgeError> {
        let url = format!("{}/repos/{owner}/{repo}", self.api_url);
        debug!(%owner, %repo, "fetching repository metadata");
        let wire: RepositoryWire = self.get_json(&url).await?;
        Ok(Repository {
            owner: wire.owner.login,
            name: wire.name,
            created_at: wire.created_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Extract the `message` field GitHub puts in error bodies, falling back to
/// a placeholder when the body is empty or unreadable.
fn error_message(body: &serde_json::Value) -> String {
    body.get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("<no message>")
        .to_string()
}
