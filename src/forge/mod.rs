//! Upstream forge API abstraction.
//!
//! Provides the [`ForgeClient`] trait that encapsulates the three upstream
//! capabilities the aggregation pipeline needs: paginated release listing,
//! per-release asset listing, and repository metadata lookup. Callers in
//! `stats` dispatch through this trait so that no forge-specific URL
//! construction or response parsing leaks outside this module, and so tests
//! can substitute a call-counting stub.

pub mod github;
pub mod rate_limit;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A single release. Only the identifier is needed for aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Release {
    pub id: u64,
}

/// A single release asset.
///
/// `download_count` is kept signed: the aggregation layer excludes negative
/// values from sums rather than trusting the upstream to never report one.
/// Serialized into the asset-list cache, so field names are part of the
/// cache format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    pub download_count: i64,
}

/// Repository metadata, used by the existence check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub owner: String,
    pub name: String,
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Typed failure from the upstream forge API.
#[derive(Debug, Error)]
pub enum ForgeError {
    /// The repository does not exist or the token cannot see it. GitHub
    /// reports both as 404, so they are deliberately not distinguished.
    #[error("repository not found or inaccessible: {message}")]
    NotFound { message: String },

    /// Any other non-success API status (rate limiting, 5xx, ...).
    #[error("upstream API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The request never produced an HTTP response (DNS, TLS, connect, ...).
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Abstraction over the upstream forge endpoints used for aggregation.
#[async_trait::async_trait]
pub trait ForgeClient: Send + Sync {
    /// List one page of releases for `owner/repo`. May return fewer than
    /// `per_page` entries on the last page, and an empty list past the end.
    async fn list_releases(
        &self,
        owner: &str,
        repo: &str,
        per_page: u32,
        page: u32,
    ) -> Result<Vec<Release>, ForgeError>;

    /// List all assets of one release.
    async fn list_release_assets(
        &self,
        owner: &str,
        repo: &str,
        release_id: u64,
    ) -> Result<Vec<Asset>, ForgeError>;

    /// Fetch repository metadata, failing with [`ForgeError::NotFound`] for
    /// unknown or inaccessible repos.
    async fn get_repository(&self, owner: &str, repo: &str) -> Result<Repository, ForgeError>;
}
