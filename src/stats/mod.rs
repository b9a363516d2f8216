//! Release download aggregation engine.
//!
//! Turns "how often was this repo's released software downloaded?" into a
//! formatted count. The pipeline is: validate the repo exists (cached),
//! short-circuit on a memoized aggregate, otherwise paginate release IDs
//! sequentially (cached per page), fan out per-release asset aggregation
//! concurrently (cached per release), sum, format, memoize.
//!
//! All upstream access goes through [`crate::forge::ForgeClient`] and all
//! caching through [`crate::cache::CacheStore`], so the whole engine runs
//! against stubs in tests.

pub mod assets;
pub mod count;
pub mod format;
pub mod releases;
pub mod repo;

use std::sync::Arc;

use thiserror::Error;

use crate::cache::CacheStore;
use crate::config::TtlConfig;
use crate::forge::{ForgeClient, ForgeError};
use crate::metrics::Metrics;

// ---------------------------------------------------------------------------
// Request inputs
// ---------------------------------------------------------------------------

/// Identifies the target repository. Supplied per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Failure modes of the aggregation pipeline.
///
/// Cache-backend errors are deliberately fatal to the affected request
/// instead of degrading to "always recompute": a silent fallback would mask
/// a systemic cache outage behind an unbounded stream of upstream calls.
#[derive(Debug, Error)]
pub enum StatsError {
    /// The repository does not exist or is not visible to our token.
    #[error("{0}")]
    RepoNotFound(String),

    /// The upstream API failed mid-aggregation. No partial totals are
    /// returned.
    #[error(transparent)]
    Upstream(ForgeError),

    /// The cache backend failed.
    #[error("cache backend error: {0:#}")]
    Cache(anyhow::Error),
}

impl StatsError {
    /// Map a forge failure encountered after the existence check. `NotFound`
    /// at that point still aborts the pipeline with the same client-visible
    /// shape.
    fn upstream(err: ForgeError) -> Self {
        match err {
            ForgeError::NotFound { message } => StatsError::RepoNotFound(message),
            other => StatsError::Upstream(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared context
// ---------------------------------------------------------------------------

/// Long-lived dependencies of the aggregation engine, created once at
/// startup and passed by reference into every call. The cache store is
/// process-wide shared state; concurrent requests may race to populate the
/// same key, which is accepted (upstream calls are idempotent).
#[derive(Clone)]
pub struct StatsContext {
    pub cache: Arc<dyn CacheStore>,
    pub forge: Arc<dyn ForgeClient>,
    pub ttl: TtlConfig,
    pub per_page: u32,
    pub metrics: Arc<Metrics>,
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------
