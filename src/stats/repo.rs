//! Repository existence check.
//!
//! Validates that the target repo exists (and is visible to our token)
//! before any aggregation work is spent on it. Metadata is cached with a
//! long TTL since repo identity and creation date are effectively
//! immutable.

use tracing::debug;

use super::{RepoRef, StatsContext, StatsError};
use crate::cache::KEY_PREFIX;
use crate::forge::{ForgeError, Repository};
use crate::metrics::CacheTier;

fn repo_key(repo: &RepoRef) -> String {
    format!("{KEY_PREFIX}:repo:{repo}")
}

/// Fetch (cached) repository metadata, failing with
/// [`StatsError::RepoNotFound`] for unknown or inaccessible repos. This
/// short-circuits the whole pipeline: no aggregation is attempted for an
/// invalid repo.
pub async fn ensure_repo_exists(
    ctx: &StatsContext,
    repo: &RepoRef,
) -> Result<Repository, StatsError> {
    let key = repo_key(repo);

    if let Some(cached) = ctx.cache.get(&key).await.map_err(StatsError::Cache)? {
        if let Ok(metadata) = serde_json::from_str::<Repository>(&cached) {
            debug!(%repo, "repo metadata cache hit");
            ctx.metrics.record_cache_hit(CacheTier::Repo);
            return Ok(metadata);
        }
        // Undecodable entry (e.g. written by an older build): recompute.
    }
    ctx.metrics.record_cache_miss(CacheTier::Repo);

    ctx.metrics.record_upstream_call("get_repository");
    let metadata = ctx
        .forge
        .get_repository(&repo.owner, &repo.repo)
        .await
        .map_err(|e| match e {
            ForgeError::NotFound { message } => StatsError::RepoNotFound(message),
            other => StatsError::Upstream(other),
        })?;

    let serialized = serde_json::to_string(&metadata)
        .map_err(|e| StatsError::Cache(anyhow::Error::new(e).context("encoding repo metadata")))?;
    ctx.cache
        .set(&key, &serialized, ctx.ttl.repo)
        .await
        .map_err(StatsError::Cache)?;

    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::super::testutil::{context, BrokenStore, RecordingStore, StubForge};
    use super::*;
    use crate::cache::memory::MemoryStore;

    fn repo_ref() -> RepoRef {
        RepoRef {
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
        }
    }

    #[tokio::test]
    async fn existing_repo_resolves_metadata() {
        let forge = Arc::new(StubForge::default().with_repository());
        let ctx = context(forge, Arc::new(MemoryStore::new()));

        let metadata = ensure_repo_exists(&ctx, &repo_ref()).await.unwrap();
        assert_eq!(metadata.owner, "acme");
        assert_eq!(metadata.name, "widgets");
    }

    #[tokio::test]
    async fn missing_repo_short_circuits() {
        let forge = Arc::new(StubForge::default());
        let ctx = context(forge, Arc::new(MemoryStore::new()));

        let err = ensure_repo_exists(&ctx, &repo_ref()).await.unwrap_err();
        assert!(matches!(err, StatsError::RepoNotFound(_)));
    }

    #[tokio::test]
    async fn second_lookup_served_from_cache() {
        let forge = Arc::new(StubForge::default().with_repository());
        let ctx = context(Arc::clone(&forge) as _, Arc::new(MemoryStore::new()));

        ensure_repo_exists(&ctx, &repo_ref()).await.unwrap();
        ensure_repo_exists(&ctx, &repo_ref()).await.unwrap();
        assert_eq!(forge.get_repository_calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn metadata_cached_with_repo_ttl() {
        let forge = Arc::new(StubForge::default().with_repository());
        let store = Arc::new(RecordingStore::new());
        let ctx = context(forge, Arc::clone(&store) as _);

        ensure_repo_exists(&ctx, &repo_ref()).await.unwrap();
        assert_eq!(store.ttl_for(":repo:acme/widgets"), Some(86_400));
    }

    #[tokio::test]
    async fn cache_outage_fails_the_lookup() {
        let forge = Arc::new(StubForge::default().with_repository());
        let ctx = context(forge, Arc::new(BrokenStore));

        let err = ensure_repo_exists(&ctx, &repo_ref()).await.unwrap_err();
        assert!(matches!(err, StatsError::Cache(_)));
    }
}
