//! Memoized end-to-end download count.
//!
//! Entry point for the handler layer: validates the repo, then serves the
//! formatted total from a single short-TTL cache entry keyed by
//! `(owner, repo, suffixes)`. A hit skips every upstream call; a miss runs
//! the full collect/aggregate pipeline and stores the result.
//!
//! The memo TTL is minutes while the underlying page caches live for hours:
//! a frequently polled badge keeps hitting the memo, and when it does
//! expire the recomputation is still mostly served from the page and asset
//! caches. Concurrent requests may race to recompute the same key; the
//! duplicate work is bounded and preferred over cross-request locking.

use tracing::{debug, info};

use super::format::group_thousands;
use super::{assets, releases, repo, RepoRef, StatsContext, StatsError};
use crate::cache::KEY_PREFIX;
use crate::metrics::CacheTier;

/// Deterministic memo key over the full request input.
fn result_key(repo: &RepoRef, suffixes: Option<&[String]>) -> String {
    let input = serde_json::json!({
        "owner": repo.owner,
        "repo": repo.repo,
        "suffixes": suffixes,
    });
    format!("{KEY_PREFIX}:result:{input}")
}

/// Total release downloads of `repo` under the suffix policy, formatted
/// with thousands grouping.
pub async fn count_downloads(
    ctx: &StatsContext,
    repo_ref: &RepoRef,
    suffixes: Option<&[String]>,
) -> Result<String, StatsError> {
    // Cheap cached existence check before any aggregation work.
    repo::ensure_repo_exists(ctx, repo_ref).await?;

    let key = result_key(repo_ref, suffixes);
    if let Some(cached) = ctx.cache.get(&key).await.map_err(StatsError::Cache)? {
        debug!(%repo_ref, "result cache hit");
        ctx.metrics.record_cache_hit(CacheTier::Result);
        return Ok(cached);
    }
    ctx.metrics.record_cache_miss(CacheTier::Result);

    let release_ids = releases::collect_release_ids(ctx, repo_ref).await?;
    let total = assets::sum_release_downloads(ctx, repo_ref, &release_ids, suffixes).await?;

    let formatted = group_thousands(total);
    info!(%repo_ref, releases = release_ids.len(), total, "computed download count");

    ctx.cache
        .set(&key, &formatted, ctx.ttl.result)
        .await
        .map_err(StatsError::Cache)?;

    Ok(formatted)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::super::testutil::{asset, context, RecordingStore, StubForge};
    use super::*;
    use crate::cache::memory::MemoryStore;
    use crate::forge::Release;

    fn repo_ref() -> RepoRef {
        RepoRef {
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
        }
    }

    fn one_release_forge() -> StubForge {
        StubForge {
            pages: vec![vec![Release { id: 1 }]],
            assets: [(1, vec![asset("a.zip", 10), asset("a.tar", 5)])].into(),
            ..StubForge::default()
        }
        .with_repository()
    }

    #[tokio::test]
    async fn max_policy_counts_representative_asset() {
        let ctx = context(Arc::new(one_release_forge()), Arc::new(MemoryStore::new()));
        let count = count_downloads(&ctx, &repo_ref(), None).await.unwrap();
        assert_eq!(count, "10");
    }

    #[tokio::test]
    async fn suffix_policy_counts_chosen_file_type() {
        let ctx = context(Arc::new(one_release_forge()), Arc::new(MemoryStore::new()));
        let suffixes = vec!["tar".to_string()];
        let count = count_downloads(&ctx, &repo_ref(), Some(&suffixes))
            .await
            .unwrap();
        assert_eq!(count, "5");
    }

    #[tokio::test]
    async fn suffix_matching_nothing_is_zero_not_an_error() {
        let ctx = context(Arc::new(one_release_forge()), Arc::new(MemoryStore::new()));
        let suffixes = vec!["dmg".to_string()];
        let count = count_downloads(&ctx, &repo_ref(), Some(&suffixes))
            .await
            .unwrap();
        assert_eq!(count, "0");
    }

    #[tokio::test]
    async fn memo_hit_skips_all_upstream_work() {
        let forge = Arc::new(one_release_forge());
        let ctx = context(Arc::clone(&forge) as _, Arc::new(MemoryStore::new()));

        let first = count_downloads(&ctx, &repo_ref(), None).await.unwrap();
        let releases_before = forge.list_releases_calls.load(Ordering::Relaxed);
        let assets_before = forge.list_assets_calls.load(Ordering::Relaxed);

        let second = count_downloads(&ctx, &repo_ref(), None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            forge.list_releases_calls.load(Ordering::Relaxed),
            releases_before
        );
        assert_eq!(
            forge.list_assets_calls.load(Ordering::Relaxed),
            assets_before
        );
    }

    #[tokio::test]
    async fn suffix_sets_memoize_independently() {
        let forge = Arc::new(one_release_forge());
        let ctx = context(forge, Arc::new(MemoryStore::new()));

        let all = count_downloads(&ctx, &repo_ref(), None).await.unwrap();
        let tar = count_downloads(&ctx, &repo_ref(), Some(&["tar".to_string()]))
            .await
            .unwrap();
        assert_eq!(all, "10");
        assert_eq!(tar, "5");
    }

    #[tokio::test]
    async fn result_stored_with_short_ttl() {
        let store = Arc::new(RecordingStore::new());
        let ctx = context(Arc::new(one_release_forge()), Arc::clone(&store) as _);

        count_downloads(&ctx, &repo_ref(), None).await.unwrap();
        assert_eq!(store.ttl_for(":result:"), Some(360));
    }

    #[tokio::test]
    async fn unknown_repo_fails_before_any_aggregation() {
        let forge = Arc::new(StubForge::default());
        let ctx = context(Arc::clone(&forge) as _, Arc::new(MemoryStore::new()));

        let err = count_downloads(&ctx, &repo_ref(), None).await.unwrap_err();
        assert!(matches!(err, StatsError::RepoNotFound(_)));
        assert_eq!(forge.list_releases_calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn large_totals_are_thousands_grouped() {
        let forge = StubForge {
            pages: vec![vec![Release { id: 1 }, Release { id: 2 }]],
            assets: [
                (1, vec![asset("a.zip", 1_000_000)]),
                (2, vec![asset("b.zip", 234_567)]),
            ]
            .into(),
            ..StubForge::default()
        }
        .with_repository();
        let ctx = context(Arc::new(forge), Arc::new(MemoryStore::new()));

        let count = count_downloads(&ctx, &repo_ref(), None).await.unwrap();
        assert_eq!(count, "1,234,567");
    }
}
