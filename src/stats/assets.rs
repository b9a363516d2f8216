//! Per-release asset aggregation.
//!
//! For each release, fetches its asset list (cache-assisted) and reduces it
//! to a single download count:
//!
//! - with a suffix filter, the counts of assets whose final dot-segment is
//!   in the filter are **summed** ("total downloads across a chosen file
//!   type"); a filter matching nothing yields 0, not an error;
//! - without a filter, the **maximum** single-asset count is taken ("total
//!   downloads of one representative asset"), so one release counts once
//!   regardless of how many artifact variants it ships.
//!
//! A release with no assets contributes nothing: its result is `None` and
//! is dropped before the outer summation, so an empty release cannot poison
//! the grand total. Negative counts from upstream are likewise excluded.
//!
//! Releases are independent of one another, so the per-release work is
//! fanned out concurrently and summed; the sum is order-independent.

use std::collections::BTreeSet;

use tracing::debug;

use super::{RepoRef, StatsContext, StatsError};
use crate::cache::KEY_PREFIX;
use crate::forge::Asset;
use crate::metrics::CacheTier;

fn assets_key(repo: &RepoRef, release_id: u64) -> String {
    format!("{KEY_PREFIX}:assets:{repo}:r{release_id}")
}

/// Sum the download counts of every release in `release_ids` under the
/// given suffix policy.
pub async fn sum_release_downloads(
    ctx: &StatsContext,
    repo: &RepoRef,
    release_ids: &BTreeSet<u64>,
    suffixes: Option<&[String]>,
) -> Result<u64, StatsError> {
    let per_release = futures::future::try_join_all(
        release_ids
            .iter()
            .map(|&release_id| release_downloads(ctx, repo, release_id, suffixes)),
    )
    .await?;

    Ok(per_release.into_iter().flatten().sum())
}

/// Aggregate one release. `None` means the release contributes nothing
/// (no assets, or only assets with unusable counts).
async fn release_downloads(
    ctx: &StatsContext,
    repo: &RepoRef,
    release_id: u64,
    suffixes: Option<&[String]>,
) -> Result<Option<u64>, StatsError> {
    let assets = fetch_assets(ctx, repo, release_id).await?;
    Ok(apply_policy(&assets, suffixes))
}

/// Fetch one release's asset list, cache-first.
async fn fetch_assets(
    ctx: &StatsContext,
    repo: &RepoRef,
    release_id: u64,
) -> Result<Vec<Asset>, StatsError> {
    let key = assets_key(repo, release_id);

    if let Some(cached) = ctx.cache.get(&key).await.map_err(StatsError::Cache)? {
        if let Ok(assets) = serde_json::from_str::<Vec<Asset>>(&cached) {
            debug!(%repo, release_id, "asset list cache hit");
            ctx.metrics.record_cache_hit(CacheTier::Assets);
            return Ok(assets);
        }
    }
    ctx.metrics.record_cache_miss(CacheTier::Assets);

    ctx.metrics.record_upstream_call("list_release_assets");
    let assets = ctx
        .forge
        .list_release_assets(&repo.owner, &repo.repo, release_id)
        .await
        .map_err(StatsError::upstream)?;

    let serialized = serde_json::to_string(&assets)
        .map_err(|e| StatsError::Cache(anyhow::Error::new(e).context("encoding asset list")))?;
    ctx.cache
        .set(&key, &serialized, ctx.ttl.assets)
        .await
        .map_err(StatsError::Cache)?;

    Ok(assets)
}

/// Reduce one release's assets to a single count under the suffix policy.
fn apply_policy(assets: &[Asset], suffixes: Option<&[String]>) -> Option<u64> {
    match suffixes {
        Some(suffixes) => Some(
            assets
                .iter()
                .filter(|a| suffixes.iter().any(|s| s == asset_suffix(&a.name)))
                .filter_map(|a| u64::try_from(a.download_count).ok())
                .sum(),
        ),
        None => assets
            .iter()
            .map(|a| a.download_count)
            .max()
            .and_then(|max| u64::try_from(max).ok()),
    }
}

/// Final dot-segment of an asset name. A name without a dot is its own
/// suffix, matching how badge users write single-word filters.
fn asset_suffix(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::super::testutil::{asset, context, StubForge};
    use super::*;
    use crate::cache::memory::MemoryStore;

    fn repo_ref() -> RepoRef {
        RepoRef {
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
        }
    }

    fn suffixes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    // ── Suffix extraction ───────────────────────────────────────────────

    #[test]
    fn suffix_is_final_dot_segment() {
        assert_eq!(asset_suffix("tool-x86_64.tar.gz"), "gz");
        assert_eq!(asset_suffix("tool.deb"), "deb");
    }

    #[test]
    fn name_without_dot_is_its_own_suffix() {
        assert_eq!(asset_suffix("checksums"), "checksums");
    }

    // ── Policy ──────────────────────────────────────────────────────────

    #[test]
    fn max_policy_picks_representative_asset() {
        let assets = vec![asset("a.zip", 10), asset("a.tar", 5)];
        assert_eq!(apply_policy(&assets, None), Some(10));
    }

    #[test]
    fn max_policy_on_empty_release_is_none() {
        assert_eq!(apply_policy(&[], None), None);
    }

    #[test]
    fn max_policy_excludes_negative_sentinel() {
        let assets = vec![asset("a.zip", -1)];
        assert_eq!(apply_policy(&assets, None), None);
    }

    #[test]
    fn suffix_policy_sums_matching_assets() {
        let assets = vec![asset("a.zip", 10), asset("a.tar", 5), asset("b.tar", 7)];
        assert_eq!(apply_policy(&assets, Some(&suffixes(&["tar"]))), Some(12));
    }

    #[test]
    fn suffix_policy_with_no_match_is_zero() {
        let assets = vec![asset("a.zip", 10)];
        assert_eq!(apply_policy(&assets, Some(&suffixes(&["deb"]))), Some(0));
    }

    #[test]
    fn suffix_policy_excludes_negative_counts() {
        let assets = vec![asset("a.tar", 5), asset("b.tar", -3)];
        assert_eq!(apply_policy(&assets, Some(&suffixes(&["tar"]))), Some(5));
    }

    #[test]
    fn suffix_policy_matches_multiple_suffixes() {
        let assets = vec![asset("a.zip", 10), asset("a.tar", 5), asset("a.deb", 2)];
        assert_eq!(
            apply_policy(&assets, Some(&suffixes(&["zip", "deb"]))),
            Some(12)
        );
    }

    // ── Fan-out aggregation ─────────────────────────────────────────────

    #[tokio::test]
    async fn empty_release_excluded_from_total() {
        // First release has one asset, second has none; the empty release
        // must not drag the total down.
        let forge = Arc::new(StubForge {
            assets: [(1, vec![asset("x.deb", 100)]), (2, vec![])].into(),
            ..StubForge::default()
        });
        let ctx = context(forge, Arc::new(MemoryStore::new()));

        let total = sum_release_downloads(&ctx, &repo_ref(), &BTreeSet::from([1, 2]), None)
            .await
            .unwrap();
        assert_eq!(total, 100);
    }

    #[tokio::test]
    async fn totals_sum_across_releases() {
        let forge = Arc::new(StubForge {
            assets: [
                (1, vec![asset("a.zip", 10), asset("a.tar", 5)]),
                (2, vec![asset("b.zip", 30)]),
            ]
            .into(),
            ..StubForge::default()
        });
        let ctx = context(forge, Arc::new(MemoryStore::new()));
        let ids = BTreeSet::from([1, 2]);

        let max_total = sum_release_downloads(&ctx, &repo_ref(), &ids, None)
            .await
            .unwrap();
        assert_eq!(max_total, 40);

        let tar_total = sum_release_downloads(&ctx, &repo_ref(), &ids, Some(&suffixes(&["tar"])))
            .await
            .unwrap();
        assert_eq!(tar_total, 5);
    }

    #[tokio::test]
    async fn asset_lists_served_from_cache_on_repeat() {
        let forge = Arc::new(StubForge {
            assets: [(1, vec![asset("a.zip", 10)])].into(),
            ..StubForge::default()
        });
        let ctx = context(Arc::clone(&forge) as _, Arc::new(MemoryStore::new()));
        let ids = BTreeSet::from([1]);

        sum_release_downloads(&ctx, &repo_ref(), &ids, None)
            .await
            .unwrap();
        sum_release_downloads(&ctx, &repo_ref(), &ids, None)
            .await
            .unwrap();
        assert_eq!(forge.list_assets_calls.load(Ordering::Relaxed), 1);
    }
}
