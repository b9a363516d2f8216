//! Release ID collection.
//!
//! Paginates a repo's releases starting at page 0 and accumulates the IDs
//! into a set. Pages are fetched strictly sequentially: whether page N+1
//! exists is only known after page N came back non-empty, so this loop must
//! not be parallelised. Each raw page is cached individually; a full page
//! is settled history and gets the long TTL, while a partial page sits at
//! the frontier where new releases appear and expires after the short TTL.

use std::collections::BTreeSet;

use tracing::debug;

use super::{RepoRef, StatsContext, StatsError};
use crate::cache::KEY_PREFIX;
use crate::metrics::CacheTier;

fn page_key(repo: &RepoRef, per_page: u32, page: u32) -> String {
    format!("{KEY_PREFIX}:releases:{repo}:pp{per_page}:p{page}")
}

/// Collect the IDs of every release of `repo` via cache-assisted
/// pagination.
///
/// IDs are deduplicated across pages: upstream pagination is not guaranteed
/// to be consistent while releases are being published, so a release could
/// in principle recur on two pages. The set makes that harmless.
pub async fn collect_release_ids(
    ctx: &StatsContext,
    repo: &RepoRef,
) -> Result<BTreeSet<u64>, StatsError> {
    let mut ids = BTreeSet::new();
    let mut page = 0u32;

    loop {
        let page_ids = fetch_release_page(ctx, repo, page).await?;
        if page_ids.is_empty() {
            break;
        }
        ids.extend(page_ids);
        page += 1;
    }

    debug!(%repo, releases = ids.len(), pages = page, "collected release ids");
    Ok(ids)
}

/// Fetch one page of release IDs, cache-first.
async fn fetch_release_page(
    ctx: &StatsContext,
    repo: &RepoRef,
    page: u32,
) -> Result<Vec<u64>, StatsError> {
    let key = page_key(repo, ctx.per_page, page);

    if let Some(cached) = ctx.cache.get(&key).await.map_err(StatsError::Cache)? {
        if let Ok(ids) = serde_json::from_str::<Vec<u64>>(&cached) {
            debug!(%repo, page, "release page cache hit");
            ctx.metrics.record_cache_hit(CacheTier::Page);
            return Ok(ids);
        }
    }
    ctx.metrics.record_cache_miss(CacheTier::Page);

    ctx.metrics.record_upstream_call("list_releases");
    let releases = ctx
        .forge
        .list_releases(&repo.owner, &repo.repo, ctx.per_page, page)
        .await
        .map_err(StatsError::upstream)?;
    let ids: Vec<u64> = releases.iter().map(|r| r.id).collect();

    let ttl = if ids.len() as u32 == ctx.per_page {
        ctx.ttl.full_page
    } else {
        ctx.ttl.partial_page
    };
    let serialized = serde_json::to_string(&ids)
        .map_err(|e| StatsError::Cache(anyhow::Error::new(e).context("encoding release page")))?;
    ctx.cache
        .set(&key, &serialized, ttl)
        .await
        .map_err(StatsError::Cache)?;

    Ok(ids)
}
