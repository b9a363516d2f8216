//! Cache store abstraction.
//!
//! Every layer of the aggregation pipeline (raw release pages, per-release
//! asset lists, repo metadata, the memoized total) goes through one
//! [`CacheStore`] trait so that the backend can be swapped between process
//! memory and KeyDB without touching the aggregation code.
//!
//! A miss is a normal outcome (`Ok(None)`), never an error. A backend
//! failure is an error and is propagated to the caller: a broken cache
//! should fail the request rather than silently turn every lookup into an
//! upstream API call.

pub mod keydb;
pub mod memory;

use anyhow::Result;

/// Key-value store with per-entry TTLs.
///
/// Values are plain strings; callers serialize structured data (JSON) before
/// storing. Entries expire passively: a `get` on an expired key behaves as a
/// miss, and no active eviction sweep is required of implementations.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up `key`. `Ok(None)` on miss or expiry.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key` for `ttl_secs` seconds, overwriting any
    /// previous entry.
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;
}

/// Namespace prefix shared by all cache keys written by this service.
pub const KEY_PREFIX: &str = "downtally";
