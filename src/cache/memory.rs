//! Process-local cache store.
//!
//! A `Mutex<HashMap>` with per-entry deadlines. Expiry is passive: entries
//! are dropped when a `get` finds them past their deadline. Good enough for
//! single-instance deployments and for tests; multi-instance deployments
//! should use the KeyDB backend so all instances share one cache.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Result;

use super::CacheStore;

struct Entry {
    value: String,
    expires_at: Instant,
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                // Expired entry, treat as a miss and reclaim the slot.
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: Instant::now() + Duration::from_secs(ttl_secs),
        };
        self.entries
            .lock()
            .expect("cache mutex poisoned")
            .insert(key.to_string(), entry);
        Ok(())
    }
}
