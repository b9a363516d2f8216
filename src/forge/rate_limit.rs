//! Upstream API rate-limit tracking.
//!
//! Reads `X-RateLimit-Remaining` / `X-RateLimit-Reset` (or the standardised
//! `RateLimit-Remaining` / `RateLimit-Reset`) from forge API responses so
//! the health endpoint and metrics can report how close the service is to
//! exhausting its quota. No throttling happens at this layer; when the
//! quota runs out the upstream returns an error and the request fails.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared rate-limit state updated after every forge API response.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    /// Remaining API calls before the rate limit resets.
    remaining: Arc<AtomicU64>,
    /// Unix timestamp at which the rate limit window resets.
    reset_at: Arc<AtomicU64>,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitState {
    pub fn new() -> Self {
        Self {
            remaining: Arc::new(AtomicU64::new(u64::MAX)),
            reset_at: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current remaining calls. `u64::MAX` until the first response is seen.
    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::Relaxed)
    }

    /// Unix timestamp when the window resets.
    pub fn reset_at(&self) -> u64 {
        self.reset_at.load(Ordering::Relaxed)
    }

    /// Update state from HTTP response headers.
    ///
    /// Accepts both `X-RateLimit-*` (GitHub/Gitea) and `RateLimit-*`
    /// (IETF draft) header names.
    pub fn update_from_headers(&self, headers: &reqwest::header::HeaderMap) {
        let remaining = headers
            .get("X-RateLimit-Remaining")
            .or_else(|| headers.get("RateLimit-Remaining"))
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let reset = headers
            .get("X-RateLimit-Reset")
            .or_else(|| headers.get("RateLimit-Reset"))
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        if let Some(r) = remaining {
            self.remaining.store(r, Ordering::Relaxed);
        }
        if let Some(r) = reset {
            self.reset_at.store(r, Ordering::Relaxed);
        }
    }

    /// Seconds until the rate-limit window resets, or 0 if already reset.
    pub fn reset_in_secs(&self) -> u64 {
        let reset = self.reset_at.load(Ordering::Relaxed);
        let now = chrono::Utc::now().timestamp() as u64;
        reset.saturating_sub(now)
    }
}
