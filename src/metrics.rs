use std::sync::Arc;

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

// ---------------------------------------------------------------------------
// Label types
// ---------------------------------------------------------------------------

/// Which cache tier a hit/miss belongs to.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum CacheTier {
    /// Raw release-list pages.
    Page,
    /// Per-release asset lists.
    Assets,
    /// Memoized aggregate results.
    Result,
    /// Repository metadata.
    Repo,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TierLabels {
    pub tier: CacheTier,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EndpointLabels {
    pub endpoint: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    pub outcome: String,
}

// ---------------------------------------------------------------------------
// Metrics struct
// ---------------------------------------------------------------------------

/// Central container for every Prometheus metric exposed by the service.
pub struct Metrics {
    // -- requests --
    pub requests_total: Family<OutcomeLabels, Counter>,

    // -- cache --
    pub cache_hits: Family<TierLabels, Counter>,
    pub cache_misses: Family<TierLabels, Counter>,

    // -- upstream API --
    pub upstream_api_calls: Family<EndpointLabels, Counter>,
    pub upstream_rate_limit_remaining: Gauge,
}

impl Metrics {
    /// Create a new [`Metrics`] instance and register every metric with the
    /// supplied `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let requests_total = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "downtally_requests_total",
            "Download-count requests by outcome",
            requests_total.clone(),
        );

        let cache_hits = Family::<TierLabels, Counter>::default();
        registry.register(
            "downtally_cache_hits_total",
            "Cache hits by tier",
            cache_hits.clone(),
        );

        let cache_misses = Family::<TierLabels, Counter>::default();
        registry.register(
            "downtally_cache_misses_total",
            "Cache misses by tier",
            cache_misses.clone(),
        );

        let upstream_api_calls = Family::<EndpointLabels, Counter>::default();
        registry.register(
            "downtally_upstream_api_calls_total",
            "Upstream API call count by endpoint",
            upstream_api_calls.clone(),
        );

        let upstream_rate_limit_remaining: Gauge = Gauge::default();
        registry.register(
            "downtally_upstream_rate_limit_remaining",
            "Remaining upstream API calls before rate limit",
            upstream_rate_limit_remaining.clone(),
        );

        Self {
            requests_total,
            cache_hits,
            cache_misses,
            upstream_api_calls,
            upstream_rate_limit_remaining,
        }
    }

    pub fn record_cache_hit(&self, tier: CacheTier) {
        self.cache_hits.get_or_create(&TierLabels { tier }).inc();
    }

    pub fn record_cache_miss(&self, tier: CacheTier) {
        self.cache_misses.get_or_create(&TierLabels { tier }).inc();
    }

    pub fn record_upstream_call(&self, endpoint: &str) {
        self.upstream_api_calls
            .get_or_create(&EndpointLabels {
                endpoint: endpoint.to_string(),
            })
            .inc();
    }

    pub fn record_request(&self, outcome: &str) {
        self.requests_total
            .get_or_create(&OutcomeLabels {
                outcome: outcome.to_string(),
            })
            .inc();
    }
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// Thread-safe wrapper for the metrics registry, used in [`crate::AppState`].
#[derive(Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub metrics: Arc<Metrics>,
}

impl MetricsRegistry {
    /// Build a fresh registry and pre-register all service metrics.
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);
        Self {
            registry: Arc::new(registry),
            metrics: Arc::new(metrics),
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_per_label() {
        let registry = MetricsRegistry::new();
        let metrics = &registry.metrics;

        metrics.record_cache_hit(CacheTier::Page);
        metrics.record_cache_hit(CacheTier::Page);
        metrics.record_cache_miss(CacheTier::Result);

        assert_eq!(
            metrics
                .cache_hits
                .get_or_create(&TierLabels {
                    tier: CacheTier::Page
                })
                .get(),
            2
        );
        assert_eq!(
            metrics
                .cache_misses
                .get_or_create(&TierLabels {
                    tier: CacheTier::Result
                })
                .get(),
            1
        );
    }

    #[test]
    fn registry_encodes_to_text() {
        let registry = MetricsRegistry::new();
        registry.metrics.record_request("ok");

        let mut buf = String::new();
        prometheus_client::encoding::text::encode(&mut buf, &registry.registry).unwrap();
        assert!(buf.contains("downtally_requests_total"));
    }
}
