use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub ttl: TtlConfig,
    pub server: ServerConfig,
}

// ---------------------------------------------------------------------------
// Upstream forge API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Full URL to the upstream API root (e.g. `https://api.github.com`).
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Name of the environment variable that holds the upstream API token.
    ///
    /// Unauthenticated requests work against public repos but share a much
    /// smaller rate-limit pool, so a token is strongly recommended.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Releases fetched per page during pagination.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    /// Minimum number of API calls to keep in reserve before the health
    /// endpoint reports the upstream as degraded.
    #[serde(default = "default_rate_limit_buffer")]
    pub rate_limit_buffer: u32,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_per_page() -> u32 {
    30
}

fn default_rate_limit_buffer() -> u32 {
    100
}

// ---------------------------------------------------------------------------
// Cache backend
// ---------------------------------------------------------------------------

/// Which cache store implementation to use.
///
/// `memory` keeps entries in process memory and is suitable for a single
/// instance. `keydb` shares entries across instances through a KeyDB/Redis
/// deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Keydb,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    /// KeyDB connection string (e.g. `rediss://keydb.local:6380`).
    /// Required when `backend = keydb`.
    #[serde(default)]
    pub keydb_endpoint: Option<String>,
    /// Enable TLS for the KeyDB connection.
    #[serde(default = "bool_true")]
    pub keydb_tls: bool,
    /// Name of the environment variable that holds the KeyDB auth token.
    #[serde(default = "default_keydb_auth_env")]
    pub keydb_auth_token_env: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            keydb_endpoint: None,
            keydb_tls: true,
            keydb_auth_token_env: default_keydb_auth_env(),
        }
    }
}

fn bool_true() -> bool {
    true
}

fn default_keydb_auth_env() -> String {
    "KEYDB_AUTH_TOKEN".to_string()
}

// ---------------------------------------------------------------------------
// Cache TTLs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct TtlConfig {
    /// TTL (seconds) for a release page that came back full. A full page is
    /// settled history and may be cached for a long time.
    #[serde(default = "default_full_page_ttl")]
    pub full_page: u64,
    /// TTL (seconds) for a partial release page. Partial pages sit at the
    /// frontier where new releases appear, so they expire sooner.
    #[serde(default = "default_partial_page_ttl")]
    pub partial_page: u64,
    /// TTL (seconds) for a per-release asset list.
    #[serde(default = "default_assets_ttl")]
    pub assets: u64,
    /// TTL (seconds) for the memoized aggregate result. Deliberately much
    /// shorter than the page caches: the total should stay reasonably fresh
    /// even while the underlying pages are served from cache.
    #[serde(default = "default_result_ttl")]
    pub result: u64,
    /// TTL (seconds) for repository metadata. Repo identity is effectively
    /// immutable.
    #[serde(default = "default_repo_ttl")]
    pub repo: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            full_page: default_full_page_ttl(),
            partial_page: default_partial_page_ttl(),
            assets: default_assets_ttl(),
            result: default_result_ttl(),
            repo: default_repo_ttl(),
        }
    }
}

fn default_full_page_ttl() -> u64 {
    60 * 60 * 24
}

fn default_partial_page_ttl() -> u64 {
    60 * 60
}

fn default_assets_ttl() -> u64 {
    60 * 60
}

fn default_result_ttl() -> u64 {
    360
}

fn default_repo_ttl() -> u64 {
    60 * 60 * 24
}

// ---------------------------------------------------------------------------
// HTTP server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address for the HTTP listener (e.g. `0.0.0.0:8080`).
    pub http_listen: String,
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load and validate a [`Config`] from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Basic sanity checks that cannot be expressed purely with serde.
fn validate_config(config: &Config) -> Result<()> {
    anyhow::ensure!(
        config.upstream.per_page > 0 && config.upstream.per_page <= 100,
        "upstream.per_page must be in range 1-100"
    );
    anyhow::ensure!(
        config.ttl.full_page >= config.ttl.partial_page,
        "ttl.full_page must not be shorter than ttl.partial_page"
    );
    if config.cache.backend == CacheBackend::Keydb {
        anyhow::ensure!(
            config.cache.keydb_endpoint.is_some(),
            "cache.keydb_endpoint is required when cache.backend = keydb"
        );
    }
    Ok(())
}
