//! KeyDB / Redis cache store.
//!
//! Wraps a [`fred::clients::Pool`] configured from
//! [`crate::config::CacheConfig`], optionally enabling TLS via `rustls` and
//! reading the auth token from an environment variable. TTLs map directly
//! onto `SET ... EX`.

use anyhow::{Context, Result};
use fred::clients::Pool;
use fred::interfaces::{ClientLike, KeysInterface};
use fred::types::config::{Config as FredConfig, ReconnectPolicy, ServerConfig, TlsConnector};
use fred::types::{Builder, Expiration};

use super::CacheStore;
use crate::config::CacheConfig;

pub struct KeydbStore {
    pool: Pool,
}

impl KeydbStore {
    /// Connect to KeyDB and verify the connection with a PING.
    pub async fn connect(config: &CacheConfig) -> Result<Self> {
        let endpoint = config
            .keydb_endpoint
            .as_deref()
            .context("cache.keydb_endpoint is not configured")?;
        let auth_token = std::env::var(&config.keydb_auth_token_env).ok();

        // The endpoint may carry a `rediss://` or `redis://` scheme prefix.
        let endpoint = endpoint
            .trim_start_matches("rediss://")
            .trim_start_matches("redis://");
        let (host, port) = parse_host_port(endpoint)?;

        let mut fred_config = FredConfig {
            server: ServerConfig::new_centralized(host, port),
            ..FredConfig::default()
        };

        if config.keydb_tls {
            fred_config.tls = Some(TlsConnector::default_rustls()?.into());
        }

        if let Some(ref token) = auth_token {
            fred_config.password = Some(token.clone());
        }

        let mut builder = Builder::from_config(fred_config);
        builder.set_policy(ReconnectPolicy::new_exponential(0, 100, 30_000, 2));

        let pool = builder
            .build_pool(3)
            .context("failed to build KeyDB connection pool")?;
        pool.init().await.context("failed to connect to KeyDB")?;

        let _: String = pool
            .ping(None)
            .await
            .context("KeyDB PING failed after connect")?;

        tracing::info!(host, port, tls = config.keydb_tls, "KeyDB pool initialised");
        Ok(Self { pool })
    }

    /// Underlying pool, used by the health check for PING.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl CacheStore for KeydbStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = self.pool.get(key).await.context("KeyDB GET failed")?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let _: () = self
            .pool
            .set(
                key,
                value,
                Some(Expiration::EX(ttl_secs as i64)),
                None,
                false,
            )
            .await
            .context("KeyDB SET failed")?;
        Ok(())
    }
}

/// Parse a `host:port` string. If the port is omitted, defaults to `6379`.
pub fn parse_host_port(endpoint: &str) -> Result<(&str, u16)> {
    // Strip any trailing path segments (e.g. from URIs).
    let endpoint = endpoint.split('/').next().unwrap_or(endpoint);

    if let Some((host, port_str)) = endpoint.rsplit_once(':') {
        let port: u16 = port_str
            .parse()
            .with_context(|| format!("invalid port in endpoint: {endpoint}"))?;
        Ok((host, port))
    } else {
        Ok((endpoint, 6379))
    }
}
