mod cache;
mod config;
mod forge;
mod health;
mod http;
mod metrics;
mod stats;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::cache::keydb::KeydbStore;
use crate::cache::memory::MemoryStore;
use crate::cache::CacheStore;
use crate::config::{CacheBackend, Config};
use crate::forge::github::GitHubClient;
use crate::forge::rate_limit::RateLimitState;
use crate::metrics::MetricsRegistry;
use crate::stats::StatsContext;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "downtally", about = "Release download statistics service")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "/etc/downtally/config.yaml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Global state shared across all request handlers. The cache store and
/// forge client are created once at startup and live for the process
/// lifetime; every request borrows them through [`StatsContext`].
pub struct AppState {
    pub config: Arc<Config>,
    pub stats: StatsContext,
    pub http_client: reqwest::Client,
    /// Present only when the KeyDB cache backend is active; used by the
    /// health endpoint for PING.
    pub keydb: Option<fred::clients::Pool>,
    pub rate_limit: RateLimitState,
    pub metrics: MetricsRegistry,
}

// ---------------------------------------------------------------------------
// Cache store setup
// ---------------------------------------------------------------------------

async fn build_cache_store(
    config: &Config,
) -> Result<(Arc<dyn CacheStore>, Option<fred::clients::Pool>)> {
    match config.cache.backend {
        CacheBackend::Memory => {
            tracing::info!("using in-memory cache backend");
            Ok((Arc::new(MemoryStore::new()), None))
        }
        CacheBackend::Keydb => {
            let store = KeydbStore::connect(&config.cache).await?;
            let pool = store.pool().clone();
            Ok((Arc::new(store), Some(pool)))
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP server (axum)
// ---------------------------------------------------------------------------

async fn run_http_server(state: Arc<AppState>) -> Result<()> {
    let listen_addr: std::net::SocketAddr = state
        .config
        .server
        .http_listen
        .parse()
        .context("invalid http_listen address")?;

    let app = http::handler::create_router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {listen_addr}"))?;

    tracing::info!(%listen_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // ---- CLI ----
    let cli = Cli::parse();

    // ---- Config ----
    let config = config::load_config(&cli.config)?;
    let config = Arc::new(config);

    // ---- Tracing ----
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!(config_path = %cli.config, "starting downtally");

    // ---- Infrastructure clients ----
    let (cache_store, keydb) = build_cache_store(&config).await?;

    let http_client = reqwest::Client::builder()
        .user_agent("downtally/0.1")
        .build()
        .context("failed to build reqwest client")?;

    let forge_client = GitHubClient::new(&config.upstream, http_client.clone());
    let rate_limit = forge_client.rate_limit().clone();
    tracing::info!(api_url = %config.upstream.api_url, "forge client initialised");

    // ---- Metrics ----
    let metrics = MetricsRegistry::new();

    // ---- App state ----
    let stats = StatsContext {
        cache: cache_store,
        forge: Arc::new(forge_client),
        ttl: config.ttl.clone(),
        per_page: config.upstream.per_page,
        metrics: Arc::clone(&metrics.metrics),
    };

    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        stats,
        http_client,
        keydb,
        rate_limit,
        metrics,
    });

    // ---- Serve ----
    run_http_server(state).await?;

    tracing::info!("downtally shut down cleanly");
    Ok(())
}
