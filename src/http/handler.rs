//! Main axum router and HTTP request handlers.
//!
//! Routes:
//! - `GET /{owner}/{repo}?suffixes=tar,zip` - aggregated download count
//! - `GET /healthz`                         - health check
//! - `GET /metrics`                         - Prometheus metrics

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::{error, instrument, warn};

use crate::stats::{self, RepoRef, StatsError};
use crate::AppState;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum [`Router`] with all HTTP routes and shared state.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .route("/{owner}/{repo}", get(handle_count))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query parameter types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CountQuery {
    /// Comma-separated file suffixes (e.g. `tar,zip`). When present, only
    /// assets with one of these extensions are counted.
    suffixes: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /{owner}/{repo}?suffixes=tar,zip`
///
/// Validates the inputs, aggregates the repo's release download counts, and
/// returns `{"count": "<formatted>"}`. Responses are marked cacheable so an
/// edge cache can absorb badge-polling traffic on top of our own layers.
#[instrument(skip(state, query), fields(%owner, %repo))]
async fn handle_count(
    State(state): State<Arc<AppState>>,
    Path((owner, repo)): Path<(String, String)>,
    Query(query): Query<CountQuery>,
) -> Response {
    let result = count_downloads(&state, owner, repo, query).await;

    let outcome = match &result {
        Ok(_) => "ok",
        Err(AppError::BadRequest(_)) => "bad_request",
        Err(AppError::NotFound(_)) => "not_found",
        Err(AppError::UpstreamFailed(_)) => "upstream_error",
        Err(AppError::Internal(_)) => "internal_error",
    };
    state.metrics.metrics.record_request(outcome);

    match result {
        Ok(count) => (
            StatusCode::OK,
            [(
                header::CACHE_CONTROL,
                "s-maxage=3600, stale-while-revalidate",
            )],
            Json(serde_json::json!({ "count": count })),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn count_downloads(
    state: &AppState,
    owner: String,
    repo: String,
    query: CountQuery,
) -> Result<String, AppError> {
    validate_segment("owner", &owner)?;
    validate_segment("repo", &repo)?;
    let suffixes = query
        .suffixes
        .as_deref()
        .map(parse_suffixes)
        .transpose()?;

    let repo_ref = RepoRef { owner, repo };
    let count = stats::count::count_downloads(&state.stats, &repo_ref, suffixes.as_deref()).await?;
    Ok(count)
}

/// `GET /healthz`
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health_state = crate::health::HealthState {
        api_url: state.config.upstream.api_url.clone(),
        http_client: state.http_client.clone(),
        keydb: state.keydb.clone(),
        rate_limit: state.rate_limit.clone(),
        rate_limit_buffer: state.config.upstream.rate_limit_buffer,
    };
    crate::health::health_handler(axum::extract::State(health_state)).await
}

/// `GET /metrics`
///
/// Returns Prometheus metrics. The rate-limit gauge is refreshed at scrape
/// time from the shared [`RateLimitState`].
async fn handle_metrics(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let remaining = state.rate_limit.remaining();
    if remaining != u64::MAX {
        state
            .metrics
            .metrics
            .upstream_rate_limit_remaining
            .set(remaining.min(i64::MAX as u64) as i64);
    }

    let mut buf = String::new();
    prometheus_client::encoding::text::encode(&mut buf, &state.metrics.registry)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("metrics encoding failed: {e}")))?;

    Ok((
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        buf,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Input validation
// ---------------------------------------------------------------------------

/// Validate an owner/repo path segment without contacting upstream.
fn validate_segment(what: &str, value: &str) -> Result<(), AppError> {
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{what} must not be empty")));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(AppError::BadRequest(format!(
            "{what} contains invalid characters: {value}"
        )));
    }
    Ok(())
}

/// Parse the `suffixes` query parameter into a filter set.
///
/// Splits on commas, trims whitespace, and strips one leading dot so both
/// `tar.gz` and `.tar.gz` spellings work. The parameter being present but
/// containing no usable suffix is a validation error rather than an
/// implicit fall-back to the max policy.
fn parse_suffixes(raw: &str) -> Result<Vec<String>, AppError> {
    let suffixes: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().trim_start_matches('.'))
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();

    if suffixes.is_empty() {
        return Err(AppError::BadRequest(
            "suffixes must contain at least one file extension".to_string(),
        ));
    }
    Ok(suffixes)
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Application-level error type that maps cleanly to HTTP responses. The
/// body is always a structured `{"error": ...}` payload, never a partial
/// count.
#[derive(Debug)]
pub enum AppError {
    /// Malformed request input, rejected before contacting upstream.
    BadRequest(String),
    /// The repository does not exist or is inaccessible.
    NotFound(String),
    /// The upstream API failed mid-aggregation.
    UpstreamFailed(String),
    /// An unexpected internal error (including cache-backend outages).
    Internal(anyhow::Error),
}

impl From<StatsError> for AppError {
    fn from(err: StatsError) -> Self {
        match err {
            StatsError::RepoNotFound(msg) => AppError::NotFound(msg),
            StatsError::Upstream(e) => AppError::UpstreamFailed(e.to_string()),
            StatsError::Cache(e) => AppError::Internal(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => {
                warn!(message = %msg, "rejected request");
                (StatusCode::BAD_REQUEST, msg)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::UpstreamFailed(msg) => {
                warn!(message = %msg, "upstream failure");
                (StatusCode::BAD_GATEWAY, msg)
            }
            AppError::Internal(err) => {
                error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("internal server error: {err:#}"),
                )
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
