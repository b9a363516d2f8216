use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::forge::rate_limit::RateLimitState;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: HealthChecks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub cache: CheckResult,
    pub upstream: CheckResult,
    pub rate_limit: CheckResult,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckResult {
    fn healthy() -> Self {
        Self {
            ok: true,
            detail: None,
        }
    }

    fn healthy_with(detail: impl Into<String>) -> Self {
        Self {
            ok: true,
            detail: Some(detail.into()),
        }
    }

    fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: Some(detail.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state expected by the handler
// ---------------------------------------------------------------------------

/// Minimal subset of `AppState` required by the health-check handler.
#[derive(Clone)]
pub struct HealthState {
    pub api_url: String,
    pub http_client: reqwest::Client,
    /// `None` when the in-memory cache backend is active.
    pub keydb: Option<fred::clients::Pool>,
    pub rate_limit: RateLimitState,
    pub rate_limit_buffer: u32,
}

// ---------------------------------------------------------------------------
// Individual checks
// ---------------------------------------------------------------------------

async fn check_cache(keydb: Option<&fred::clients::Pool>) -> CheckResult {
    match keydb {
        None => CheckResult::healthy_with("in-memory backend"),
        Some(pool) => match fred::interfaces::ClientLike::ping::<String>(pool, None).await {
            Ok(_) => CheckResult::healthy(),
            Err(e) => CheckResult::unhealthy(format!("PING failed: {e}")),
        },
    }
}

async fn check_upstream(client: &reqwest::Client, api_url: &str) -> CheckResult {
    let url = format!("{}/meta", api_url.trim_end_matches('/'));
    match client.head(&url).send().await {
        Ok(resp) if resp.status().is_success() || resp.status().is_redirection() => {
            CheckResult::healthy()
        }
        Ok(resp) => CheckResult::unhealthy(format!("HEAD {} returned {}", url, resp.status())),
        Err(e) => CheckResult::unhealthy(format!("HEAD {} failed: {e}", url)),
    }
}

fn check_rate_limit(rate_limit: &RateLimitState, buffer: u32) -> CheckResult {
    let remaining = rate_limit.remaining();
    if remaining == u64::MAX {
        // No upstream response seen yet.
        return CheckResult::healthy();
    }
    if remaining >= buffer as u64 {
        CheckResult::healthy_with(format!("{remaining} calls remaining"))
    } else {
        CheckResult::unhealthy(format!(
            "{remaining} calls remaining (buffer {buffer}), resets in {}s",
            rate_limit.reset_in_secs()
        ))
    }
}

// ---------------------------------------------------------------------------
// Aggregate status
// ---------------------------------------------------------------------------

fn aggregate_status(checks: &HealthChecks) -> HealthStatus {
    let all_ok = checks.cache.ok && checks.upstream.ok && checks.rate_limit.ok;
    // A cache-backend outage fails requests outright, so it is critical.
    let any_critical = !checks.cache.ok;

    if all_ok {
        HealthStatus::Ok
    } else if any_critical {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Degraded
    }
}

// ---------------------------------------------------------------------------
// Axum handler
// ---------------------------------------------------------------------------

/// `GET /healthz` handler. Returns 200 on Ok/Degraded, 503 on Unhealthy.
pub async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let (cache, upstream) = tokio::join!(
        check_cache(state.keydb.as_ref()),
        check_upstream(&state.http_client, &state.api_url),
    );
    let rate_limit = check_rate_limit(&state.rate_limit, state.rate_limit_buffer);

    let checks = HealthChecks {
        cache,
        upstream,
        rate_limit,
    };
    let status = aggregate_status(&checks);
    let body = HealthResponse { status, checks };

    let http_status = match status {
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok() -> CheckResult {
        CheckResult::healthy()
    }

    fn bad() -> CheckResult {
        CheckResult::unhealthy("boom")
    }

    #[test]
    fn all_ok_is_ok() {
        let checks = HealthChecks {
            cache: ok(),
            upstream: ok(),
            rate_limit: ok(),
        };
        assert_eq!(aggregate_status(&checks), HealthStatus::Ok);
    }

    #[test]
    fn cache_failure_is_unhealthy() {
        let checks = HealthChecks {
            cache: bad(),
            upstream: ok(),
            rate_limit: ok(),
        };
        assert_eq!(aggregate_status(&checks), HealthStatus::Unhealthy);
    }

    #[test]
    fn upstream_failure_is_degraded() {
        let checks = HealthChecks {
            cache: ok(),
            upstream: bad(),
            rate_limit: ok(),
        };
        assert_eq!(aggregate_status(&checks), HealthStatus::Degraded);
    }

    #[test]
    fn rate_limit_below_buffer_is_degraded() {
        let state = RateLimitState::new();
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("X-RateLimit-Remaining", "5".parse().unwrap());
        state.update_from_headers(&headers);

        let result = check_rate_limit(&state, 100);
        assert!(!result.ok);

        let checks = HealthChecks {
            cache: ok(),
            upstream: ok(),
            rate_limit: result,
        };
        assert_eq!(aggregate_status(&checks), HealthStatus::Degraded);
    }

    #[test]
    fn rate_limit_unseen_is_ok() {
        let result = check_rate_limit(&RateLimitState::new(), 100);
        assert!(result.ok);
    }
}
