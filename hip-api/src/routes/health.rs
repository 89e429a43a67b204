//! Health Check Endpoints
//!
//! - /health/ping - Simple liveness check
//! - /health/live - Process alive check, with version and uptime
//! - /health/ready - Shared cache connectivity, with read-through hit counts
//!
//! No authentication or admission for health endpoints.

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::facade::StoreFacade;
use crate::state::AppState;

static STARTED: Lazy<Instant> = Lazy::new(Instant::now);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub status: HealthStatus,
    pub cache: ComponentHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// GET /health/ping
async fn ping() -> &'static str {
    "pong"
}

/// GET /health/live
async fn live() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: STARTED.elapsed().as_secs(),
    })
}

/// GET /health/ready - 503 while the shared cache cannot be reached.
async fn ready(State(facade): State<Arc<StoreFacade>>) -> impl IntoResponse {
    let start = Instant::now();
    let checked = facade.check_cache().await;
    let stats = facade.cache_stats();

    let cache = match checked {
        Ok(()) => ComponentHealth {
            status: HealthStatus::Healthy,
            latency_ms: Some(u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)),
            error: None,
            hits: stats.hits,
            misses: stats.misses,
            hit_rate: stats.hit_rate(),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            ComponentHealth {
                status: HealthStatus::Unhealthy,
                latency_ms: None,
                error: Some(e.to_string()),
                hits: stats.hits,
                misses: stats.misses,
                hit_rate: stats.hit_rate(),
            }
        }
    };

    let status_code = match cache.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (
        status_code,
        Json(ReadinessResponse {
            status: cache.status,
            cache,
        }),
    )
}

/// Create the health router.
pub fn create_router() -> Router<AppState> {
    Lazy::force(&STARTED);
    Router::new()
        .route("/ping", get(ping))
        .route("/live", get(live))
        .route("/ready", get(ready))
}
