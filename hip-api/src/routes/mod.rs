//! REST API Routes Module
//!
//! Handlers are grouped by resource. Every provider-facing route lives under
//! [`API_PREFIX`]; signup and login are public, everything else runs behind
//! authentication and then admission.

pub mod account;
pub mod appointment;
pub mod health;
pub mod patient;
pub mod preferences;

use std::time::Duration;

use axum::{
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Router,
};
use hip_storage::CacheRead;
use serde::{Deserialize, Serialize};
use tower::{limit::ConcurrencyLimitLayer, ServiceBuilder};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ApiConfig;
use crate::constants::{API_PREFIX, DEFAULT_LIST_LIMIT, MAX_IN_FLIGHT_REQUESTS, MAX_LIST_LIMIT};
use crate::error::{ApiError, ApiResult};
use crate::middleware::{admission_middleware, auth_middleware};
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

// ============================================================================
// SHARED REQUEST/RESPONSE SHAPES
// ============================================================================

/// Body of a cache-backed read.
#[derive(Debug, Clone, Serialize)]
pub struct Cached<T> {
    pub data: T,
    /// Seconds until the cached copy expires; absent on a storage read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_in_secs: Option<u64>,
}

impl<T> From<CacheRead<T>> for Cached<T> {
    fn from(read: CacheRead<T>) -> Self {
        let refresh_in_secs = read.refresh_in_secs();
        Self {
            data: read.into_value(),
            refresh_in_secs,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CacheParams {
    #[serde(default = "default_use_cache")]
    pub cache: bool,
}

fn default_use_cache() -> bool {
    true
}

/// Clamp a `list` query parameter to `1..=MAX_LIST_LIMIT`.
pub fn list_limit(requested: Option<usize>) -> usize {
    requested
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT)
}

// ============================================================================
// PRODUCTION VALIDATION
// ============================================================================

fn is_production_environment() -> bool {
    std::env::var("HIP_ENVIRONMENT")
        .map(|e| matches!(e.to_lowercase().as_str(), "production" | "prod"))
        .unwrap_or(false)
}

fn validate_api_config_for_production(config: &ApiConfig) -> ApiResult<()> {
    if config.cors_origins.is_empty() {
        return Err(ApiError::invalid_input(
            "CORS origins not configured for production. Set HIP_CORS_ORIGINS.",
        ));
    }
    Ok(())
}

// ============================================================================
// SECURE ROUTER BUILDER
// ============================================================================

/// Builder for the API router with authentication and admission wired in.
///
/// Tenant routes always pass through:
/// 1. Authentication (JWT bearer token)
/// 2. Admission (fixed window, then burst)
///
/// Health and metrics are public and never admitted.
pub struct SecureRouterBuilder {
    state: AppState,
}

impl SecureRouterBuilder {
    /// In production this refuses insecure JWT or CORS settings.
    pub fn new(state: AppState) -> ApiResult<Self> {
        if is_production_environment() {
            state.auth.validate_for_production()?;
            validate_api_config_for_production(&state.config)?;
        }
        Ok(Self { state })
    }

    fn public_routes(&self) -> Router<AppState> {
        Router::new()
            .route("/auth/register", post(account::register))
            .route("/auth/login", post(account::login))
    }

    fn tenant_routes(&self) -> Router<AppState> {
        Router::new()
            .route(
                "/preferences",
                get(preferences::get_preferences).patch(preferences::update_preferences),
            )
            .route("/account", delete(account::delete_account))
            .route("/details", get(account::details))
            .route("/appointments", get(appointment::list_appointments))
            .route("/appointments/status", post(appointment::set_status))
            .route(
                "/records",
                get(patient::get_records).post(patient::create_record),
            )
            .route(
                "/patients/biodata",
                get(patient::get_biodata)
                    .post(patient::create_biodata)
                    .patch(patient::update_biodata),
            )
            // Layers run bottom-up: auth resolves the tenant, admission keys on it.
            .layer(from_fn_with_state(
                self.state.gate.clone(),
                admission_middleware,
            ))
            .layer(from_fn_with_state(self.state.auth.clone(), auth_middleware))
    }

    /// Build the complete router.
    ///
    /// # Middleware Order (outer to inner)
    /// 1. CORS
    /// 2. HTTP trace span
    /// 3. Observability (metrics and completion log)
    /// 4. Concurrency limit
    /// 5. Auth then admission, on tenant routes only
    pub fn build(self) -> Router {
        let api = self.public_routes().merge(self.tenant_routes());
        let cors = build_cors_layer(&self.state.config);

        Router::new()
            .nest(API_PREFIX, api)
            .nest("/health", health::create_router())
            .route("/metrics", get(metrics_handler))
            .with_state(self.state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(from_fn(observability_middleware))
                    .layer(ConcurrencyLimitLayer::new(MAX_IN_FLIGHT_REQUESTS)),
            )
            // Outside the trace layer so preflight responses get a plain body.
            .layer(cors)
    }
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Empty origins means development mode and every origin is allowed.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([HeaderName::from_static("retry-after")])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS: Production mode");
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        if config.cors_allow_credentials {
            cors.allow_origin(origins).allow_credentials(true)
        } else {
            cors.allow_origin(origins)
        }
    }
}

/// Create the API router with authentication, admission and observability.
pub fn create_api_router(state: AppState) -> ApiResult<Router> {
    SecureRouterBuilder::new(state).map(SecureRouterBuilder::build)
}
