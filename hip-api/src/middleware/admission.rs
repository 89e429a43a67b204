//! Admission middleware: runs the per-tenant gate after authentication.

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use hip_core::{ProviderId, TenantIdentity};

use crate::admission::{Admission, AdmissionGate, DenialKind};
use crate::error::ApiError;

/// Request turned away by the admission gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitError {
    pub kind: DenialKind,
    /// Seconds until the tenant may retry
    pub retry_after: u64,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let error = ApiError::too_many_requests(self.retry_after, self.kind.as_str());
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(error)).into_response();
        response.headers_mut().insert(
            header::RETRY_AFTER,
            HeaderValue::from_str(&self.retry_after.to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("60")),
        );
        response
    }
}

/// Anything that stops a request before its handler runs: a rate denial, or
/// an API error raised while deciding.
#[derive(Debug)]
pub enum AdmissionRejection {
    Limited(RateLimitError),
    Api(ApiError),
}

impl From<ApiError> for AdmissionRejection {
    fn from(err: ApiError) -> Self {
        AdmissionRejection::Api(err)
    }
}

impl IntoResponse for AdmissionRejection {
    fn into_response(self) -> Response {
        match self {
            AdmissionRejection::Limited(limited) => limited.into_response(),
            AdmissionRejection::Api(err) => err.into_response(),
        }
    }
}

/// Consult the gate for `tenant`. A counter-store failure is a 503, never an
/// admission.
pub async fn admit(gate: &AdmissionGate, tenant: &ProviderId) -> Result<(), AdmissionRejection> {
    match gate.admit(tenant).await {
        Ok(Admission::Allowed) => Ok(()),
        Ok(Admission::Denied(denial)) => Err(AdmissionRejection::Limited(RateLimitError {
            kind: denial.kind,
            retry_after: denial.retry_after_secs(),
        })),
        Err(err) => {
            tracing::error!(tenant = %tenant, error = %err, "Admission check failed, denying");
            Err(AdmissionRejection::Api(ApiError::service_unavailable(
                "Admission check unavailable, try again shortly",
            )))
        }
    }
}

/// Gate every authenticated request by its tenant.
pub async fn admission_middleware(
    State(gate): State<AdmissionGate>,
    request: Request,
    next: Next,
) -> Result<Response, AdmissionRejection> {
    let tenant = request
        .extensions()
        .get::<TenantIdentity>()
        .map(|identity| identity.provider_id.clone())
        .ok_or_else(|| {
            ApiError::internal_error(
                "Tenant identity not found in request extensions. \
                 Ensure auth_middleware runs before admission_middleware.",
            )
        })?;

    admit(&gate, &tenant).await?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::AdmissionConfig;
    use axum::{body::Body, http::Request, middleware, routing::get, Extension, Router};
    use hip_storage::MemoryCounterStore;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(store: Arc<MemoryCounterStore>, limit: u64) -> Router {
        let gate = AdmissionGate::new(
            store,
            AdmissionConfig {
                fixed_window_limit: limit,
                ..AdmissionConfig::default()
            },
        );
        let tenant = TenantIdentity::new(
            ProviderId::new("HCID123").expect("valid id"),
            "desk@clinic.org",
            "City Clinic",
        );
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(gate, admission_middleware))
            .layer(Extension(tenant))
    }

    fn get_root() -> Request<Body> {
        Request::builder().uri("/").body(Body::empty()).expect("request")
    }

    #[tokio::test]
    async fn test_denial_carries_retry_after() {
        let app = app(Arc::new(MemoryCounterStore::new()), 1);

        let first = app.clone().oneshot(get_root()).await.expect("response");
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(get_root()).await.expect("response");
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after = second
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .expect("retry-after header");
        assert!((1..=60).contains(&retry_after));

        let bytes = axum::body::to_bytes(second.into_body(), usize::MAX)
            .await
            .expect("body");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(body["details"]["reason"], "retry_next_window");
        assert_eq!(body["details"]["retry_after"], retry_after);
    }

    #[tokio::test]
    async fn test_counter_outage_is_503() {
        let store = Arc::new(MemoryCounterStore::new());
        store.set_unavailable(true);

        let response = app(store, 100).oneshot(get_root()).await.expect("response");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_missing_tenant_is_a_wiring_error() {
        let gate = AdmissionGate::new(
            Arc::new(MemoryCounterStore::new()),
            AdmissionConfig::default(),
        );
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(gate, admission_middleware));

        let response = app.oneshot(get_root()).await.expect("response");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
