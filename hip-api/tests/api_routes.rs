//! End-to-end tests for the HIP API router over in-memory stores.
//!
//! Each test builds the full router (auth, admission, observability, CORS)
//! and drives it with `oneshot` requests.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use hip_api::{
    AdmissionGate, ApiConfig, AppState, AuthConfig, BcryptHasher, JwtSecret, SecureRouterBuilder,
    StoreFacade, Stores, SystemClock,
};
use hip_core::ProviderId;
use hip_test_utils::{fixtures, MemoryStores};
use serde_json::{json, Value};
use tower::ServiceExt;

const SECRET: &str = "integration-test-secret-0123456789abcdef";
const PREFIX: &str = "/api/v1/healthcare";

// ============================================================================
// HARNESS
// ============================================================================

fn app_with(stores: &MemoryStores, config: ApiConfig) -> Router {
    let facade = StoreFacade::new(
        Stores {
            transactional: stores.transactional.clone(),
            documents: stores.documents.clone(),
            cache: stores.cache.clone(),
            audit: stores.audit.clone(),
        },
        Arc::new(BcryptHasher::new(4)),
        &config,
    );
    let gate = AdmissionGate::new(stores.counters.clone(), config.admission.clone());
    let secret = JwtSecret::new(SECRET.to_string()).expect("non-empty secret");
    let auth = AuthConfig::with_secret(secret, Arc::new(SystemClock));

    SecureRouterBuilder::new(AppState::new(facade, gate, auth, config))
        .expect("development configuration is accepted")
        .build()
}

fn app(stores: &MemoryStores) -> Router {
    app_with(stores, ApiConfig::default())
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("valid request"),
        None => builder.body(Body::empty()).expect("valid request"),
    }
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.expect("router is infallible")
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    serde_json::from_slice(&bytes).expect("JSON body")
}

/// Register the fixture provider and return its id.
async fn register(app: &Router) -> String {
    let signup = serde_json::to_value(fixtures::new_provider()).expect("serializable signup");
    let response = send(
        app,
        request(Method::POST, &format!("{PREFIX}/auth/register"), None, Some(signup)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = json_body(response).await;
    body["Healthcare_details"]["healthcare_id"]
        .as_str()
        .expect("issued id")
        .to_string()
}

async fn login(app: &Router, provider_id: &str, password: &str) -> Response {
    send(
        app,
        request(
            Method::POST,
            &format!("{PREFIX}/auth/login"),
            None,
            Some(json!({ "healthcare_id": provider_id, "password": password })),
        ),
    )
    .await
}

/// Register, log in and return the bearer token.
async fn signed_in(app: &Router) -> (String, String) {
    let provider_id = register(app).await;
    let response = login(app, &provider_id, fixtures::PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let token = body["token"].as_str().expect("token").to_string();
    (provider_id, token)
}

// ============================================================================
// ACCOUNTS
// ============================================================================

#[tokio::test]
async fn test_register_then_login() {
    let stores = MemoryStores::new();
    let app = app(&stores);

    let provider_id = register(&app).await;
    assert!(provider_id.starts_with(hip_core::PROVIDER_ID_PREFIX));

    let response = login(&app, &provider_id, fixtures::PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["healthcare_id"], json!(provider_id));
    assert_eq!(body["healthcare_name"], json!("City Clinic"));
    assert!(body["expiry"].as_i64().is_some());

    assert_eq!(
        stores.audit_categories(),
        vec!["hip:account_created", "hip:account_login"]
    );
}

#[tokio::test]
async fn test_register_rejects_invalid_body() {
    let stores = MemoryStores::new();
    let app = app(&stores);

    let response = send(
        &app,
        request(
            Method::POST,
            &format!("{PREFIX}/auth/register"),
            None,
            Some(json!({ "name": "No Email" })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_email_is_conflict() {
    let stores = MemoryStores::new();
    let app = app(&stores);
    register(&app).await;

    let signup = serde_json::to_value(fixtures::new_provider()).expect("serializable signup");
    let response = send(
        &app,
        request(Method::POST, &format!("{PREFIX}/auth/register"), None, Some(signup)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let stores = MemoryStores::new();
    let app = app(&stores);
    let provider_id = register(&app).await;

    let response = login(&app, &provider_id, "not-the-password").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = login(&app, "HCIDunknown", fixtures::PASSWORD).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_exhausted_quota_is_forbidden() {
    let stores = MemoryStores::new();
    let app = app(&stores);
    let provider_id = register(&app).await;

    let id = ProviderId::new(provider_id.clone()).expect("issued id");
    stores
        .transactional
        .set_remaining_requests(&id, 0)
        .expect("provider exists");

    let response = login(&app, &provider_id, fixtures::PASSWORD).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_profile_copy_failure_reports_partial_write() {
    let stores = MemoryStores::new();
    let app = app(&stores);
    stores.documents.set_unavailable(true);

    let signup = serde_json::to_value(fixtures::new_provider()).expect("serializable signup");
    let response = send(
        &app,
        request(Method::POST, &format!("{PREFIX}/auth/register"), None, Some(signup)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = json_body(response).await;
    assert_eq!(body["code"], json!("PARTIAL_WRITE"));
    assert!(body["details"]["provider_id"].as_str().is_some());
}

// ============================================================================
// AUTHENTICATION AND ADMISSION
// ============================================================================

#[tokio::test]
async fn test_tenant_routes_require_a_token() {
    let stores = MemoryStores::new();
    let app = app(&stores);

    let response = send(&app, request(Method::GET, &format!("{PREFIX}/preferences"), None, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(
        &app,
        request(Method::GET, &format!("{PREFIX}/preferences"), Some("garbage"), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_burst_ceiling_returns_retry_after() {
    let stores = MemoryStores::new();
    let mut config = ApiConfig::default();
    config.admission.burst_limit = 3;
    config.admission.burst_window = Duration::from_secs(60);
    let app = app_with(&stores, config);
    let (_, token) = signed_in(&app).await;

    let mut statuses = Vec::new();
    let mut last = None;
    for _ in 0..6 {
        let response = send(
            &app,
            request(Method::GET, &format!("{PREFIX}/preferences"), Some(&token), None),
        )
        .await;
        statuses.push(response.status());
        last = Some(response);
    }

    assert_eq!(statuses[0], StatusCode::OK);
    let last = last.expect("at least one response");
    assert_eq!(last.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(last.headers().contains_key(header::RETRY_AFTER));

    let body = json_body(last).await;
    assert_eq!(body["code"], json!("TOO_MANY_REQUESTS"));
    assert_eq!(body["details"]["reason"], json!("suspended"));
    assert!(body["details"]["retry_after"].as_u64().is_some_and(|secs| secs > 60));
}

#[tokio::test]
async fn test_counter_outage_fails_closed() {
    let stores = MemoryStores::new();
    let app = app(&stores);
    let (_, token) = signed_in(&app).await;

    stores.counters.set_unavailable(true);
    let response = send(
        &app,
        request(Method::GET, &format!("{PREFIX}/preferences"), Some(&token), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// ============================================================================
// PREFERENCES AND DETAILS
// ============================================================================

#[tokio::test]
async fn test_preferences_are_served_from_cache_on_second_read() {
    let stores = MemoryStores::new();
    let app = app(&stores);
    let (_, token) = signed_in(&app).await;
    let uri = format!("{PREFIX}/preferences");

    let first = json_body(send(&app, request(Method::GET, &uri, Some(&token), None)).await).await;
    assert_eq!(first["data"]["is_available"], json!(true));
    assert!(first.get("refresh_in_secs").is_none());

    let second = json_body(send(&app, request(Method::GET, &uri, Some(&token), None)).await).await;
    assert_eq!(second["data"], first["data"]);
    assert!(second["refresh_in_secs"].as_u64().is_some());

    let bypass = json_body(
        send(&app, request(Method::GET, &format!("{uri}?cache=false"), Some(&token), None)).await,
    )
    .await;
    assert!(bypass.get("refresh_in_secs").is_none());
}

#[tokio::test]
async fn test_preference_update_is_visible_on_next_read() {
    let stores = MemoryStores::new();
    let app = app(&stores);
    let (_, token) = signed_in(&app).await;
    let uri = format!("{PREFIX}/preferences");

    // Prime the cache.
    send(&app, request(Method::GET, &uri, Some(&token), None)).await;

    let response = send(
        &app,
        request(Method::PATCH, &uri, Some(&token), Some(json!({ "is_available": false }))),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(send(&app, request(Method::GET, &uri, Some(&token), None)).await).await;
    assert_eq!(body["data"]["is_available"], json!(false));
}

#[tokio::test]
async fn test_preference_update_rejects_unknown_and_empty_bodies() {
    let stores = MemoryStores::new();
    let app = app(&stores);
    let (_, token) = signed_in(&app).await;
    let uri = format!("{PREFIX}/preferences");

    let response = send(
        &app,
        request(Method::PATCH, &uri, Some(&token), Some(json!({ "remaining_requests": 1000 }))),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(&app, request(Method::PATCH, &uri, Some(&token), Some(json!({})))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cache_outage_is_service_unavailable() {
    let stores = MemoryStores::new();
    let app = app(&stores);
    let (_, token) = signed_in(&app).await;

    stores.cache.set_unavailable(true);
    let response = send(
        &app,
        request(Method::GET, &format!("{PREFIX}/details"), Some(&token), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_delete_account_schedules_deletion() {
    let stores = MemoryStores::new();
    let app = app(&stores);
    let (provider_id, token) = signed_in(&app).await;

    let response = send(
        &app,
        request(Method::DELETE, &format!("{PREFIX}/account"), Some(&token), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(
        send(&app, request(Method::GET, &format!("{PREFIX}/preferences"), Some(&token), None)).await,
    )
    .await;
    assert_eq!(body["data"]["scheduled_deletion"], json!(true));

    let details = json_body(
        send(&app, request(Method::GET, &format!("{PREFIX}/details"), Some(&token), None)).await,
    )
    .await;
    assert_eq!(details["data"]["healthcare_id"], json!(provider_id));
}

// ============================================================================
// PATIENTS, RECORDS AND APPOINTMENTS
// ============================================================================

#[tokio::test]
async fn test_biodata_lifecycle() {
    let stores = MemoryStores::new();
    let app = app(&stores);
    let (_, token) = signed_in(&app).await;
    let uri = format!("{PREFIX}/patients/biodata");

    let biodata = serde_json::to_value(fixtures::new_biodata()).expect("serializable biodata");
    let response = send(&app, request(Method::POST, &uri, Some(&token), Some(biodata))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let health_id = json_body(response).await["health_id"]
        .as_str()
        .expect("issued health id")
        .to_string();

    let fetched = send(
        &app,
        request(Method::GET, &format!("{uri}?health_id={health_id}"), Some(&token), None),
    )
    .await;
    assert_eq!(fetched.status(), StatusCode::OK);
    assert_eq!(json_body(fetched).await["fname"], json!("Asha"));

    let unchanged = send(
        &app,
        request(
            Method::PATCH,
            &format!("{uri}?health_id={health_id}"),
            Some(&token),
            Some(json!({ "bmi": "22.5" })),
        ),
    )
    .await;
    assert_eq!(unchanged.status(), StatusCode::CONFLICT);

    let updated = send(
        &app,
        request(
            Method::PATCH,
            &format!("{uri}?health_id={health_id}"),
            Some(&token),
            Some(json!({ "bmi": "23.1" })),
        ),
    )
    .await;
    assert_eq!(updated.status(), StatusCode::OK);
    assert_eq!(json_body(updated).await["bmi"], json!("23.1"));

    let missing = send(
        &app,
        request(Method::GET, &format!("{uri}?health_id=HIDnobody"), Some(&token), None),
    )
    .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_records_filter_and_validate_severity() {
    let stores = MemoryStores::new();
    let app = app(&stores);
    let (_, token) = signed_in(&app).await;
    let uri = format!("{PREFIX}/records");
    let health_id = hip_core::HealthId::generate();

    for severity in ["High", "Low", "High"] {
        let response = send(
            &app,
            request(
                Method::POST,
                &uri,
                Some(&token),
                Some(json!({
                    "health_id": health_id.as_str(),
                    "issue": "Fever",
                    "description": "Mild fever for two days",
                    "medical_severity": severity,
                })),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let high = json_body(
        send(
            &app,
            request(
                Method::GET,
                &format!("{uri}?health_id={health_id}&severity=High"),
                Some(&token),
                None,
            ),
        )
        .await,
    )
    .await;
    assert_eq!(high.as_array().map(Vec::len), Some(2));

    let limited = json_body(
        send(
            &app,
            request(Method::GET, &format!("{uri}?health_id={health_id}&list=1"), Some(&token), None),
        )
        .await,
    )
    .await;
    assert_eq!(limited.as_array().map(Vec::len), Some(1));

    let invalid = send(
        &app,
        request(
            Method::GET,
            &format!("{uri}?health_id={health_id}&severity=Catastrophic"),
            Some(&token),
            None,
        ),
    )
    .await;
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_appointment_status_change() {
    use hip_storage::DocumentStore;

    let stores = MemoryStores::new();
    let app = app(&stores);
    let (provider_id, token) = signed_in(&app).await;
    let id = ProviderId::new(provider_id).expect("issued id");

    let appointment = fixtures::appointment(&id, hip_core::HealthId::generate());
    stores
        .documents
        .insert_appointment(&appointment)
        .await
        .expect("memory insert");

    let listed = json_body(
        send(&app, request(Method::GET, &format!("{PREFIX}/appointments"), Some(&token), None)).await,
    )
    .await;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    let update = json!({
        "appointment_id": appointment.appointment_id,
        "health_id": appointment.health_id,
        "status": "Confirmed",
    });
    let uri = format!("{PREFIX}/appointments/status");

    let response = send(&app, request(Method::POST, &uri, Some(&token), Some(update.clone()))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], json!("Confirmed"));

    let repeated = send(&app, request(Method::POST, &uri, Some(&token), Some(update))).await;
    assert_eq!(repeated.status(), StatusCode::CONFLICT);
}

// ============================================================================
// PUBLIC ENDPOINTS
// ============================================================================

#[tokio::test]
async fn test_health_and_metrics_are_public() {
    let stores = MemoryStores::new();
    let app = app(&stores);

    let live = send(&app, request(Method::GET, "/health/live", None, None)).await;
    assert_eq!(live.status(), StatusCode::OK);
    assert_eq!(json_body(live).await["status"], json!("healthy"));

    let metrics = send(&app, request(Method::GET, "/metrics", None, None)).await;
    assert_eq!(metrics.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_readiness_follows_the_cache() {
    let stores = MemoryStores::new();
    let app = app(&stores);

    let ready = send(&app, request(Method::GET, "/health/ready", None, None)).await;
    assert_eq!(ready.status(), StatusCode::OK);
    let body = json_body(ready).await;
    assert_eq!(body["status"], json!("healthy"));
    assert_eq!(body["cache"]["hits"], json!(0));

    stores.cache.set_unavailable(true);
    let down = send(&app, request(Method::GET, "/health/ready", None, None)).await;
    assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(down).await;
    assert_eq!(body["cache"]["status"], json!("unhealthy"));
    assert!(body["cache"]["error"].as_str().is_some());
}

#[tokio::test]
async fn test_cors_preflight_is_answered() {
    let stores = MemoryStores::new();
    let app = app(&stores);

    let preflight = Request::builder()
        .method(Method::OPTIONS)
        .uri(format!("{PREFIX}/preferences"))
        .header(header::ORIGIN, "https://clinic.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(Body::empty())
        .expect("valid request");
    let response = send(&app, preflight).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}
