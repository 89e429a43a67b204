//! Prometheus Metrics Definitions
//!
//! Defines all HIP metrics with their labels and exposes a /metrics endpoint
//! for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Store call latency buckets (seconds)
const STORE_LATENCY_BUCKETS: &[f64] =
    &[0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5];

/// Global metrics instance - initialized once on first use
pub static METRICS: Lazy<ApiResult<HipMetrics>> = Lazy::new(HipMetrics::new);

/// The registered metrics, or `None` if registration failed at startup.
pub fn metrics() -> Option<&'static HipMetrics> {
    METRICS.as_ref().ok()
}

/// Container for all HIP metrics.
#[derive(Clone)]
pub struct HipMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Admission decisions - labels: outcome (allowed/retry_next_window/suspended/error)
    pub admission_decisions_total: CounterVec,

    /// Read-through cache reads - labels: namespace, result (hit/miss/error/corrupt)
    pub cache_reads_total: CounterVec,

    /// Store calls made by the facade - labels: operation, status
    pub store_operations_total: CounterVec,

    /// Store call duration histogram - labels: operation
    pub store_operation_duration_seconds: HistogramVec,

    /// Audit events that could not be published - labels: category
    pub audit_publish_failures_total: CounterVec,
}

impl HipMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "hip_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_requests_total: {}", e)))?,

            http_request_duration_seconds: register_histogram_vec!(
                "hip_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_request_duration_seconds: {}", e)))?,

            admission_decisions_total: register_counter_vec!(
                "hip_admission_decisions_total",
                "Admission gate decisions",
                &["outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register admission_decisions_total: {}", e)))?,

            cache_reads_total: register_counter_vec!(
                "hip_cache_reads_total",
                "Read-through cache lookups",
                &["namespace", "result"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register cache_reads_total: {}", e)))?,

            store_operations_total: register_counter_vec!(
                "hip_store_operations_total",
                "Store calls issued by the facade",
                &["operation", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register store_operations_total: {}", e)))?,

            store_operation_duration_seconds: register_histogram_vec!(
                "hip_store_operation_duration_seconds",
                "Store call duration in seconds",
                &["operation"],
                STORE_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register store_operation_duration_seconds: {}", e)))?,

            audit_publish_failures_total: register_counter_vec!(
                "hip_audit_publish_failures_total",
                "Audit events dropped after a failed publish",
                &["category"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register audit_publish_failures_total: {}", e)))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_admission(&self, outcome: &str) {
        self.admission_decisions_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn record_cache_read(&self, namespace: &str, result: &str) {
        self.cache_reads_total
            .with_label_values(&[namespace, result])
            .inc();
    }

    /// Record a store call.
    pub fn record_store_operation(&self, operation: &str, success: bool, duration_secs: f64) {
        let status = if success { "success" } else { "error" };
        self.store_operations_total
            .with_label_values(&[operation, status])
            .inc();
        self.store_operation_duration_seconds
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    pub fn record_audit_failure(&self, category: &str) {
        self.audit_publish_failures_total
            .with_label_values(&[category])
            .inc();
    }
}

/// Handler for GET /metrics.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    // Registration happens lazily; touch the registry so an idle server
    // still exports the metric families.
    let _ = metrics();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
