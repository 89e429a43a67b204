//! Error Types for the HIP API
//!
//! This module defines error handling for the HTTP layer:
//! - `ApiError` struct for structured error responses
//! - `ErrorCode` enum for categorizing errors
//! - `IntoResponse` implementation for Axum
//! - conversions from the facade and extractor rejections
//!
//! All errors are serialized as JSON with the status picked by their code.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hip_core::{StoreError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::facade::FacadeError;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401, 403)
    // ========================================================================
    /// Request lacks valid authentication credentials
    Unauthorized,

    /// Authentication token is invalid or malformed
    InvalidToken,

    /// Authentication token has expired
    TokenExpired,

    /// The durable request allowance of the account is used up
    QuotaExhausted,

    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Request contains invalid input data
    InvalidInput,

    /// Required field is missing from request
    MissingField,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested entity does not exist
    EntityNotFound,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// Entity with the same unique field already exists
    EntityAlreadyExists,

    /// Operation conflicts with current state
    StateConflict,

    // ========================================================================
    // Rate Limiting (429)
    // ========================================================================
    /// Request rate limit exceeded
    TooManyRequests,

    // ========================================================================
    // Server Errors (500, 503, 504)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// The primary write committed but a follow-up write failed
    PartialWrite,

    /// Service is temporarily unavailable
    ServiceUnavailable,

    /// Operation timed out
    Timeout,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized | ErrorCode::InvalidToken | ErrorCode::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }

            ErrorCode::QuotaExhausted => StatusCode::FORBIDDEN,

            ErrorCode::ValidationFailed | ErrorCode::InvalidInput | ErrorCode::MissingField => {
                StatusCode::BAD_REQUEST
            }

            ErrorCode::EntityNotFound => StatusCode::NOT_FOUND,

            ErrorCode::EntityAlreadyExists | ErrorCode::StateConflict => StatusCode::CONFLICT,

            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,

            ErrorCode::ServiceUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,

            ErrorCode::InternalError | ErrorCode::PartialWrite => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::InvalidToken => "Invalid authentication token",
            ErrorCode::TokenExpired => "Authentication token has expired",
            ErrorCode::QuotaExhausted => "Request allowance exhausted",

            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::MissingField => "Required field is missing",

            ErrorCode::EntityNotFound => "Entity not found",

            ErrorCode::EntityAlreadyExists => "Entity already exists",
            ErrorCode::StateConflict => "Operation conflicts with current state",

            ErrorCode::TooManyRequests => "Rate limit exceeded",

            ErrorCode::InternalError => "Internal server error",
            ErrorCode::PartialWrite => "Operation partially completed",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::Timeout => "Operation timed out",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response returned by every endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (offending field, affected ids)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidToken, message)
    }

    pub fn token_expired() -> Self {
        Self::from_code(ErrorCode::TokenExpired)
    }

    /// Create a QuotaExhausted error for the given provider.
    pub fn quota_exhausted(provider_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::QuotaExhausted,
            format!("Request allowance exhausted for {}", provider_id),
        )
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create an EntityNotFound error.
    pub fn entity_not_found(entity_type: &str, id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::EntityNotFound,
            format!("{} with id {} not found", entity_type, id),
        )
    }

    /// Create an EntityAlreadyExists error naming the unique field.
    pub fn already_exists(field: &str) -> Self {
        Self::new(
            ErrorCode::EntityAlreadyExists,
            format!("An account with this {} already exists", field),
        )
        .with_details(serde_json::json!({ "field": field }))
    }

    pub fn state_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StateConflict, message)
    }

    /// Create a TooManyRequests error. `reason` tells a full window apart
    /// from a suspension.
    pub fn too_many_requests(retry_after_secs: u64, reason: &str) -> Self {
        Self::new(
            ErrorCode::TooManyRequests,
            format!("Rate limit exceeded. Retry after {} seconds", retry_after_secs),
        )
        .with_details(serde_json::json!({
            "reason": reason,
            "retry_after": retry_after_secs,
        }))
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    /// Create a Timeout error.
    pub fn timeout(operation: &str) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("Operation '{}' timed out", operation),
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

/// Body rejections become 400 regardless of the rejection kind axum picked.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::invalid_input(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::invalid_input(rejection.body_text())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let code = match err {
            ValidationError::RequiredFieldMissing { .. } => ErrorCode::MissingField,
            _ => ErrorCode::ValidationFailed,
        };
        let api = ApiError::new(code, err.to_string());
        match err.field() {
            Some(field) => api.with_details(serde_json::json!({ "field": field })),
            None => api,
        }
    }
}

/// Map the facade taxonomy onto HTTP. Store internals never reach the body.
impl From<FacadeError> for ApiError {
    fn from(err: FacadeError) -> Self {
        match err {
            FacadeError::Unauthorized(message) => ApiError::unauthorized(message),
            FacadeError::QuotaExhausted { provider_id } => ApiError::quota_exhausted(provider_id),
            FacadeError::NotFound { entity, id } => ApiError::entity_not_found(&entity, id),
            FacadeError::AlreadyExists { field } => ApiError::already_exists(&field),
            FacadeError::Conflict(message) => ApiError::state_conflict(message),
            FacadeError::Validation(err) => err.into(),
            FacadeError::PartialWrite {
                operation,
                provider_id,
                health_id,
                ..
            } => {
                let mut details = serde_json::json!({
                    "operation": operation,
                    "provider_id": provider_id,
                });
                if let Some(health_id) = health_id {
                    details["health_id"] = serde_json::json!(health_id);
                }
                ApiError::new(
                    ErrorCode::PartialWrite,
                    format!("{} committed the primary write but a follow-up write failed", operation),
                )
                .with_details(details)
            }
            FacadeError::StoreUnavailable {
                operation,
                source: StoreError::Timeout { .. },
            } => ApiError::timeout(operation),
            FacadeError::StoreUnavailable { .. } => {
                ApiError::from_code(ErrorCode::ServiceUnavailable)
            }
            FacadeError::CorruptCache(_) | FacadeError::Internal { .. } => {
                ApiError::from_code(ErrorCode::InternalError)
            }
        }
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use hip_core::ProviderId;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::QuotaExhausted.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::ValidationFailed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::EntityNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::StateConflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::TooManyRequests.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ErrorCode::PartialWrite.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ErrorCode::ServiceUnavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ErrorCode::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_api_error_constructors() {
        let err = ApiError::unauthorized("Invalid credentials");
        assert_eq!(err.code, ErrorCode::Unauthorized);
        assert_eq!(err.message, "Invalid credentials");

        let err = ApiError::entity_not_found("PatientBiodata", "HID1");
        assert_eq!(err.code, ErrorCode::EntityNotFound);
        assert!(err.message.contains("HID1"));

        let err = ApiError::already_exists("email");
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.details, Some(serde_json::json!({ "field": "email" })));
    }

    #[test]
    fn test_validation_error_carries_field() {
        let err: ApiError = ValidationError::LengthOutOfRange {
            field: "issue".to_string(),
            min: 3,
            max: 20,
        }
        .into();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert_eq!(err.details, Some(serde_json::json!({ "field": "issue" })));

        let err: ApiError = ValidationError::EmptyUpdate.into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.details.is_none());
    }

    #[test]
    fn test_partial_write_details_name_provider() -> Result<(), ValidationError> {
        let err: ApiError = FacadeError::PartialWrite {
            operation: "create_provider",
            provider_id: ProviderId::new("HCID42")?,
            health_id: None,
            reason: "document store unavailable".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let details = err.details.unwrap_or_default();
        assert_eq!(details["provider_id"], "HCID42");
        assert!(details.get("health_id").is_none());
        assert!(!err.message.contains("unavailable"));
        Ok(())
    }

    #[test]
    fn test_store_unavailable_splits_on_timeout() {
        let timeout: ApiError = FacadeError::StoreUnavailable {
            operation: "get_preferences",
            source: StoreError::Timeout {
                operation: "get_preferences".to_string(),
                millis: 2000,
            },
        }
        .into();
        assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);

        let down: ApiError = FacadeError::StoreUnavailable {
            operation: "get_preferences",
            source: StoreError::Unavailable {
                reason: "connection refused".to_string(),
            },
        }
        .into();
        assert_eq!(down.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!down.message.contains("refused"));
    }

    #[test]
    fn test_error_serialization() -> Result<(), serde_json::Error> {
        let err = ApiError::too_many_requests(30, "suspended");
        let json = serde_json::to_string(&err)?;

        assert!(json.contains("TOO_MANY_REQUESTS"));
        assert!(json.contains("30 seconds"));
        assert!(json.contains(r#""reason":"suspended""#));

        let deserialized: ApiError = serde_json::from_str(&json)?;
        assert_eq!(deserialized, err);
        Ok(())
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::service_unavailable("Connection failed");
        let display = format!("{}", err);

        assert!(display.contains("ServiceUnavailable"));
        assert!(display.contains("Connection failed"));
    }
}
