//! Error types for HIP operations

use thiserror::Error;

/// Backing store errors.
///
/// Every store adapter (transactional, document, cache, counter, queue)
/// reduces its driver errors to one of these variants so nothing
/// store-specific crosses a crate boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Store operation {operation} timed out after {millis}ms")]
    Timeout { operation: String, millis: u64 },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Unique constraint violated on {field}")]
    UniqueViolation { field: String },

    #[error("Backend error: {reason}")]
    Backend { reason: String },

    #[error("Serialization failed for {entity}: {reason}")]
    Serialization { entity: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Shorthand for a not-found error.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Shorthand for an opaque backend failure.
    pub fn backend(reason: impl ToString) -> Self {
        Self::Backend {
            reason: reason.to_string(),
        }
    }

    /// Whether the error means the store could not be reached in time.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Field {field} must be between {min} and {max} characters")]
    LengthOutOfRange { field: String, min: usize, max: usize },

    #[error("Update contains no changes")]
    EmptyUpdate,
}

impl ValidationError {
    /// The offending field, when the error is tied to one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::RequiredFieldMissing { field }
            | Self::InvalidValue { field, .. }
            | Self::LengthOutOfRange { field, .. } => Some(field),
            Self::EmptyUpdate => None,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all HIP errors.
#[derive(Debug, Clone, Error)]
pub enum HipError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for HIP operations.
pub type HipResult<T> = Result<T, HipError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display_not_found() {
        let err = StoreError::not_found("ProviderProfile", "HCID123");
        let msg = format!("{}", err);
        assert!(msg.contains("ProviderProfile not found"));
        assert!(msg.contains("HCID123"));
    }

    #[test]
    fn test_store_error_display_timeout() {
        let err = StoreError::Timeout {
            operation: "get_preferences".to_string(),
            millis: 2000,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("get_preferences"));
        assert!(msg.contains("2000ms"));
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_unique_violation_is_not_unavailable() {
        let err = StoreError::UniqueViolation {
            field: "email".to_string(),
        };
        assert!(!err.is_unavailable());
        assert!(format!("{}", err).contains("email"));
    }

    #[test]
    fn test_validation_error_field() {
        let err = ValidationError::LengthOutOfRange {
            field: "name".to_string(),
            min: 5,
            max: 20,
        };
        assert_eq!(err.field(), Some("name"));
        assert_eq!(ValidationError::EmptyUpdate.field(), None);
    }

    #[test]
    fn test_hip_error_from_store_error() {
        let store_err = StoreError::LockPoisoned;
        let hip_err: HipError = store_err.into();
        assert!(matches!(hip_err, HipError::Store(StoreError::LockPoisoned)));
    }

    #[test]
    fn test_hip_error_from_validation_error() {
        let hip_err: HipError = ValidationError::EmptyUpdate.into();
        let msg = format!("{}", hip_err);
        assert!(msg.contains("Validation error"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            field: "HIP_FIXED_WINDOW_LIMIT".to_string(),
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("HIP_FIXED_WINDOW_LIMIT"));
        assert!(msg.contains("must be positive"));
    }
}
