//! Constants for the HIP API
//!
//! Default values live here so configuration, handlers and tests agree on
//! them.

// ============================================================================
// AUTHENTICATION
// ============================================================================

/// Default JWT token lifetime in seconds (5 days)
pub const DEFAULT_JWT_EXPIRATION_SECS: i64 = 5 * 24 * 60 * 60;

/// Default leeway applied to `exp`/`iat` checks
pub const DEFAULT_JWT_CLOCK_SKEW_SECS: u64 = 60;

/// Minimum required length for JWT secret keys
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Default bcrypt work factor
pub const DEFAULT_BCRYPT_COST: u32 = 10;

// ============================================================================
// CORS
// ============================================================================

/// Default CORS max age in seconds (24 hours)
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;

// ============================================================================
// ADMISSION
// ============================================================================

/// Requests admitted per tenant per fixed window
pub const DEFAULT_FIXED_WINDOW_LIMIT: u64 = 100;

/// Fixed window length in seconds
pub const DEFAULT_FIXED_WINDOW_SECS: u64 = 60;

/// Requests admitted per tenant per burst window
pub const DEFAULT_BURST_LIMIT: u64 = 20;

/// Burst window length in seconds
pub const DEFAULT_BURST_WINDOW_SECS: u64 = 1;

/// Cool-down applied once the burst ceiling is breached
pub const DEFAULT_SUSPENSION_SECS: u64 = 300;

// ============================================================================
// STORES
// ============================================================================

/// TTL of cached preference and profile entries
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Deadline applied to every store call
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 2000;

// ============================================================================
// PAGINATION
// ============================================================================

/// Default number of documents returned by list endpoints
pub const DEFAULT_LIST_LIMIT: usize = 5;

/// Upper bound on the `list` query parameter
pub const MAX_LIST_LIMIT: usize = 100;

// ============================================================================
// ROUTING
// ============================================================================

/// Prefix of every provider-facing route
pub const API_PREFIX: &str = "/api/v1/healthcare";

/// Requests processed concurrently before new ones wait for a slot
pub const MAX_IN_FLIGHT_REQUESTS: usize = 1024;
