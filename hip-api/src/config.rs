//! API Configuration Module
//!
//! CORS, admission thresholds, cache staleness and store deadlines. Values
//! are loaded from environment variables with development defaults.

use std::time::Duration;

use crate::admission::AdmissionConfig;
use crate::constants::{
    DEFAULT_BCRYPT_COST, DEFAULT_CACHE_TTL_SECS, DEFAULT_CORS_MAX_AGE_SECS,
    DEFAULT_STORE_TIMEOUT_MS,
};

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// API configuration for CORS, admission and store access.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Whether to allow credentials in CORS requests.
    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Admission and stores
    // ========================================================================
    /// Fixed-window and burst thresholds.
    pub admission: AdmissionConfig,

    /// TTL of cached preference and profile entries.
    pub cache_ttl: Duration,

    /// Deadline applied to every store call.
    pub store_timeout: Duration,

    /// bcrypt work factor for new passwords.
    pub bcrypt_cost: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
            admission: AdmissionConfig::default(),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `HIP_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `HIP_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `HIP_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `HIP_CACHE_TTL_SECS`: Cache entry TTL (default: 3600)
    /// - `HIP_STORE_TIMEOUT_MS`: Store call deadline (default: 2000)
    /// - `HIP_BCRYPT_COST`: bcrypt work factor (default: 10)
    /// - admission variables, see [`AdmissionConfig::from_env`]
    pub fn from_env() -> Self {
        let cors_origins = std::env::var("HIP_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_allow_credentials = std::env::var("HIP_CORS_ALLOW_CREDENTIALS")
            .ok()
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(false);

        let cors_max_age_secs = env_parse("HIP_CORS_MAX_AGE_SECS", DEFAULT_CORS_MAX_AGE_SECS);
        let cache_ttl_secs = env_parse("HIP_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS);
        let store_timeout_ms = env_parse("HIP_STORE_TIMEOUT_MS", DEFAULT_STORE_TIMEOUT_MS);
        let bcrypt_cost = env_parse("HIP_BCRYPT_COST", DEFAULT_BCRYPT_COST);

        Self {
            cors_origins,
            cors_allow_credentials,
            cors_max_age_secs,
            admission: AdmissionConfig::from_env(),
            cache_ttl: Duration::from_secs(cache_ttl_secs.max(1)),
            store_timeout: Duration::from_millis(store_timeout_ms.max(1)),
            bcrypt_cost,
        }
    }

    /// Check if running in production mode (strict CORS).
    pub fn is_production(&self) -> bool {
        !self.cors_origins.is_empty()
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }

        self.cors_origins.iter().any(|allowed| {
            if allowed == origin {
                return true;
            }
            // Wildcard subdomains: *.example.org
            if let Some(pattern) = allowed.strip_prefix("*.") {
                if let Some(origin_domain) = origin.strip_prefix("https://") {
                    return origin_domain.ends_with(&format!(".{}", pattern))
                        || origin_domain == pattern;
                }
            }
            false
        })
    }
}

/// Parse an environment variable, falling back to `default` when unset or invalid.
pub(crate) fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

// ============================================================================
// REDIS CONFIGURATION
// ============================================================================

/// Connection settings for the shared counter, cache and queue store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

impl RedisConfig {
    /// Read `HIP_REDIS_URL`.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("HIP_REDIS_URL").unwrap_or_else(|_| Self::default().url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert!(config.cors_origins.is_empty());
        assert!(!config.cors_allow_credentials);
        assert_eq!(config.cors_max_age_secs, 86400);
        assert_eq!(config.cache_ttl, Duration::from_secs(3600));
        assert_eq!(config.store_timeout, Duration::from_millis(2000));
        assert_eq!(config.admission.fixed_window_limit, 100);
    }

    #[test]
    fn test_is_production() {
        let mut config = ApiConfig::default();
        assert!(!config.is_production());

        config.cors_origins = vec!["https://portal.example.org".to_string()];
        assert!(config.is_production());
    }

    #[test]
    fn test_origin_allowed_dev_mode() {
        let config = ApiConfig::default();
        assert!(config.is_origin_allowed("https://anything.com"));
        assert!(config.is_origin_allowed("http://localhost:3000"));
    }

    #[test]
    fn test_origin_allowed_production() {
        let config = ApiConfig {
            cors_origins: vec![
                "https://portal.example.org".to_string(),
                "*.clinics.example.org".to_string(),
            ],
            ..ApiConfig::default()
        };

        assert!(config.is_origin_allowed("https://portal.example.org"));
        assert!(config.is_origin_allowed("https://north.clinics.example.org"));
        assert!(config.is_origin_allowed("https://clinics.example.org"));
        assert!(!config.is_origin_allowed("https://evilclinics.example.org"));
        assert!(!config.is_origin_allowed("https://evil.com"));
    }
}
