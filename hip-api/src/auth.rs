//! Authentication Module
//!
//! Stateless bearer-token verification for provider requests. A token is an
//! HS256 JWT carrying the provider id, email and display name; verifying it
//! is a pure function of the token, the configured secret and a clock.

use crate::constants::{
    DEFAULT_JWT_CLOCK_SKEW_SECS, DEFAULT_JWT_EXPIRATION_SECS, MIN_JWT_SECRET_LENGTH,
};
use crate::error::{ApiError, ApiResult};
use hip_core::{ConfigError, ProviderId, TenantIdentity};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const INSECURE_DEFAULT_SECRET: &str = "INSECURE_DEFAULT_SECRET_CHANGE_IN_PRODUCTION";

// ============================================================================
// CLOCK ABSTRACTION
// ============================================================================

/// Clock abstraction for JWT time validation.
///
/// Time checks are done here rather than inside `jsonwebtoken` so tests can
/// pin the clock.
pub trait JwtClock: Send + Sync {
    /// Current time as Unix epoch seconds. Negative for pre-1970 clocks.
    fn now_epoch_secs(&self) -> i64;
}

/// Production clock using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl JwtClock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Fixed clock for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl JwtClock for FixedClock {
    fn now_epoch_secs(&self) -> i64 {
        self.0
    }
}

/// Test clock helpers for common scenarios.
#[cfg(test)]
pub mod test_clocks {
    use super::FixedClock;

    /// 2024-01-01 00:00:00 UTC
    pub fn valid() -> FixedClock {
        FixedClock(1704067200)
    }

    /// 2020-01-01 00:00:00 UTC
    pub fn expired() -> FixedClock {
        FixedClock(1577836800)
    }

    /// 2030-01-01 00:00:00 UTC
    pub fn future() -> FixedClock {
        FixedClock(1893456000)
    }
}

// ============================================================================
// JWT SECRET
// ============================================================================

/// JWT signing secret that never shows up in logs.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    /// Create a new JWT secret.
    ///
    /// # Errors
    /// Returns an error if the secret is empty.
    pub fn new(secret: String) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "jwt_secret".to_string(),
            });
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    /// Expose the secret value for signing and verification only.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    /// Check if the secret is the insecure default.
    pub fn is_insecure_default(&self) -> bool {
        self.0.expose_secret() == INSECURE_DEFAULT_SECRET
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JwtSecret([REDACTED, {} chars])", self.len())
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Authentication configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// JWT secret key for signing and verification
    pub jwt_secret: JwtSecret,

    /// The only algorithm tokens may be signed with (HS256)
    pub jwt_algorithm: Algorithm,

    /// Token lifetime in seconds (default: 5 days)
    pub jwt_expiration_secs: i64,

    /// Leeway applied to `exp` and `iat` checks (default: 60)
    pub jwt_clock_skew_secs: i64,

    /// Clock for JWT time validation (injected for testing)
    pub clock: Arc<dyn JwtClock>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret)
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("jwt_expiration_secs", &self.jwt_expiration_secs)
            .field("jwt_clock_skew_secs", &self.jwt_clock_skew_secs)
            .field("clock", &"<JwtClock>")
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        let secret_str = std::env::var("HIP_JWT_SECRET")
            .unwrap_or_else(|_| INSECURE_DEFAULT_SECRET.to_string());

        Self {
            jwt_secret: build_jwt_secret(secret_str),
            jwt_algorithm: Algorithm::HS256,
            jwt_expiration_secs: DEFAULT_JWT_EXPIRATION_SECS,
            jwt_clock_skew_secs: DEFAULT_JWT_CLOCK_SKEW_SECS as i64,
            clock: Arc::new(SystemClock),
        }
    }
}

impl AuthConfig {
    /// Create authentication configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `HIP_JWT_SECRET`: JWT signing secret
    /// - `HIP_JWT_EXPIRATION_SECS`: token lifetime (default: 432000)
    /// - `HIP_JWT_CLOCK_SKEW_SECS`: clock skew tolerance (default: 60)
    pub fn from_env() -> Self {
        let secret_str = std::env::var("HIP_JWT_SECRET")
            .unwrap_or_else(|_| INSECURE_DEFAULT_SECRET.to_string());

        Self {
            jwt_secret: build_jwt_secret(secret_str),
            jwt_algorithm: Algorithm::HS256,
            jwt_expiration_secs: std::env::var("HIP_JWT_EXPIRATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_JWT_EXPIRATION_SECS),
            jwt_clock_skew_secs: std::env::var("HIP_JWT_CLOCK_SKEW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_JWT_CLOCK_SKEW_SECS as i64),
            clock: Arc::new(SystemClock),
        }
    }

    /// Build a configuration around an explicit secret and clock.
    pub fn with_secret(secret: JwtSecret, clock: Arc<dyn JwtClock>) -> Self {
        Self {
            jwt_secret: secret,
            jwt_algorithm: Algorithm::HS256,
            jwt_expiration_secs: DEFAULT_JWT_EXPIRATION_SECS,
            jwt_clock_skew_secs: DEFAULT_JWT_CLOCK_SKEW_SECS as i64,
            clock,
        }
    }

    /// Validate the authentication configuration for production use.
    ///
    /// In production (`HIP_ENVIRONMENT=production`) the insecure default and
    /// short secrets are refused. Elsewhere they only log a warning.
    pub fn validate_for_production(&self) -> ApiResult<()> {
        let environment = std::env::var("HIP_ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase();

        let is_production = environment == "production" || environment == "prod";

        if self.jwt_secret.is_insecure_default() {
            if is_production {
                return Err(ApiError::invalid_input(format!(
                    "Cannot start server in production with insecure JWT secret. \
                     Set HIP_JWT_SECRET to a secure value. HIP_ENVIRONMENT={}",
                    environment
                )));
            }
            tracing::warn!(
                "Using insecure default JWT secret. Set HIP_JWT_SECRET to a random value \
                 of at least {} characters before deploying.",
                MIN_JWT_SECRET_LENGTH
            );
        }

        if self.jwt_secret.len() < MIN_JWT_SECRET_LENGTH {
            if is_production {
                return Err(ApiError::invalid_input(format!(
                    "JWT secret is too short for production use ({} chars). \
                     It must be at least {} characters long.",
                    self.jwt_secret.len(),
                    MIN_JWT_SECRET_LENGTH
                )));
            } else if !self.jwt_secret.is_insecure_default() {
                tracing::warn!(
                    length = self.jwt_secret.len(),
                    "JWT secret is shorter than {} characters",
                    MIN_JWT_SECRET_LENGTH
                );
            }
        }

        Ok(())
    }
}

fn build_jwt_secret(secret_str: String) -> JwtSecret {
    let normalized = if secret_str.trim().is_empty() {
        INSECURE_DEFAULT_SECRET.to_string()
    } else {
        secret_str
    };

    match JwtSecret::new(normalized) {
        Ok(secret) => secret,
        Err(_) => JwtSecret(SecretString::new(INSECURE_DEFAULT_SECRET.to_string().into())),
    }
}

// ============================================================================
// JWT CLAIMS
// ============================================================================

/// Token claims. The identity claims are required and must be non-blank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "healthcareID", default)]
    pub provider_id: String,

    #[serde(rename = "healthcare_email", default)]
    pub email: String,

    #[serde(rename = "healthcare_name", default)]
    pub name: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Claims for `tenant`, issued now and expiring after `expiration_secs`.
    pub fn for_tenant(tenant: &TenantIdentity, expiration_secs: i64, clock: &dyn JwtClock) -> Self {
        let now = clock.now_epoch_secs();
        Self {
            provider_id: tenant.provider_id.as_str().to_string(),
            email: tenant.email.clone(),
            name: tenant.name.clone(),
            iat: now,
            exp: now.saturating_add(expiration_secs),
        }
    }

    /// Turn verified claims into the request identity.
    pub fn into_identity(self) -> ApiResult<TenantIdentity> {
        for (claim, value) in [
            ("healthcareID", &self.provider_id),
            ("healthcare_email", &self.email),
            ("healthcare_name", &self.name),
        ] {
            if value.trim().is_empty() {
                return Err(ApiError::invalid_token(format!(
                    "Token is missing required claim '{}'",
                    claim
                )));
            }
        }
        let provider_id = ProviderId::new(self.provider_id)
            .map_err(|_| ApiError::invalid_token("Token carries an invalid provider id"))?;
        Ok(TenantIdentity::new(provider_id, self.email, self.name))
    }
}

// ============================================================================
// TOKEN VALIDATION
// ============================================================================

/// Check `exp` and `iat` against `now` with `leeway_secs` of tolerance.
fn validate_claim_times(now: i64, exp: i64, iat: i64, leeway_secs: i64) -> ApiResult<()> {
    if iat > now.saturating_add(leeway_secs) {
        return Err(ApiError::invalid_token("Token issued in the future"));
    }

    if exp < now.saturating_sub(leeway_secs) {
        return Err(ApiError::token_expired());
    }

    Ok(())
}

/// Validate a JWT token and extract its claims.
///
/// Signature and algorithm are checked by `jsonwebtoken`; time checks use the
/// configured clock.
pub fn validate_jwt_token(config: &AuthConfig, token: &str) -> ApiResult<Claims> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.expose().as_bytes());

    let mut validation = Validation::new(config.jwt_algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.required_spec_claims = std::collections::HashSet::from(["exp".to_string()]);

    let token_data =
        decode::<Claims>(token, &decoding_key, &validation).map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::InvalidToken => {
                ApiError::invalid_token("Token is invalid")
            }
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                ApiError::invalid_token("Token signature is invalid")
            }
            jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => {
                ApiError::invalid_token("Token is signed with an unexpected algorithm")
            }
            _ => ApiError::invalid_token(format!("Token validation failed: {}", e)),
        })?;

    let claims = token_data.claims;
    let now = config.clock.now_epoch_secs();

    if now < 0 {
        tracing::error!(
            timestamp = now,
            "System clock returned pre-epoch time - server time is broken"
        );
        return Err(ApiError::internal_error(
            "Server time configuration error - please contact support",
        ));
    }

    validate_claim_times(now, claims.exp, claims.iat, config.jwt_clock_skew_secs)?;

    Ok(claims)
}

/// Verify a bare token and return the caller's identity.
pub fn verify(config: &AuthConfig, token: &str) -> ApiResult<TenantIdentity> {
    validate_jwt_token(config, token)?.into_identity()
}

/// Issue a token for `tenant`.
pub fn generate_jwt_token(config: &AuthConfig, tenant: &TenantIdentity) -> ApiResult<String> {
    let claims = Claims::for_tenant(tenant, config.jwt_expiration_secs, &*config.clock);

    let encoding_key = EncodingKey::from_secret(config.jwt_secret.expose().as_bytes());
    let header = Header::new(config.jwt_algorithm);

    encode(&header, &claims, &encoding_key)
        .map_err(|e| ApiError::internal_error(format!("Failed to generate token: {}", e)))
}

/// Authenticate from the raw `Authorization` header value.
pub fn authenticate(config: &AuthConfig, auth_header: Option<&str>) -> ApiResult<TenantIdentity> {
    let header = auth_header.ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;
    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            ApiError::invalid_token("Authorization header format must be Bearer <token>")
        })?;
    verify(config, token)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct EnvVarGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let previous = std::env::var(key).ok();
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
            Self { key, previous }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.previous.as_deref() {
                Some(value) => std::env::set_var(self.key, value),
                None => std::env::remove_var(self.key),
            }
        }
    }

    fn test_config() -> AuthConfig {
        AuthConfig::with_secret(
            JwtSecret::new("test_secret_that_is_long_enough_for_hs256".to_string())
                .expect("Test secret should be valid"),
            Arc::new(test_clocks::valid()),
        )
    }

    fn tenant() -> TenantIdentity {
        TenantIdentity::new(
            ProviderId::new("HCID123").expect("valid id"),
            "desk@clinic.org",
            "City Clinic",
        )
    }

    fn sign(claims: &serde_json::Value, algorithm: Algorithm, secret: &str) -> String {
        encode(
            &Header::new(algorithm),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("encoding should succeed")
    }

    #[test]
    fn test_round_trip_identity() -> ApiResult<()> {
        let config = test_config();
        let token = generate_jwt_token(&config, &tenant())?;
        let identity = verify(&config, &token)?;
        assert_eq!(identity, tenant());
        Ok(())
    }

    #[test]
    fn test_claim_wire_names() -> ApiResult<()> {
        let config = test_config();
        let token = generate_jwt_token(&config, &tenant())?;
        let claims = validate_jwt_token(&config, &token)?;
        let json =
            serde_json::to_value(&claims).map_err(|e| ApiError::internal_error(e.to_string()))?;
        assert_eq!(json["healthcareID"], "HCID123");
        assert_eq!(json["healthcare_email"], "desk@clinic.org");
        assert_eq!(json["healthcare_name"], "City Clinic");
        assert_eq!(claims.exp - claims.iat, DEFAULT_JWT_EXPIRATION_SECS);
        Ok(())
    }

    #[test]
    fn test_expired_token_rejected() -> ApiResult<()> {
        let mut config = test_config();
        config.clock = Arc::new(test_clocks::expired());
        let token = generate_jwt_token(&config, &tenant())?;

        config.clock = Arc::new(test_clocks::valid());
        let err = verify(&config, &token).expect_err("expired token must fail");
        assert_eq!(err.code, ErrorCode::TokenExpired);
        Ok(())
    }

    #[test]
    fn test_future_issued_token_rejected() -> ApiResult<()> {
        let mut config = test_config();
        config.clock = Arc::new(test_clocks::future());
        let token = generate_jwt_token(&config, &tenant())?;

        config.clock = Arc::new(test_clocks::valid());
        let err = verify(&config, &token).expect_err("future iat must fail");
        assert_eq!(err.code, ErrorCode::InvalidToken);
        Ok(())
    }

    #[test]
    fn test_clock_skew_tolerance() -> ApiResult<()> {
        let mut config = test_config();
        config.jwt_expiration_secs = 10;
        let token = generate_jwt_token(&config, &tenant())?;

        // 30s past expiry is inside the 60s leeway.
        config.clock = Arc::new(FixedClock(test_clocks::valid().0 + 40));
        assert!(verify(&config, &token).is_ok());

        config.clock = Arc::new(FixedClock(test_clocks::valid().0 + 100));
        assert!(verify(&config, &token).is_err());
        Ok(())
    }

    #[test]
    fn test_wrong_secret_rejected() -> ApiResult<()> {
        let config = test_config();
        let token = generate_jwt_token(&config, &tenant())?;

        let other = AuthConfig::with_secret(
            JwtSecret::new("a_completely_different_secret_value_here".to_string())
                .expect("Test secret should be valid"),
            Arc::new(test_clocks::valid()),
        );
        let err = verify(&other, &token).expect_err("foreign signature must fail");
        assert_eq!(err.code, ErrorCode::InvalidToken);
        Ok(())
    }

    #[test]
    fn test_unexpected_algorithm_rejected() {
        let config = test_config();
        let now = test_clocks::valid().0;
        let claims = serde_json::json!({
            "healthcareID": "HCID123",
            "healthcare_email": "desk@clinic.org",
            "healthcare_name": "City Clinic",
            "iat": now,
            "exp": now + 600,
        });
        let token = sign(&claims, Algorithm::HS512, config.jwt_secret.expose());
        let err = verify(&config, &token).expect_err("HS512 must be refused");
        assert_eq!(err.code, ErrorCode::InvalidToken);
    }

    #[test]
    fn test_missing_identity_claim_rejected() {
        let config = test_config();
        let now = test_clocks::valid().0;
        let claims = serde_json::json!({
            "healthcareID": "HCID123",
            "healthcare_email": "",
            "healthcare_name": "City Clinic",
            "iat": now,
            "exp": now + 600,
        });
        let token = sign(&claims, Algorithm::HS256, config.jwt_secret.expose());
        let err = verify(&config, &token).expect_err("blank email must fail");
        assert!(err.message.contains("healthcare_email"));
    }

    #[test]
    fn test_malformed_token_rejected() {
        let config = test_config();
        assert!(verify(&config, "not.a.jwt").is_err());
        assert!(verify(&config, "").is_err());
    }

    #[test]
    fn test_authenticate_header_forms() -> ApiResult<()> {
        let config = test_config();
        let token = generate_jwt_token(&config, &tenant())?;

        let missing = authenticate(&config, None).expect_err("missing header");
        assert_eq!(missing.code, ErrorCode::Unauthorized);

        let bare = authenticate(&config, Some(&token)).expect_err("no Bearer prefix");
        assert_eq!(bare.code, ErrorCode::InvalidToken);

        let empty = authenticate(&config, Some("Bearer ")).expect_err("empty token");
        assert_eq!(empty.code, ErrorCode::InvalidToken);

        let identity = authenticate(&config, Some(&format!("Bearer {}", token)))?;
        assert_eq!(identity.provider_id.as_str(), "HCID123");
        Ok(())
    }

    #[test]
    fn test_pre_epoch_clock_is_internal_error() -> ApiResult<()> {
        let mut config = test_config();
        let token = generate_jwt_token(&config, &tenant())?;
        config.clock = Arc::new(FixedClock(-1));
        let err = verify(&config, &token).expect_err("broken clock");
        assert_eq!(err.code, ErrorCode::InternalError);
        Ok(())
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = JwtSecret::new("super-secret-value".to_string()).expect("valid");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("super-secret-value"));
        assert!(debug.contains("18 chars"));
        assert!(JwtSecret::new(String::new()).is_err());
    }

    #[test]
    fn test_production_validation_allows_secure_secret() {
        let _env_lock = ENV_MUTEX.lock().expect("env mutex should not be poisoned");
        let _env_guard = EnvVarGuard::set("HIP_ENVIRONMENT", Some("production"));
        let config = AuthConfig {
            jwt_secret: JwtSecret::new(
                "this-is-a-very-secure-secret-that-is-at-least-32-characters-long".to_string(),
            )
            .expect("test secret should be valid"),
            ..Default::default()
        };

        assert!(config.validate_for_production().is_ok());
    }

    #[test]
    fn test_production_validation_rejects_insecure_default() {
        let _env_lock = ENV_MUTEX.lock().expect("env mutex should not be poisoned");
        let _env_guard = EnvVarGuard::set("HIP_ENVIRONMENT", Some("production"));
        let _secret_guard = EnvVarGuard::set("HIP_JWT_SECRET", None);
        let config = AuthConfig::default();

        assert!(config.validate_for_production().is_err());
    }

    #[test]
    fn test_production_validation_rejects_short_secret() {
        let _env_lock = ENV_MUTEX.lock().expect("env mutex should not be poisoned");
        let _env_guard = EnvVarGuard::set("HIP_ENVIRONMENT", Some("production"));
        let config = AuthConfig {
            jwt_secret: JwtSecret::new("short".to_string()).expect("test secret should be valid"),
            ..Default::default()
        };

        assert!(config.validate_for_production().is_err());
    }

    #[test]
    fn test_production_validation_allows_development() {
        let _env_lock = ENV_MUTEX.lock().expect("env mutex should not be poisoned");
        let _env_guard = EnvVarGuard::set("HIP_ENVIRONMENT", None);
        let config = AuthConfig::default();

        assert!(config.validate_for_production().is_ok());
    }
}
