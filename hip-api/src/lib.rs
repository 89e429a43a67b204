//! HIP API - Access layer for the healthcare provider backend
//!
//! Every request passes authentication and per-tenant admission before it
//! reaches the [`StoreFacade`], the only component that talks to the
//! counter, cache, relational, document and audit stores.

pub mod admission;
pub mod auth;
pub mod config;
pub mod constants;
pub mod error;
pub mod facade;
pub mod macros;
pub mod middleware;
pub mod password;
pub mod routes;
pub mod state;
pub mod store;
pub mod telemetry;

// Re-export commonly used types
pub use admission::{Admission, AdmissionConfig, AdmissionError, AdmissionGate, Denial, DenialKind};
pub use auth::{
    authenticate, generate_jwt_token, validate_jwt_token, verify, AuthConfig, Claims, FixedClock,
    JwtClock, JwtSecret, SystemClock,
};
pub use config::{ApiConfig, RedisConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use facade::{FacadeError, StoreFacade, Stores};
pub use middleware::{auth_middleware, AuthenticatedTenant, ClientIp};
pub use password::{BcryptHasher, PasswordError, PasswordHasher};
pub use routes::{create_api_router, SecureRouterBuilder};
pub use state::AppState;
pub use store::{DbConfig, PgDocumentStore, PgTransactionalStore};
