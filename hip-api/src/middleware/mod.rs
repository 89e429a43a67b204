//! Middleware modules for the HIP API
//!
//! - `auth`: bearer-token verification, injects [`TenantIdentity`]
//! - `admission`: per-tenant admission gate, 429 with `Retry-After`
//! - `client_ip`: caller address for audit events
//!
//! # Middleware Order
//!
//! ```ignore
//! Router::new()
//!     .route("/preferences", get(handler))
//!     // Innermost: needs the tenant the auth layer resolved
//!     .layer(middleware::from_fn_with_state(gate, admission_middleware))
//!     // Outermost: nothing reaches the gate without a verified token
//!     .layer(middleware::from_fn_with_state(auth, auth_middleware))
//! ```
//!
//! [`TenantIdentity`]: hip_core::TenantIdentity

mod admission;
mod auth;
mod client_ip;

pub use admission::{admission_middleware, admit, AdmissionRejection, RateLimitError};
pub use auth::{auth_middleware, AuthMiddlewareError, AuthenticatedTenant};
pub use client_ip::ClientIp;
