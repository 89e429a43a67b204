//! Axum middleware for bearer-token authentication.
//!
//! Protected routes get the verified [`TenantIdentity`] as a request
//! extension; handlers read it back through [`AuthenticatedTenant`].

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use hip_core::TenantIdentity;

use crate::auth::{authenticate, AuthConfig};
use crate::error::ApiError;

// ============================================================================
// MIDDLEWARE FUNCTION
// ============================================================================

/// Verify the `Authorization: Bearer <token>` header.
///
/// Missing header, wrong scheme, bad signature and expired tokens are all
/// 401. Nothing after this layer runs for an unauthenticated request.
pub async fn auth_middleware(
    State(auth): State<Arc<AuthConfig>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthMiddlewareError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let identity = authenticate(&auth, auth_header).map_err(AuthMiddlewareError)?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

/// Error wrapper for middleware that implements IntoResponse.
#[derive(Debug)]
pub struct AuthMiddlewareError(pub ApiError);

impl IntoResponse for AuthMiddlewareError {
    fn into_response(self) -> Response {
        tracing::debug!(code = %self.0.code, "Request rejected by authentication");
        self.0.into_response()
    }
}

// ============================================================================
// TYPED EXTRACTOR
// ============================================================================

/// Typed extractor for the tenant resolved by [`auth_middleware`].
///
/// Using it on a route that is not behind the middleware is a wiring bug and
/// answers 500.
#[derive(Debug, Clone)]
pub struct AuthenticatedTenant(pub TenantIdentity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedTenant
where
    S: Send + Sync,
{
    type Rejection = AuthMiddlewareError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantIdentity>()
            .cloned()
            .map(AuthenticatedTenant)
            .ok_or_else(|| {
                AuthMiddlewareError(ApiError::internal_error(
                    "Tenant identity not found in request extensions. \
                     Ensure auth_middleware is applied to this route.",
                ))
            })
    }
}

impl std::ops::Deref for AuthenticatedTenant {
    type Target = TenantIdentity;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
