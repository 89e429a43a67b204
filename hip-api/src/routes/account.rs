//! Account routes: signup, login, deletion and the provider profile.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::StatusCode,
    Json,
};
use hip_core::{License, NewProvider, ProviderId, ProviderProfile};
use serde::{Deserialize, Serialize};

use super::{CacheParams, Cached};
use crate::auth::generate_jwt_token;
use crate::error::{ApiError, ApiResult};
use crate::facade::StoreFacade;
use crate::middleware::{admit, AdmissionRejection, AuthenticatedTenant, ClientIp};
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub status: &'static str,
    #[serde(rename = "Healthcare_details")]
    pub details: RegisteredProvider,
}

#[derive(Debug, Serialize)]
pub struct RegisteredProvider {
    pub healthcare_id: ProviderId,
    pub healthcare_license: License,
    pub name: String,
    pub email: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub healthcare_id: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    /// Unix epoch seconds at which the token stops being accepted.
    pub expiry: i64,
    pub healthcare_id: ProviderId,
    pub healthcare_name: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// POST /auth/register
pub async fn register(
    State(facade): State<Arc<StoreFacade>>,
    ClientIp(ip): ClientIp,
    payload: Result<Json<NewProvider>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let Json(signup) = payload?;
    let profile = facade
        .create_provider(signup, ip.map(|ip| ip.to_string()))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            status: "Successfully Created",
            details: RegisteredProvider {
                healthcare_id: profile.provider_id,
                healthcare_license: profile.license,
                name: profile.name,
                email: profile.email,
            },
        }),
    ))
}

/// POST /auth/login
///
/// Public, so the gate is keyed by the claimed id before credentials are
/// looked at.
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AdmissionRejection> {
    let Json(request) = payload.map_err(ApiError::from)?;
    let provider_id = ProviderId::new(request.healthcare_id).map_err(ApiError::from)?;

    admit(&state.gate, &provider_id).await?;

    let identity = state
        .facade
        .authenticate(&provider_id, &request.password)
        .await
        .map_err(ApiError::from)?;
    let token = generate_jwt_token(&state.auth, &identity)?;
    let expiry = state.auth.clock.now_epoch_secs() + state.auth.jwt_expiration_secs;

    tracing::info!(tenant = %identity.provider_id, "Provider logged in");
    Ok(Json(LoginResponse {
        token,
        expiry,
        healthcare_id: identity.provider_id,
        healthcare_name: identity.name,
    }))
}

/// DELETE /account
pub async fn delete_account(
    State(facade): State<Arc<StoreFacade>>,
    tenant: AuthenticatedTenant,
) -> ApiResult<Json<StatusResponse>> {
    facade.delete_account(&tenant).await?;
    Ok(Json(StatusResponse {
        status: "Account scheduled for deletion",
    }))
}

/// GET /details?cache=
pub async fn details(
    State(facade): State<Arc<StoreFacade>>,
    tenant: AuthenticatedTenant,
    params: Result<Query<CacheParams>, QueryRejection>,
) -> ApiResult<Json<Cached<ProviderProfile>>> {
    let Query(params) = params?;
    let read = facade.get_provider_details(&tenant, params.cache).await?;
    Ok(Json(read.into()))
}
