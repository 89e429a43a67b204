//! Preference routes.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    Json,
};
use hip_core::{PreferenceUpdate, ProviderPreferences};
use serde::Serialize;

use super::{CacheParams, Cached};
use crate::error::ApiResult;
use crate::facade::StoreFacade;
use crate::middleware::AuthenticatedTenant;

#[derive(Debug, Serialize)]
pub struct PreferencesUpdated {
    pub status: &'static str,
    pub preferences: ProviderPreferences,
}

/// GET /preferences?cache=
pub async fn get_preferences(
    State(facade): State<Arc<StoreFacade>>,
    tenant: AuthenticatedTenant,
    params: Result<Query<CacheParams>, QueryRejection>,
) -> ApiResult<Json<Cached<ProviderPreferences>>> {
    let Query(params) = params?;
    let read = facade.get_preferences(&tenant, params.cache).await?;
    Ok(Json(read.into()))
}

/// PATCH /preferences
///
/// Only `email`, `is_available` and `scheduled_deletion` are accepted; any
/// other key is a 400.
pub async fn update_preferences(
    State(facade): State<Arc<StoreFacade>>,
    tenant: AuthenticatedTenant,
    payload: Result<Json<PreferenceUpdate>, JsonRejection>,
) -> ApiResult<Json<PreferencesUpdated>> {
    let Json(update) = payload?;
    let preferences = facade.change_preferences(&tenant, update).await?;
    Ok(Json(PreferencesUpdated {
        status: "Preferences updated",
        preferences,
    }))
}
