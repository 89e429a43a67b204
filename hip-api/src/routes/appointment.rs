//! Appointment routes.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    Json,
};
use hip_core::{Appointment, AppointmentStatusUpdate};
use serde::Deserialize;

use super::list_limit;
use crate::error::ApiResult;
use crate::facade::StoreFacade;
use crate::middleware::AuthenticatedTenant;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub list: Option<usize>,
}

/// GET /appointments?list=
pub async fn list_appointments(
    State(facade): State<Arc<StoreFacade>>,
    tenant: AuthenticatedTenant,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<Vec<Appointment>>> {
    let Query(params) = params?;
    let appointments = facade
        .get_appointments(&tenant, list_limit(params.list))
        .await?;
    Ok(Json(appointments))
}

/// POST /appointments/status
pub async fn set_status(
    State(facade): State<Arc<StoreFacade>>,
    tenant: AuthenticatedTenant,
    payload: Result<Json<AppointmentStatusUpdate>, JsonRejection>,
) -> ApiResult<Json<Appointment>> {
    let Json(update) = payload?;
    let appointment = facade.set_appointment_status(&tenant, update).await?;
    Ok(Json(appointment))
}
