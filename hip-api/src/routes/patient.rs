//! Patient routes: biodata and clinical records.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::StatusCode,
    Json,
};
use hip_core::{
    BiodataUpdate, HealthId, NewPatientBiodata, NewPatientRecord, PatientBiodata, PatientRecord,
    RecordQuery, Severity,
};
use serde::{Deserialize, Serialize};

use super::list_limit;
use crate::error::ApiResult;
use crate::facade::StoreFacade;
use crate::middleware::AuthenticatedTenant;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HealthIdParams {
    pub health_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordParams {
    pub health_id: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub list: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct BiodataCreated {
    pub status: &'static str,
    pub health_id: HealthId,
}

// ============================================================================
// BIODATA
// ============================================================================

/// GET /patients/biodata?health_id=
pub async fn get_biodata(
    State(facade): State<Arc<StoreFacade>>,
    tenant: AuthenticatedTenant,
    params: Result<Query<HealthIdParams>, QueryRejection>,
) -> ApiResult<Json<PatientBiodata>> {
    let Query(params) = params?;
    let health_id = HealthId::new(params.health_id)?;
    let biodata = facade.get_patient_biodata(&tenant, &health_id).await?;
    Ok(Json(biodata))
}

/// POST /patients/biodata
pub async fn create_biodata(
    State(facade): State<Arc<StoreFacade>>,
    tenant: AuthenticatedTenant,
    payload: Result<Json<NewPatientBiodata>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<BiodataCreated>)> {
    let Json(biodata) = payload?;
    let created = facade.create_patient_biodata(&tenant, biodata).await?;
    Ok((
        StatusCode::CREATED,
        Json(BiodataCreated {
            status: "Successfully Created",
            health_id: created.health_id,
        }),
    ))
}

/// PATCH /patients/biodata?health_id=
pub async fn update_biodata(
    State(facade): State<Arc<StoreFacade>>,
    tenant: AuthenticatedTenant,
    params: Result<Query<HealthIdParams>, QueryRejection>,
    payload: Result<Json<BiodataUpdate>, JsonRejection>,
) -> ApiResult<Json<PatientBiodata>> {
    let Query(params) = params?;
    let Json(update) = payload?;
    let health_id = HealthId::new(params.health_id)?;
    let updated = facade
        .update_patient_biodata(&tenant, &health_id, update)
        .await?;
    Ok(Json(updated))
}

// ============================================================================
// RECORDS
// ============================================================================

/// POST /records
pub async fn create_record(
    State(facade): State<Arc<StoreFacade>>,
    tenant: AuthenticatedTenant,
    payload: Result<Json<NewPatientRecord>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PatientRecord>)> {
    let Json(record) = payload?;
    let record = facade.create_patient_record(&tenant, record).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /records?health_id=&severity=&list=
pub async fn get_records(
    State(facade): State<Arc<StoreFacade>>,
    tenant: AuthenticatedTenant,
    params: Result<Query<RecordParams>, QueryRejection>,
) -> ApiResult<Json<Vec<PatientRecord>>> {
    let Query(params) = params?;
    let severity = params
        .severity
        .as_deref()
        .map(str::parse::<Severity>)
        .transpose()?;
    let query = RecordQuery {
        health_id: HealthId::new(params.health_id)?,
        severity,
        limit: list_limit(params.list),
    };
    let records = facade.get_patient_records(&tenant, query).await?;
    Ok(Json(records))
}
