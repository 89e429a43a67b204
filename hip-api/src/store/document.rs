//! JSONB document store for clinical documents and provider profiles.
//!
//! Each document is stored whole in a `doc` column; the columns beside it
//! exist only for filtering and ordering.

use async_trait::async_trait;
use deadpool_postgres::Pool;
use hip_core::{
    Appointment, AppointmentStatusUpdate, BiodataUpdate, HealthId, PatientBiodata, PatientRecord,
    ProviderId, ProviderProfile, RecordQuery, StoreError, Timestamp,
};
use hip_storage::{DocumentStore, UpdateOutcome};

use super::{decode, encode, pg_error, pool_error};

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: Pool,
}

impl PgDocumentStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn put_provider_profile(&self, profile: &ProviderProfile) -> Result<(), StoreError> {
        let doc = encode("provider profile", profile)?;
        let client = self.pool.get().await.map_err(pool_error)?;
        client
            .execute(
                "INSERT INTO hip_provider_profiles (healthcare_id, doc) VALUES ($1, $2) \
                 ON CONFLICT (healthcare_id) DO UPDATE SET doc = EXCLUDED.doc",
                &[&profile.provider_id.as_str(), &doc],
            )
            .await
            .map_err(pg_error)?;
        Ok(())
    }

    async fn get_provider_profile(
        &self,
        provider_id: &ProviderId,
    ) -> Result<Option<ProviderProfile>, StoreError> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let row = client
            .query_opt(
                "SELECT doc FROM hip_provider_profiles WHERE healthcare_id = $1",
                &[&provider_id.as_str()],
            )
            .await
            .map_err(pg_error)?;
        row.map(|row| decode("provider profile", row.try_get("doc").map_err(pg_error)?))
            .transpose()
    }

    async fn set_profile_email(
        &self,
        provider_id: &ProviderId,
        email: &str,
    ) -> Result<UpdateOutcome<ProviderProfile>, StoreError> {
        let mut client = self.pool.get().await.map_err(pool_error)?;
        let tx = client.transaction().await.map_err(pg_error)?;

        let Some(row) = tx
            .query_opt(
                "SELECT doc FROM hip_provider_profiles WHERE healthcare_id = $1 FOR UPDATE",
                &[&provider_id.as_str()],
            )
            .await
            .map_err(pg_error)?
        else {
            return Ok(UpdateOutcome::NoMatch);
        };

        let mut profile: ProviderProfile =
            decode("provider profile", row.try_get("doc").map_err(pg_error)?)?;
        if profile.email == email {
            return Ok(UpdateOutcome::Unchanged);
        }
        profile.email = email.to_string();

        let doc = encode("provider profile", &profile)?;
        tx.execute(
            "UPDATE hip_provider_profiles SET doc = $2 WHERE healthcare_id = $1",
            &[&provider_id.as_str(), &doc],
        )
        .await
        .map_err(pg_error)?;
        tx.commit().await.map_err(pg_error)?;
        Ok(UpdateOutcome::Updated(profile))
    }

    async fn insert_biodata(&self, biodata: &PatientBiodata) -> Result<(), StoreError> {
        let doc = encode("biodata", biodata)?;
        let client = self.pool.get().await.map_err(pool_error)?;
        client
            .execute(
                "INSERT INTO hip_biodata (health_id, doc) VALUES ($1, $2)",
                &[&biodata.health_id.as_str(), &doc],
            )
            .await
            .map_err(pg_error)?;
        Ok(())
    }

    async fn get_biodata(
        &self,
        health_id: &HealthId,
    ) -> Result<Option<PatientBiodata>, StoreError> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let row = client
            .query_opt(
                "SELECT doc FROM hip_biodata WHERE health_id = $1",
                &[&health_id.as_str()],
            )
            .await
            .map_err(pg_error)?;
        row.map(|row| decode("biodata", row.try_get("doc").map_err(pg_error)?))
            .transpose()
    }

    async fn update_biodata(
        &self,
        health_id: &HealthId,
        update: &BiodataUpdate,
        now: Timestamp,
    ) -> Result<UpdateOutcome<PatientBiodata>, StoreError> {
        let mut client = self.pool.get().await.map_err(pool_error)?;
        let tx = client.transaction().await.map_err(pg_error)?;

        let Some(row) = tx
            .query_opt(
                "SELECT doc FROM hip_biodata WHERE health_id = $1 FOR UPDATE",
                &[&health_id.as_str()],
            )
            .await
            .map_err(pg_error)?
        else {
            return Ok(UpdateOutcome::NoMatch);
        };

        let mut biodata: PatientBiodata = decode("biodata", row.try_get("doc").map_err(pg_error)?)?;
        if !update.merge_into(&mut biodata, now) {
            return Ok(UpdateOutcome::Unchanged);
        }

        let doc = encode("biodata", &biodata)?;
        tx.execute(
            "UPDATE hip_biodata SET doc = $2 WHERE health_id = $1",
            &[&health_id.as_str(), &doc],
        )
        .await
        .map_err(pg_error)?;
        tx.commit().await.map_err(pg_error)?;
        Ok(UpdateOutcome::Updated(biodata))
    }

    async fn insert_record(&self, record: &PatientRecord) -> Result<(), StoreError> {
        let doc = encode("patient record", record)?;
        let client = self.pool.get().await.map_err(pool_error)?;
        client
            .execute(
                "INSERT INTO hip_records (record_id, health_id, severity, created_at, doc) \
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &record.record_id.0,
                    &record.health_id.as_str(),
                    &record.medical_severity.as_str(),
                    &record.created_at,
                    &doc,
                ],
            )
            .await
            .map_err(pg_error)?;
        Ok(())
    }

    async fn list_records(&self, query: &RecordQuery) -> Result<Vec<PatientRecord>, StoreError> {
        let severity = query.severity.map(|s| s.as_str());
        let client = self.pool.get().await.map_err(pool_error)?;
        let rows = client
            .query(
                "SELECT doc FROM hip_records \
                 WHERE health_id = $1 AND ($2::TEXT IS NULL OR severity = $2) \
                 ORDER BY created_at DESC, record_id DESC LIMIT $3",
                &[&query.health_id.as_str(), &severity, &limit_param(query.limit)],
            )
            .await
            .map_err(pg_error)?;
        rows.iter()
            .map(|row| decode("patient record", row.try_get("doc").map_err(pg_error)?))
            .collect()
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let doc = encode("appointment", appointment)?;
        let provider = appointment.provider_id.as_ref().map(|p| p.as_str());
        let client = self.pool.get().await.map_err(pool_error)?;
        client
            .execute(
                "INSERT INTO hip_appointments \
                 (appointment_id, healthcare_id, health_id, created_at, doc) \
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &appointment.appointment_id.0,
                    &provider,
                    &appointment.health_id.as_str(),
                    &appointment.created_at,
                    &doc,
                ],
            )
            .await
            .map_err(pg_error)?;
        Ok(())
    }

    async fn list_appointments(
        &self,
        provider_id: &ProviderId,
        limit: usize,
    ) -> Result<Vec<Appointment>, StoreError> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let rows = client
            .query(
                "SELECT doc FROM hip_appointments WHERE healthcare_id = $1 \
                 ORDER BY created_at DESC, appointment_id DESC LIMIT $2",
                &[&provider_id.as_str(), &limit_param(limit)],
            )
            .await
            .map_err(pg_error)?;
        rows.iter()
            .map(|row| decode("appointment", row.try_get("doc").map_err(pg_error)?))
            .collect()
    }

    async fn set_appointment_status(
        &self,
        provider_id: &ProviderId,
        update: &AppointmentStatusUpdate,
    ) -> Result<UpdateOutcome<Appointment>, StoreError> {
        let mut client = self.pool.get().await.map_err(pool_error)?;
        let tx = client.transaction().await.map_err(pg_error)?;

        let Some(row) = tx
            .query_opt(
                "SELECT doc FROM hip_appointments \
                 WHERE appointment_id = $1 AND health_id = $2 AND healthcare_id = $3 \
                 FOR UPDATE",
                &[
                    &update.appointment_id.0,
                    &update.health_id.as_str(),
                    &provider_id.as_str(),
                ],
            )
            .await
            .map_err(pg_error)?
        else {
            return Ok(UpdateOutcome::NoMatch);
        };

        let mut appointment: Appointment =
            decode("appointment", row.try_get("doc").map_err(pg_error)?)?;
        if appointment.status == update.status {
            return Ok(UpdateOutcome::Unchanged);
        }
        appointment.status = update.status;

        let doc = encode("appointment", &appointment)?;
        tx.execute(
            "UPDATE hip_appointments SET doc = $2 WHERE appointment_id = $1",
            &[&update.appointment_id.0, &doc],
        )
        .await
        .map_err(pg_error)?;
        tx.commit().await.map_err(pg_error)?;
        Ok(UpdateOutcome::Updated(appointment))
    }
}
