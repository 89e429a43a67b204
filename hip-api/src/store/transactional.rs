//! Relational store for identity, credentials, preferences and quota.

use async_trait::async_trait;
use deadpool_postgres::Pool;
use hip_core::{
    ClientStats, PreferenceUpdate, ProviderCredentials, ProviderId, ProviderPreferences,
    ProviderRegistration, StoreError, DEFAULT_APPOINTMENT_FEE, DEFAULT_REQUEST_QUOTA,
};
use hip_storage::TransactionalStore;
use tokio_postgres::Row;

use super::{pg_error, pool_error};

const PREFERENCES_VIEW: &str = "SELECT p.email, f.is_available, f.scheduled_deletion \
     FROM hip_providers p JOIN hip_preferences f ON f.healthcare_id = p.healthcare_id \
     WHERE p.healthcare_id = $1";

#[derive(Clone)]
pub struct PgTransactionalStore {
    pool: Pool,
}

impl PgTransactionalStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn preferences_from_row(row: &Row) -> Result<ProviderPreferences, StoreError> {
    Ok(ProviderPreferences {
        email: row.try_get("email").map_err(pg_error)?,
        is_available: row.try_get("is_available").map_err(pg_error)?,
        scheduled_deletion: row.try_get("scheduled_deletion").map_err(pg_error)?,
    })
}

#[async_trait]
impl TransactionalStore for PgTransactionalStore {
    async fn create_provider(
        &self,
        registration: &ProviderRegistration,
    ) -> Result<ProviderId, StoreError> {
        let profile = &registration.profile;
        let mut client = self.pool.get().await.map_err(pool_error)?;
        let tx = client.transaction().await.map_err(pg_error)?;

        tx.execute(
            "INSERT INTO hip_providers \
             (healthcare_id, healthcare_license, name, email, password_hash, registered_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
            &[
                &profile.provider_id.as_str(),
                &profile.license.as_str(),
                &profile.name,
                &profile.email,
                &registration.password_hash,
                &profile.registered_at,
            ],
        )
        .await
        .map_err(pg_error)?;

        tx.execute(
            "INSERT INTO hip_preferences (healthcare_id, remaining_requests, appointment_fee) \
             VALUES ($1, $2, $3)",
            &[
                &profile.provider_id.as_str(),
                &DEFAULT_REQUEST_QUOTA,
                &DEFAULT_APPOINTMENT_FEE,
            ],
        )
        .await
        .map_err(pg_error)?;

        tx.commit().await.map_err(pg_error)?;
        Ok(profile.provider_id.clone())
    }

    async fn find_credentials(
        &self,
        provider_id: &ProviderId,
    ) -> Result<ProviderCredentials, StoreError> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let row = client
            .query_opt(
                "SELECT name, email, password_hash FROM hip_providers WHERE healthcare_id = $1",
                &[&provider_id.as_str()],
            )
            .await
            .map_err(pg_error)?
            .ok_or_else(|| StoreError::not_found("provider", provider_id))?;

        Ok(ProviderCredentials {
            provider_id: provider_id.clone(),
            name: row.try_get("name").map_err(pg_error)?,
            email: row.try_get("email").map_err(pg_error)?,
            password_hash: row.try_get("password_hash").map_err(pg_error)?,
        })
    }

    async fn get_preferences(
        &self,
        provider_id: &ProviderId,
    ) -> Result<ProviderPreferences, StoreError> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let row = client
            .query_opt(PREFERENCES_VIEW, &[&provider_id.as_str()])
            .await
            .map_err(pg_error)?
            .ok_or_else(|| StoreError::not_found("provider", provider_id))?;
        preferences_from_row(&row)
    }

    async fn update_preferences(
        &self,
        provider_id: &ProviderId,
        update: &PreferenceUpdate,
    ) -> Result<ProviderPreferences, StoreError> {
        let mut client = self.pool.get().await.map_err(pool_error)?;
        let tx = client.transaction().await.map_err(pg_error)?;
        let id = provider_id.as_str();

        if let Some(email) = &update.email {
            let touched = tx
                .execute(
                    "UPDATE hip_providers SET email = $2 WHERE healthcare_id = $1",
                    &[&id, email],
                )
                .await
                .map_err(pg_error)?;
            if touched == 0 {
                return Err(StoreError::not_found("provider", provider_id));
            }
        }

        // NULL leaves a column untouched.
        let touched = tx
            .execute(
                "UPDATE hip_preferences SET \
                 is_available = COALESCE($2, is_available), \
                 scheduled_deletion = COALESCE($3, scheduled_deletion) \
                 WHERE healthcare_id = $1",
                &[&id, &update.is_available, &update.scheduled_deletion],
            )
            .await
            .map_err(pg_error)?;
        if touched == 0 {
            return Err(StoreError::not_found("provider", provider_id));
        }

        let row = tx
            .query_one(PREFERENCES_VIEW, &[&id])
            .await
            .map_err(pg_error)?;
        let view = preferences_from_row(&row)?;
        tx.commit().await.map_err(pg_error)?;
        Ok(view)
    }

    async fn remaining_requests(&self, provider_id: &ProviderId) -> Result<i64, StoreError> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let row = client
            .query_opt(
                "SELECT remaining_requests FROM hip_preferences WHERE healthcare_id = $1",
                &[&provider_id.as_str()],
            )
            .await
            .map_err(pg_error)?
            .ok_or_else(|| StoreError::not_found("provider", provider_id))?;
        row.try_get("remaining_requests").map_err(pg_error)
    }

    async fn create_client_stats(&self, stats: &ClientStats) -> Result<(), StoreError> {
        let client = self.pool.get().await.map_err(pool_error)?;
        client
            .execute(
                "INSERT INTO hip_client_stats \
                 (health_id, status, available_money, records_count, appointments_count) \
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &stats.health_id.as_str(),
                    &stats.status.as_str(),
                    &stats.available_money,
                    &stats.records_count,
                    &stats.appointments_count,
                ],
            )
            .await
            .map_err(pg_error)?;
        Ok(())
    }
}
