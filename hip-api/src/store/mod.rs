//! PostgreSQL-backed system-of-record stores.
//!
//! The relational tables hold identity, credentials, preferences and quota;
//! JSONB tables hold the clinical documents and the denormalized profile.
//! Both sides share one deadpool connection pool.

mod config;
mod document;
mod transactional;

pub use config::DbConfig;
pub use document::PgDocumentStore;
pub use transactional::PgTransactionalStore;

use deadpool_postgres::{Pool, PoolError};
use hip_core::StoreError;
use tokio_postgres::error::SqlState;

/// Tables and indexes both stores expect. Idempotent.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS hip_providers (
    healthcare_id      TEXT PRIMARY KEY,
    healthcare_license TEXT NOT NULL,
    name               TEXT NOT NULL,
    email              TEXT NOT NULL,
    password_hash      TEXT NOT NULL,
    registered_at      TIMESTAMPTZ NOT NULL,
    CONSTRAINT hip_providers_license_key UNIQUE (healthcare_license)
);
CREATE UNIQUE INDEX IF NOT EXISTS hip_providers_email_key ON hip_providers (lower(email));

CREATE TABLE IF NOT EXISTS hip_preferences (
    healthcare_id      TEXT PRIMARY KEY REFERENCES hip_providers (healthcare_id) ON DELETE CASCADE,
    is_available              BOOLEAN NOT NULL DEFAULT TRUE,
    scheduled_deletion        BOOLEAN NOT NULL DEFAULT FALSE,
    account_locked            BOOLEAN NOT NULL DEFAULT FALSE,
    remaining_requests        BIGINT NOT NULL,
    appointment_fee           BIGINT NOT NULL,
    biodata_viewed_count      BIGINT NOT NULL DEFAULT 0,
    health_ids_created_count  BIGINT NOT NULL DEFAULT 0,
    records_created_count     BIGINT NOT NULL DEFAULT 0,
    records_viewed_count      BIGINT NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS hip_client_stats (
    health_id          TEXT PRIMARY KEY,
    status             TEXT NOT NULL,
    available_money    BIGINT NOT NULL,
    records_count      BIGINT NOT NULL,
    appointments_count BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS hip_provider_profiles (
    healthcare_id TEXT PRIMARY KEY,
    doc           JSONB NOT NULL
);

CREATE TABLE IF NOT EXISTS hip_biodata (
    health_id TEXT PRIMARY KEY,
    doc       JSONB NOT NULL
);

CREATE TABLE IF NOT EXISTS hip_records (
    record_id  UUID PRIMARY KEY,
    health_id  TEXT NOT NULL,
    severity   TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    doc        JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS hip_records_health_idx ON hip_records (health_id, created_at DESC);

CREATE TABLE IF NOT EXISTS hip_appointments (
    appointment_id UUID PRIMARY KEY,
    healthcare_id  TEXT,
    health_id      TEXT NOT NULL,
    created_at     TIMESTAMPTZ NOT NULL,
    doc            JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS hip_appointments_provider_idx ON hip_appointments (healthcare_id, created_at DESC);
"#;

/// Apply [`SCHEMA`].
pub async fn migrate(pool: &Pool) -> Result<(), StoreError> {
    let client = pool.get().await.map_err(pool_error)?;
    client.batch_execute(SCHEMA).await.map_err(pg_error)?;
    tracing::info!("Database schema is up to date");
    Ok(())
}

pub(crate) fn pool_error(e: PoolError) -> StoreError {
    match e {
        PoolError::Backend(e) => pg_error(e),
        other => StoreError::Unavailable {
            reason: other.to_string(),
        },
    }
}

/// Reduce a driver error to [`StoreError`]. Unique violations name the
/// offending field, derived from the constraint name.
pub(crate) fn pg_error(e: tokio_postgres::Error) -> StoreError {
    if e.is_closed() {
        return StoreError::Unavailable {
            reason: e.to_string(),
        };
    }
    if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        let constraint = e
            .as_db_error()
            .and_then(|db| db.constraint())
            .unwrap_or_default();
        return StoreError::UniqueViolation {
            field: unique_field(constraint).to_string(),
        };
    }
    StoreError::backend(e)
}

fn unique_field(constraint: &str) -> &'static str {
    if constraint.contains("email") {
        "email"
    } else if constraint.contains("license") {
        "healthcare_license"
    } else if constraint.starts_with("hip_client_stats") || constraint.starts_with("hip_biodata") {
        "health_id"
    } else {
        "healthcare_id"
    }
}

pub(crate) fn encode<T: serde::Serialize>(entity: &str, value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Serialization {
        entity: entity.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    entity: &str,
    doc: serde_json::Value,
) -> Result<T, StoreError> {
    serde_json::from_value(doc).map_err(|e| StoreError::Serialization {
        entity: entity.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_field_from_constraint() {
        assert_eq!(unique_field("hip_providers_email_key"), "email");
        assert_eq!(unique_field("hip_providers_license_key"), "healthcare_license");
        assert_eq!(unique_field("hip_client_stats_pkey"), "health_id");
        assert_eq!(unique_field("hip_providers_pkey"), "healthcare_id");
    }

    #[test]
    fn test_decode_reports_entity() {
        let err = decode::<hip_core::ProviderPreferences>("preferences", serde_json::json!(1));
        assert!(matches!(
            err,
            Err(StoreError::Serialization { ref entity, .. }) if entity == "preferences"
        ));
    }

    #[test]
    fn test_preference_table_carries_defaults() {
        let table = SCHEMA
            .split("CREATE TABLE IF NOT EXISTS hip_preferences")
            .nth(1)
            .and_then(|rest| rest.split(");").next())
            .expect("preference table");
        for column in [
            "account_locked            BOOLEAN NOT NULL DEFAULT FALSE",
            "appointment_fee           BIGINT NOT NULL",
            "biodata_viewed_count      BIGINT NOT NULL DEFAULT 0",
            "health_ids_created_count  BIGINT NOT NULL DEFAULT 0",
            "records_created_count     BIGINT NOT NULL DEFAULT 0",
            "records_viewed_count      BIGINT NOT NULL DEFAULT 0",
        ] {
            assert!(table.contains(column), "missing {column}");
        }
    }
}
