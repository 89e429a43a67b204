//! Narrow contracts for every external store the access layer talks to.
//!
//! Each trait covers exactly one store. Implementations reduce their driver
//! errors to [`StoreError`] so callers never see a driver type.

use std::time::Duration;

use async_trait::async_trait;
use hip_core::{
    Appointment, AppointmentStatusUpdate, BiodataUpdate, ClientStats, HealthId, PatientBiodata,
    PatientRecord, PreferenceUpdate, ProviderCredentials, ProviderId, ProviderPreferences,
    ProviderProfile, ProviderRegistration, RecordQuery, StoreError, Timestamp,
};

use crate::keys::{CacheKey, CounterKey};

// ============================================================================
// SHARED COUNTER STORE
// ============================================================================

/// State of a counter right after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Post-increment value.
    pub count: u64,
    /// Time until the counter expires, if it has an expiry.
    pub ttl: Option<Duration>,
}

/// Atomic increment-and-expire counters shared by every server instance.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key`. When the increment creates the counter, its expiry
    /// is set to `window` in the same atomic step.
    async fn incr_with_expiry(
        &self,
        key: &CounterKey,
        window: Duration,
    ) -> Result<CounterSnapshot, StoreError>;

    /// Increment `key` like [`incr_with_expiry`](Self::incr_with_expiry).
    /// The increment that takes the counter to `ceiling + 1` also replaces
    /// its expiry with `cool_down`, in the same atomic step.
    async fn incr_with_breach(
        &self,
        key: &CounterKey,
        window: Duration,
        ceiling: u64,
        cool_down: Duration,
    ) -> Result<CounterSnapshot, StoreError>;
}

// ============================================================================
// CACHE STORE
// ============================================================================

/// Outcome of a cache lookup. Transport failures are errors, never `Absent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit {
        bytes: Vec<u8>,
        ttl: Option<Duration>,
    },
    Absent,
}

/// Byte-oriented key/value cache with per-entry TTL.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<CacheLookup, StoreError>;

    async fn set(&self, key: &CacheKey, bytes: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError>;

    /// Round-trip to the backend without touching any entry.
    async fn ping(&self) -> Result<(), StoreError>;
}

// ============================================================================
// TRANSACTIONAL STORE
// ============================================================================

/// System of record for identity, credentials, preferences and quota.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    /// Insert the provider row and its default preference row in one
    /// transaction. Email and license are unique.
    async fn create_provider(
        &self,
        registration: &ProviderRegistration,
    ) -> Result<ProviderId, StoreError>;

    async fn find_credentials(
        &self,
        provider_id: &ProviderId,
    ) -> Result<ProviderCredentials, StoreError>;

    /// Single join of the profile and preference rows.
    async fn get_preferences(
        &self,
        provider_id: &ProviderId,
    ) -> Result<ProviderPreferences, StoreError>;

    /// Apply a whitelisted update and return the joined view after commit.
    async fn update_preferences(
        &self,
        provider_id: &ProviderId,
        update: &PreferenceUpdate,
    ) -> Result<ProviderPreferences, StoreError>;

    /// Durable requests-remaining counter consulted at login.
    async fn remaining_requests(&self, provider_id: &ProviderId) -> Result<i64, StoreError>;

    async fn create_client_stats(&self, stats: &ClientStats) -> Result<(), StoreError>;
}

// ============================================================================
// DOCUMENT STORE
// ============================================================================

/// Result of a partial merge update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome<T> {
    /// No document matched the filter.
    NoMatch,
    /// A document matched but every field already had the requested value.
    Unchanged,
    /// The document was modified; carries the new state.
    Updated(T),
}

/// Semi-structured clinical documents and the denormalized provider profile.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put_provider_profile(&self, profile: &ProviderProfile) -> Result<(), StoreError>;

    async fn get_provider_profile(
        &self,
        provider_id: &ProviderId,
    ) -> Result<Option<ProviderProfile>, StoreError>;

    /// Rewrite the email on the profile copy after the transactional store
    /// accepted the change.
    async fn set_profile_email(
        &self,
        provider_id: &ProviderId,
        email: &str,
    ) -> Result<UpdateOutcome<ProviderProfile>, StoreError>;

    async fn insert_biodata(&self, biodata: &PatientBiodata) -> Result<(), StoreError>;

    async fn get_biodata(&self, health_id: &HealthId)
        -> Result<Option<PatientBiodata>, StoreError>;

    async fn update_biodata(
        &self,
        health_id: &HealthId,
        update: &BiodataUpdate,
        now: Timestamp,
    ) -> Result<UpdateOutcome<PatientBiodata>, StoreError>;

    async fn insert_record(&self, record: &PatientRecord) -> Result<(), StoreError>;

    /// Newest first, at most `query.limit` entries.
    async fn list_records(&self, query: &RecordQuery) -> Result<Vec<PatientRecord>, StoreError>;

    /// Appointments are booked by the patient-facing system; this service
    /// only lists them and changes their status.
    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), StoreError>;

    /// Newest first, at most `limit` entries.
    async fn list_appointments(
        &self,
        provider_id: &ProviderId,
        limit: usize,
    ) -> Result<Vec<Appointment>, StoreError>;

    /// Matches on appointment id, patient and owning provider.
    async fn set_appointment_status(
        &self,
        provider_id: &ProviderId,
        update: &AppointmentStatusUpdate,
    ) -> Result<UpdateOutcome<Appointment>, StoreError>;
}

// ============================================================================
// AUDIT QUEUE
// ============================================================================

/// Fire-and-forget queue.
#[async_trait]
pub trait AuditQueue: Send + Sync {
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), StoreError>;
}
