//! In-memory store implementations.
//!
//! Used by the test suites and by local development. Expiry is measured
//! with `tokio::time::Instant`, so tests running with paused time can
//! advance past windows and TTLs without sleeping. Every store carries a
//! [`FaultSwitch`] that makes it report unavailability or add latency.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use hip_core::{
    Appointment, AppointmentStatusUpdate, BiodataUpdate, ClientStats, HealthId, License,
    PatientBiodata, PatientRecord, PreferenceUpdate, ProviderCredentials, ProviderId,
    ProviderPreferences, ProviderProfile, ProviderRegistration, RecordQuery, StoreError,
    Timestamp, DEFAULT_APPOINTMENT_FEE, DEFAULT_REQUEST_QUOTA,
};
use tokio::time::Instant;

use crate::keys::{CacheKey, CounterKey};
use crate::traits::{
    AuditQueue, CacheLookup, CacheStore, CounterSnapshot, CounterStore, DocumentStore,
    TransactionalStore, UpdateOutcome,
};

// ============================================================================
// FAULT INJECTION
// ============================================================================

/// Shared switch for simulated outages and slow responses.
#[derive(Debug, Default)]
pub struct FaultSwitch {
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
    calls: DashMap<&'static str, u64>,
}

impl FaultSwitch {
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// How many times `operation` has been invoked.
    pub fn calls(&self, operation: &str) -> u64 {
        self.calls.get(operation).map(|c| *c).unwrap_or(0)
    }

    async fn enter(&self, store: &'static str, operation: &'static str) -> Result<(), StoreError> {
        *self.calls.entry(operation).or_insert(0) += 1;

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: format!("{store} is offline"),
            });
        }
        Ok(())
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::LockPoisoned
}

// ============================================================================
// COUNTER STORE
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    count: u64,
    expires_at: Option<Instant>,
}

impl CounterEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Counter store backed by a sharded map. The entry guard makes each
/// increment and its expiry a single atomic step.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: DashMap<String, CounterEntry>,
    faults: FaultSwitch,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &FaultSwitch {
        &self.faults
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.set_unavailable(unavailable);
    }

    /// Increment under the entry guard. `breach` is the ceiling and the
    /// expiry applied by the increment that first exceeds it.
    fn bump(
        &self,
        key: &CounterKey,
        window: Duration,
        breach: Option<(u64, Duration)>,
    ) -> CounterSnapshot {
        let now = Instant::now();
        let mut entry = self.counters.entry(key.encode()).or_insert(CounterEntry {
            count: 0,
            expires_at: None,
        });
        if entry.is_expired(now) {
            entry.count = 0;
            entry.expires_at = None;
        }
        entry.count += 1;
        if entry.count == 1 || entry.expires_at.is_none() {
            entry.expires_at = Some(now + window);
        }
        if let Some((ceiling, cool_down)) = breach {
            if entry.count == ceiling.saturating_add(1) {
                entry.expires_at = Some(now + cool_down);
            }
        }

        CounterSnapshot {
            count: entry.count,
            ttl: entry.expires_at.map(|at| at.saturating_duration_since(now)),
        }
    }

    /// Current live value of a counter, or `None` if absent or expired.
    pub fn peek(&self, key: &CounterKey) -> Option<u64> {
        let now = Instant::now();
        self.counters
            .get(&key.encode())
            .filter(|e| !e.is_expired(now))
            .map(|e| e.count)
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr_with_expiry(
        &self,
        key: &CounterKey,
        window: Duration,
    ) -> Result<CounterSnapshot, StoreError> {
        self.faults.enter("counter store", "incr_with_expiry").await?;
        Ok(self.bump(key, window, None))
    }

    async fn incr_with_breach(
        &self,
        key: &CounterKey,
        window: Duration,
        ceiling: u64,
        cool_down: Duration,
    ) -> Result<CounterSnapshot, StoreError> {
        self.faults.enter("counter store", "incr_with_breach").await?;
        Ok(self.bump(key, window, Some((ceiling, cool_down))))
    }
}

// ============================================================================
// CACHE STORE
// ============================================================================

#[derive(Debug, Clone)]
struct CacheEntry {
    bytes: Vec<u8>,
    expires_at: Instant,
}

/// Key/value cache with per-entry TTL.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    faults: FaultSwitch,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &FaultSwitch {
        &self.faults
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.set_unavailable(unavailable);
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<CacheLookup, StoreError> {
        self.faults.enter("cache", "get").await?;

        let now = Instant::now();
        let encoded = key.encode();
        let hit = self.entries.get(&encoded).and_then(|entry| {
            (entry.expires_at > now).then(|| CacheLookup::Hit {
                bytes: entry.bytes.clone(),
                ttl: Some(entry.expires_at.saturating_duration_since(now)),
            })
        });
        match hit {
            Some(hit) => Ok(hit),
            None => {
                self.entries.remove_if(&encoded, |_, e| e.expires_at <= now);
                Ok(CacheLookup::Absent)
            }
        }
    }

    async fn set(&self, key: &CacheKey, bytes: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        self.faults.enter("cache", "set").await?;
        self.entries.insert(
            key.encode(),
            CacheEntry {
                bytes,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError> {
        self.faults.enter("cache", "delete").await?;
        self.entries.remove(&key.encode());
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.faults.enter("cache", "ping").await
    }
}

// ============================================================================
// TRANSACTIONAL STORE
// ============================================================================

/// Preference row as stored, including the activity counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceRow {
    pub is_available: bool,
    pub scheduled_deletion: bool,
    pub account_locked: bool,
    pub remaining_requests: i64,
    pub appointment_fee: i64,
    pub biodata_viewed_count: i64,
    pub health_ids_created_count: i64,
    pub records_created_count: i64,
    pub records_viewed_count: i64,
}

impl Default for PreferenceRow {
    fn default() -> Self {
        Self {
            is_available: true,
            scheduled_deletion: false,
            account_locked: false,
            remaining_requests: DEFAULT_REQUEST_QUOTA,
            appointment_fee: DEFAULT_APPOINTMENT_FEE,
            biodata_viewed_count: 0,
            health_ids_created_count: 0,
            records_created_count: 0,
            records_viewed_count: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct ProviderRow {
    credentials: ProviderCredentials,
    license: License,
    prefs: PreferenceRow,
}

impl ProviderRow {
    fn view(&self) -> ProviderPreferences {
        ProviderPreferences {
            email: self.credentials.email.clone(),
            is_available: self.prefs.is_available,
            scheduled_deletion: self.prefs.scheduled_deletion,
        }
    }
}

#[derive(Debug, Default)]
struct TransactionalState {
    providers: HashMap<ProviderId, ProviderRow>,
    client_stats: HashMap<HealthId, ClientStats>,
}

/// Transactional store. A single lock makes every operation serializable.
#[derive(Debug, Default)]
pub struct MemoryTransactionalStore {
    state: RwLock<TransactionalState>,
    faults: FaultSwitch,
}

impl MemoryTransactionalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &FaultSwitch {
        &self.faults
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.set_unavailable(unavailable);
    }

    /// Overwrite the durable requests-remaining counter of a provider.
    pub fn set_remaining_requests(
        &self,
        provider_id: &ProviderId,
        remaining: i64,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(poisoned)?;
        let row = state
            .providers
            .get_mut(provider_id)
            .ok_or_else(|| StoreError::not_found("provider", provider_id))?;
        row.prefs.remaining_requests = remaining;
        Ok(())
    }

    pub fn preference_row(&self, provider_id: &ProviderId) -> Result<Option<PreferenceRow>, StoreError> {
        Ok(self
            .state
            .read()
            .map_err(poisoned)?
            .providers
            .get(provider_id)
            .map(|row| row.prefs.clone()))
    }

    pub fn provider_count(&self) -> Result<usize, StoreError> {
        Ok(self.state.read().map_err(poisoned)?.providers.len())
    }

    pub fn client_stats(&self, health_id: &HealthId) -> Result<Option<ClientStats>, StoreError> {
        Ok(self
            .state
            .read()
            .map_err(poisoned)?
            .client_stats
            .get(health_id)
            .cloned())
    }
}

#[async_trait]
impl TransactionalStore for MemoryTransactionalStore {
    async fn create_provider(
        &self,
        registration: &ProviderRegistration,
    ) -> Result<ProviderId, StoreError> {
        self.faults.enter("transactional store", "create_provider").await?;

        let profile = &registration.profile;
        let mut state = self.state.write().map_err(poisoned)?;

        for row in state.providers.values() {
            if row.credentials.email.eq_ignore_ascii_case(&profile.email) {
                return Err(StoreError::UniqueViolation {
                    field: "email".to_string(),
                });
            }
            if row.license == profile.license {
                return Err(StoreError::UniqueViolation {
                    field: "healthcare_license".to_string(),
                });
            }
        }
        if state.providers.contains_key(&profile.provider_id) {
            return Err(StoreError::UniqueViolation {
                field: "healthcare_id".to_string(),
            });
        }

        state.providers.insert(
            profile.provider_id.clone(),
            ProviderRow {
                credentials: ProviderCredentials {
                    provider_id: profile.provider_id.clone(),
                    name: profile.name.clone(),
                    email: profile.email.clone(),
                    password_hash: registration.password_hash.clone(),
                },
                license: profile.license.clone(),
                prefs: PreferenceRow::default(),
            },
        );
        Ok(profile.provider_id.clone())
    }

    async fn find_credentials(
        &self,
        provider_id: &ProviderId,
    ) -> Result<ProviderCredentials, StoreError> {
        self.faults.enter("transactional store", "find_credentials").await?;

        let state = self.state.read().map_err(poisoned)?;
        state
            .providers
            .get(provider_id)
            .map(|row| row.credentials.clone())
            .ok_or_else(|| StoreError::not_found("provider", provider_id))
    }

    async fn get_preferences(
        &self,
        provider_id: &ProviderId,
    ) -> Result<ProviderPreferences, StoreError> {
        self.faults.enter("transactional store", "get_preferences").await?;

        let state = self.state.read().map_err(poisoned)?;
        state
            .providers
            .get(provider_id)
            .map(ProviderRow::view)
            .ok_or_else(|| StoreError::not_found("provider", provider_id))
    }

    async fn update_preferences(
        &self,
        provider_id: &ProviderId,
        update: &PreferenceUpdate,
    ) -> Result<ProviderPreferences, StoreError> {
        self.faults.enter("transactional store", "update_preferences").await?;

        let mut state = self.state.write().map_err(poisoned)?;
        if let Some(email) = &update.email {
            let taken = state.providers.iter().any(|(id, row)| {
                id != provider_id && row.credentials.email.eq_ignore_ascii_case(email)
            });
            if taken {
                return Err(StoreError::UniqueViolation {
                    field: "email".to_string(),
                });
            }
        }

        let row = state
            .providers
            .get_mut(provider_id)
            .ok_or_else(|| StoreError::not_found("provider", provider_id))?;
        let mut view = row.view();
        update.apply_to(&mut view);
        row.credentials.email = view.email.clone();
        row.prefs.is_available = view.is_available;
        row.prefs.scheduled_deletion = view.scheduled_deletion;
        Ok(view)
    }

    async fn remaining_requests(&self, provider_id: &ProviderId) -> Result<i64, StoreError> {
        self.faults.enter("transactional store", "remaining_requests").await?;

        let state = self.state.read().map_err(poisoned)?;
        state
            .providers
            .get(provider_id)
            .map(|row| row.prefs.remaining_requests)
            .ok_or_else(|| StoreError::not_found("provider", provider_id))
    }

    async fn create_client_stats(&self, stats: &ClientStats) -> Result<(), StoreError> {
        self.faults.enter("transactional store", "create_client_stats").await?;

        let mut state = self.state.write().map_err(poisoned)?;
        if state.client_stats.contains_key(&stats.health_id) {
            return Err(StoreError::UniqueViolation {
                field: "health_id".to_string(),
            });
        }
        state.client_stats.insert(stats.health_id.clone(), stats.clone());
        Ok(())
    }
}

// ============================================================================
// DOCUMENT STORE
// ============================================================================

#[derive(Debug, Default)]
struct DocumentState {
    profiles: HashMap<ProviderId, ProviderProfile>,
    biodata: HashMap<HealthId, PatientBiodata>,
    records: Vec<PatientRecord>,
    appointments: Vec<Appointment>,
}

/// Document store holding each collection in insertion order.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    state: RwLock<DocumentState>,
    faults: FaultSwitch,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &FaultSwitch {
        &self.faults
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.set_unavailable(unavailable);
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn put_provider_profile(&self, profile: &ProviderProfile) -> Result<(), StoreError> {
        self.faults.enter("document store", "put_provider_profile").await?;
        self.state
            .write()
            .map_err(poisoned)?
            .profiles
            .insert(profile.provider_id.clone(), profile.clone());
        Ok(())
    }

    async fn get_provider_profile(
        &self,
        provider_id: &ProviderId,
    ) -> Result<Option<ProviderProfile>, StoreError> {
        self.faults.enter("document store", "get_provider_profile").await?;
        Ok(self
            .state
            .read()
            .map_err(poisoned)?
            .profiles
            .get(provider_id)
            .cloned())
    }

    async fn set_profile_email(
        &self,
        provider_id: &ProviderId,
        email: &str,
    ) -> Result<UpdateOutcome<ProviderProfile>, StoreError> {
        self.faults.enter("document store", "set_profile_email").await?;

        let mut state = self.state.write().map_err(poisoned)?;
        let Some(profile) = state.profiles.get_mut(provider_id) else {
            return Ok(UpdateOutcome::NoMatch);
        };
        if profile.email == email {
            return Ok(UpdateOutcome::Unchanged);
        }
        profile.email = email.to_string();
        Ok(UpdateOutcome::Updated(profile.clone()))
    }

    async fn insert_biodata(&self, biodata: &PatientBiodata) -> Result<(), StoreError> {
        self.faults.enter("document store", "insert_biodata").await?;

        let mut state = self.state.write().map_err(poisoned)?;
        if state.biodata.contains_key(&biodata.health_id) {
            return Err(StoreError::UniqueViolation {
                field: "health_id".to_string(),
            });
        }
        state.biodata.insert(biodata.health_id.clone(), biodata.clone());
        Ok(())
    }

    async fn get_biodata(
        &self,
        health_id: &HealthId,
    ) -> Result<Option<PatientBiodata>, StoreError> {
        self.faults.enter("document store", "get_biodata").await?;
        Ok(self
            .state
            .read()
            .map_err(poisoned)?
            .biodata
            .get(health_id)
            .cloned())
    }

    async fn update_biodata(
        &self,
        health_id: &HealthId,
        update: &BiodataUpdate,
        now: Timestamp,
    ) -> Result<UpdateOutcome<PatientBiodata>, StoreError> {
        self.faults.enter("document store", "update_biodata").await?;

        let mut state = self.state.write().map_err(poisoned)?;
        let Some(doc) = state.biodata.get_mut(health_id) else {
            return Ok(UpdateOutcome::NoMatch);
        };
        if update.merge_into(doc, now) {
            Ok(UpdateOutcome::Updated(doc.clone()))
        } else {
            Ok(UpdateOutcome::Unchanged)
        }
    }

    async fn insert_record(&self, record: &PatientRecord) -> Result<(), StoreError> {
        self.faults.enter("document store", "insert_record").await?;
        self.state
            .write()
            .map_err(poisoned)?
            .records
            .push(record.clone());
        Ok(())
    }

    async fn list_records(&self, query: &RecordQuery) -> Result<Vec<PatientRecord>, StoreError> {
        self.faults.enter("document store", "list_records").await?;

        let state = self.state.read().map_err(poisoned)?;
        let mut matching: Vec<PatientRecord> = state
            .records
            .iter()
            .filter(|r| r.health_id == query.health_id)
            .filter(|r| query.severity.map_or(true, |s| r.medical_severity == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.record_id.cmp(&a.record_id))
        });
        matching.truncate(query.limit);
        Ok(matching)
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        self.faults.enter("document store", "insert_appointment").await?;
        self.state
            .write()
            .map_err(poisoned)?
            .appointments
            .push(appointment.clone());
        Ok(())
    }

    async fn list_appointments(
        &self,
        provider_id: &ProviderId,
        limit: usize,
    ) -> Result<Vec<Appointment>, StoreError> {
        self.faults.enter("document store", "list_appointments").await?;

        let state = self.state.read().map_err(poisoned)?;
        let mut matching: Vec<Appointment> = state
            .appointments
            .iter()
            .filter(|a| a.provider_id.as_ref() == Some(provider_id))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.appointment_id.cmp(&a.appointment_id))
        });
        matching.truncate(limit);
        Ok(matching)
    }

    async fn set_appointment_status(
        &self,
        provider_id: &ProviderId,
        update: &AppointmentStatusUpdate,
    ) -> Result<UpdateOutcome<Appointment>, StoreError> {
        self.faults.enter("document store", "set_appointment_status").await?;

        let mut state = self.state.write().map_err(poisoned)?;
        let Some(appointment) = state.appointments.iter_mut().find(|a| {
            a.appointment_id == update.appointment_id
                && a.health_id == update.health_id
                && a.provider_id.as_ref() == Some(provider_id)
        }) else {
            return Ok(UpdateOutcome::NoMatch);
        };
        if appointment.status == update.status {
            return Ok(UpdateOutcome::Unchanged);
        }
        appointment.status = update.status;
        Ok(UpdateOutcome::Updated(appointment.clone()))
    }
}

// ============================================================================
// AUDIT QUEUE
// ============================================================================

/// Queue that keeps every published payload for inspection.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditQueue {
    published: Arc<RwLock<Vec<(String, Vec<u8>)>>>,
    faults: Arc<FaultSwitch>,
}

impl MemoryAuditQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &FaultSwitch {
        &self.faults
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.set_unavailable(unavailable);
    }

    /// Payloads published to `queue`, decoded as JSON.
    pub fn messages(&self, queue: &str) -> Result<Vec<serde_json::Value>, StoreError> {
        let published = self.published.read().map_err(poisoned)?;
        published
            .iter()
            .filter(|(q, _)| q == queue)
            .map(|(_, payload)| {
                serde_json::from_slice(payload).map_err(|e| StoreError::Serialization {
                    entity: "audit event".to_string(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl AuditQueue for MemoryAuditQueue {
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), StoreError> {
        self.faults.enter("audit queue", "publish").await?;
        self.published
            .write()
            .map_err(poisoned)?
            .push((queue.to_string(), payload));
        Ok(())
    }
}
