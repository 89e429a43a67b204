//! Store Facade
//!
//! Every operation the HTTP layer performs goes through [`StoreFacade`]. It
//! owns the read-through cache, puts a deadline on each store call,
//! invalidates cached entries synchronously after a write and publishes an
//! audit event once the primary write has committed.
//!
//! Writes that span two stores run the system-of-record step first. When a
//! later step fails the caller gets [`FacadeError::PartialWrite`] naming the
//! identifiers that are already durable.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use hip_core::{
    Appointment, AppointmentStatusUpdate, AuditCategory, AuditEvent, BiodataUpdate, ClientStats,
    HealthId, NewPatientBiodata, NewPatientRecord, NewProvider, PatientBiodata, PatientRecord,
    PreferenceUpdate, ProviderId, ProviderPreferences, ProviderProfile, ProviderRegistration,
    RecordQuery, StoreError, TenantIdentity, ValidationError, AUDIT_QUEUE,
};
use hip_storage::{
    AuditQueue, CacheConfig, CacheError, CacheKey, CacheLookup, CacheRead, CacheStats, CacheStore,
    DocumentStore, ReadThroughCache, TransactionalStore, UpdateOutcome,
};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::config::ApiConfig;
use crate::password::{PasswordError, PasswordHasher};
use crate::telemetry::metrics;

const INVALID_CREDENTIALS: &str = "Invalid healthcare id or password";
const NO_CHANGE: &str = "No change detected";

// ============================================================================
// ERRORS
// ============================================================================

/// Failures of a facade operation.
#[derive(Debug, Clone, Error)]
pub enum FacadeError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("request allowance exhausted for {provider_id}")]
    QuotaExhausted { provider_id: ProviderId },

    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    #[error("{field} already in use")]
    AlreadyExists { field: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The primary write committed; a follow-up write did not.
    #[error("{operation} partially committed for {provider_id}: {reason}")]
    PartialWrite {
        operation: &'static str,
        provider_id: ProviderId,
        health_id: Option<HealthId>,
        reason: String,
    },

    #[error("{operation} failed: {source}")]
    StoreUnavailable {
        operation: &'static str,
        source: StoreError,
    },

    #[error("corrupt cache entry at {0}")]
    CorruptCache(String),

    #[error("{operation} failed: {reason}")]
    Internal {
        operation: &'static str,
        reason: String,
    },
}

fn password_failure(operation: &'static str, err: PasswordError) -> FacadeError {
    tracing::error!(operation, error = %err, "Password hashing failed");
    FacadeError::Internal {
        operation,
        reason: err.to_string(),
    }
}

// ============================================================================
// DEADLINES
// ============================================================================

async fn within<T>(
    timeout: Duration,
    operation: &'static str,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            operation: operation.to_string(),
            millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// Cache backend whose every call carries the store deadline.
struct DeadlineCache {
    inner: Arc<dyn CacheStore>,
    timeout: Duration,
}

#[async_trait]
impl CacheStore for DeadlineCache {
    async fn get(&self, key: &CacheKey) -> Result<CacheLookup, StoreError> {
        within(self.timeout, "cache_get", self.inner.get(key)).await
    }

    async fn set(&self, key: &CacheKey, bytes: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        within(self.timeout, "cache_set", self.inner.set(key, bytes, ttl)).await
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError> {
        within(self.timeout, "cache_delete", self.inner.delete(key)).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        within(self.timeout, "cache_ping", self.inner.ping()).await
    }
}

// ============================================================================
// FACADE
// ============================================================================

/// Handles to every store the facade coordinates.
#[derive(Clone)]
pub struct Stores {
    pub transactional: Arc<dyn TransactionalStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub cache: Arc<dyn CacheStore>,
    pub audit: Arc<dyn AuditQueue>,
}

/// The single path from handlers to the stores.
#[derive(Clone)]
pub struct StoreFacade {
    transactional: Arc<dyn TransactionalStore>,
    documents: Arc<dyn DocumentStore>,
    cache: ReadThroughCache<dyn CacheStore>,
    audit: Arc<dyn AuditQueue>,
    hasher: Arc<dyn PasswordHasher>,
    store_timeout: Duration,
}

impl StoreFacade {
    pub fn new(stores: Stores, hasher: Arc<dyn PasswordHasher>, config: &ApiConfig) -> Self {
        let cache: Arc<dyn CacheStore> = Arc::new(DeadlineCache {
            inner: stores.cache,
            timeout: config.store_timeout,
        });
        Self {
            transactional: stores.transactional,
            documents: stores.documents,
            cache: ReadThroughCache::new(cache, CacheConfig::new().with_ttl(config.cache_ttl)),
            audit: stores.audit,
            hasher,
            store_timeout: config.store_timeout,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Round-trip the shared cache under the store deadline.
    pub async fn check_cache(&self) -> Result<(), StoreError> {
        self.cache.backend().ping().await
    }

    // ------------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------------

    /// Register a provider: credentials and preferences in the transactional
    /// store, then the profile copy in the document store.
    pub async fn create_provider(
        &self,
        signup: NewProvider,
        ip: Option<String>,
    ) -> Result<ProviderProfile, FacadeError> {
        signup.validate()?;
        let password_hash = self
            .hasher
            .hash(&signup.password)
            .await
            .map_err(|e| password_failure("hash_password", e))?;

        let (provider_id, license) = ProviderId::generate();
        let profile = signup.into_profile(provider_id.clone(), license, Utc::now());
        let registration = ProviderRegistration {
            profile: profile.clone(),
            password_hash,
        };

        self.timed(
            "create_provider",
            self.transactional.create_provider(&registration),
        )
        .await
        .map_err(|e| self.store_failure("create_provider", &provider_id, e))?;

        if let Err(err) = self
            .timed(
                "put_provider_profile",
                self.documents.put_provider_profile(&profile),
            )
            .await
        {
            tracing::error!(
                operation = "put_provider_profile",
                tenant = %provider_id,
                error = %err,
                "Provider committed without its profile copy"
            );
            return Err(FacadeError::PartialWrite {
                operation: "create_provider",
                provider_id,
                health_id: None,
                reason: err.to_string(),
            });
        }

        self.emit(
            AuditEvent::new(AuditCategory::AccountCreated)
                .with_actor(profile.provider_id.clone(), &profile.name, &profile.email)
                .with_ip(ip),
        )
        .await;
        tracing::info!(tenant = %profile.provider_id, "Provider registered");
        Ok(profile)
    }

    /// Check a login attempt. Unknown ids and wrong passwords are
    /// indistinguishable to the caller.
    pub async fn authenticate(
        &self,
        provider_id: &ProviderId,
        password: &str,
    ) -> Result<TenantIdentity, FacadeError> {
        let credentials = match self
            .timed(
                "find_credentials",
                self.transactional.find_credentials(provider_id),
            )
            .await
        {
            Ok(credentials) => credentials,
            Err(StoreError::NotFound { .. }) => {
                return Err(FacadeError::Unauthorized(INVALID_CREDENTIALS.to_string()))
            }
            Err(err) => return Err(self.store_failure("find_credentials", provider_id, err)),
        };

        let remaining = self
            .timed(
                "remaining_requests",
                self.transactional.remaining_requests(provider_id),
            )
            .await
            .map_err(|e| self.store_failure("remaining_requests", provider_id, e))?;
        if remaining <= 0 {
            tracing::info!(tenant = %provider_id, "Login refused: request allowance exhausted");
            return Err(FacadeError::QuotaExhausted {
                provider_id: provider_id.clone(),
            });
        }

        let matches = self
            .hasher
            .verify(password, &credentials.password_hash)
            .await
            .map_err(|e| password_failure("verify_password", e))?;
        if !matches {
            return Err(FacadeError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        let identity =
            TenantIdentity::new(credentials.provider_id, credentials.email, credentials.name);
        self.emit(AuditEvent::by_tenant(AuditCategory::AccountLogin, &identity))
            .await;
        Ok(identity)
    }

    // ------------------------------------------------------------------------
    // Preferences and profile
    // ------------------------------------------------------------------------

    /// Preferences of the tenant. `use_cache = false` skips the cached copy
    /// and repopulates it from the transactional store.
    pub async fn get_preferences(
        &self,
        tenant: &TenantIdentity,
        use_cache: bool,
    ) -> Result<CacheRead<ProviderPreferences>, FacadeError> {
        let id = &tenant.provider_id;
        self.cached_read(
            "get_preferences",
            CacheKey::preferences(id),
            use_cache,
            move || self.timed("get_preferences", self.transactional.get_preferences(id)),
        )
        .await
    }

    pub async fn change_preferences(
        &self,
        tenant: &TenantIdentity,
        update: PreferenceUpdate,
    ) -> Result<ProviderPreferences, FacadeError> {
        update.validate()?;
        let id = &tenant.provider_id;
        let prefs = self
            .timed(
                "update_preferences",
                self.transactional.update_preferences(id, &update),
            )
            .await
            .map_err(|e| self.store_failure("update_preferences", id, e))?;

        self.invalidate(&CacheKey::preferences(id)).await;
        if update.email.is_some() {
            self.sync_profile_email(id, &prefs.email).await?;
        }
        self.emit(AuditEvent::by_tenant(AuditCategory::PreferencesChanged, tenant))
            .await;
        Ok(prefs)
    }

    /// Second step of an email change: carry the committed email onto the
    /// profile copy and drop its cached view.
    async fn sync_profile_email(&self, id: &ProviderId, email: &str) -> Result<(), FacadeError> {
        let synced = self
            .timed("set_profile_email", self.documents.set_profile_email(id, email))
            .await;
        self.invalidate(&CacheKey::provider_details(id)).await;

        match synced {
            Ok(UpdateOutcome::Updated(_) | UpdateOutcome::Unchanged) => Ok(()),
            Ok(UpdateOutcome::NoMatch) => {
                tracing::warn!(tenant = %id, "Email changed on a provider without a profile copy");
                Ok(())
            }
            Err(err) => {
                tracing::error!(
                    operation = "set_profile_email",
                    tenant = %id,
                    error = %err,
                    "Email committed without updating the profile copy"
                );
                Err(FacadeError::PartialWrite {
                    operation: "change_preferences",
                    provider_id: id.clone(),
                    health_id: None,
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Flag the account for deletion. The rows stay until an offline sweep.
    pub async fn delete_account(
        &self,
        tenant: &TenantIdentity,
    ) -> Result<ProviderPreferences, FacadeError> {
        let id = &tenant.provider_id;
        let update = PreferenceUpdate {
            scheduled_deletion: Some(true),
            ..PreferenceUpdate::default()
        };
        let prefs = self
            .timed(
                "update_preferences",
                self.transactional.update_preferences(id, &update),
            )
            .await
            .map_err(|e| self.store_failure("delete_account", id, e))?;

        self.invalidate(&CacheKey::preferences(id)).await;
        self.emit(AuditEvent::by_tenant(AuditCategory::DeleteAccount, tenant))
            .await;
        tracing::info!(tenant = %id, "Account scheduled for deletion");
        Ok(prefs)
    }

    pub async fn get_provider_details(
        &self,
        tenant: &TenantIdentity,
        use_cache: bool,
    ) -> Result<CacheRead<ProviderProfile>, FacadeError> {
        let id = &tenant.provider_id;
        self.cached_read(
            "get_provider_details",
            CacheKey::provider_details(id),
            use_cache,
            move || async move {
                self.timed(
                    "get_provider_profile",
                    self.documents.get_provider_profile(id),
                )
                .await?
                .ok_or_else(|| StoreError::not_found("provider profile", id))
            },
        )
        .await
    }

    // ------------------------------------------------------------------------
    // Patients
    // ------------------------------------------------------------------------

    /// Register a patient: the biodata document first, then the client-stats
    /// row in the transactional store.
    pub async fn create_patient_biodata(
        &self,
        tenant: &TenantIdentity,
        biodata: NewPatientBiodata,
    ) -> Result<PatientBiodata, FacadeError> {
        biodata.validate()?;
        let provider_id = &tenant.provider_id;
        let health_id = HealthId::generate();
        let document = biodata.into_biodata(health_id.clone(), provider_id.clone(), Utc::now());

        self.timed("insert_biodata", self.documents.insert_biodata(&document))
            .await
            .map_err(|e| self.store_failure("insert_biodata", provider_id, e))?;

        let stats = ClientStats::trial(health_id.clone());
        if let Err(err) = self
            .timed(
                "create_client_stats",
                self.transactional.create_client_stats(&stats),
            )
            .await
        {
            tracing::error!(
                operation = "create_client_stats",
                tenant = %provider_id,
                health_id = %health_id,
                error = %err,
                "Biodata committed without its client stats"
            );
            return Err(FacadeError::PartialWrite {
                operation: "create_patient_biodata",
                provider_id: provider_id.clone(),
                health_id: Some(health_id),
                reason: err.to_string(),
            });
        }

        self.emit(
            AuditEvent::by_tenant(AuditCategory::PatientBiodataCreated, tenant)
                .with_subject(health_id),
        )
        .await;
        Ok(document)
    }

    pub async fn get_patient_biodata(
        &self,
        tenant: &TenantIdentity,
        health_id: &HealthId,
    ) -> Result<PatientBiodata, FacadeError> {
        let found = self
            .timed("get_biodata", self.documents.get_biodata(health_id))
            .await
            .map_err(|e| self.store_failure("get_biodata", &tenant.provider_id, e))?;
        let Some(biodata) = found else {
            return Err(FacadeError::NotFound {
                entity: "patient biodata".to_string(),
                id: health_id.to_string(),
            });
        };

        self.emit(
            AuditEvent::by_tenant(AuditCategory::PatientBiodataViewed, tenant)
                .with_subject(health_id.clone()),
        )
        .await;
        Ok(biodata)
    }

    pub async fn update_patient_biodata(
        &self,
        tenant: &TenantIdentity,
        health_id: &HealthId,
        update: BiodataUpdate,
    ) -> Result<PatientBiodata, FacadeError> {
        update.validate()?;
        let outcome = self
            .timed(
                "update_biodata",
                self.documents.update_biodata(health_id, &update, Utc::now()),
            )
            .await
            .map_err(|e| self.store_failure("update_biodata", &tenant.provider_id, e))?;

        match outcome {
            UpdateOutcome::NoMatch => Err(FacadeError::NotFound {
                entity: "patient biodata".to_string(),
                id: health_id.to_string(),
            }),
            UpdateOutcome::Unchanged => Err(FacadeError::Conflict(NO_CHANGE.to_string())),
            UpdateOutcome::Updated(biodata) => {
                self.emit(
                    AuditEvent::by_tenant(AuditCategory::PatientBiodataUpdated, tenant)
                        .with_subject(health_id.clone()),
                )
                .await;
                Ok(biodata)
            }
        }
    }

    pub async fn create_patient_record(
        &self,
        tenant: &TenantIdentity,
        record: NewPatientRecord,
    ) -> Result<PatientRecord, FacadeError> {
        record.validate()?;
        let record = record.into_record(tenant.provider_id.clone(), Utc::now());
        self.timed("insert_record", self.documents.insert_record(&record))
            .await
            .map_err(|e| self.store_failure("insert_record", &tenant.provider_id, e))?;

        self.emit(
            AuditEvent::by_tenant(AuditCategory::PatientRecordCreated, tenant)
                .with_subject(record.health_id.clone()),
        )
        .await;
        Ok(record)
    }

    /// Records of one patient, newest first.
    pub async fn get_patient_records(
        &self,
        tenant: &TenantIdentity,
        query: RecordQuery,
    ) -> Result<Vec<PatientRecord>, FacadeError> {
        let records = self
            .timed("list_records", self.documents.list_records(&query))
            .await
            .map_err(|e| self.store_failure("list_records", &tenant.provider_id, e))?;

        self.emit(
            AuditEvent::by_tenant(AuditCategory::PatientRecordViewed, tenant)
                .with_subject(query.health_id),
        )
        .await;
        Ok(records)
    }

    // ------------------------------------------------------------------------
    // Appointments
    // ------------------------------------------------------------------------

    pub async fn get_appointments(
        &self,
        tenant: &TenantIdentity,
        limit: usize,
    ) -> Result<Vec<Appointment>, FacadeError> {
        let id = &tenant.provider_id;
        self.timed(
            "list_appointments",
            self.documents.list_appointments(id, limit),
        )
        .await
        .map_err(|e| self.store_failure("list_appointments", id, e))
    }

    /// Set the status of one of the tenant's appointments.
    pub async fn set_appointment_status(
        &self,
        tenant: &TenantIdentity,
        update: AppointmentStatusUpdate,
    ) -> Result<Appointment, FacadeError> {
        let id = &tenant.provider_id;
        let outcome = self
            .timed(
                "set_appointment_status",
                self.documents.set_appointment_status(id, &update),
            )
            .await
            .map_err(|e| self.store_failure("set_appointment_status", id, e))?;

        match outcome {
            UpdateOutcome::NoMatch => Err(FacadeError::NotFound {
                entity: "appointment".to_string(),
                id: update.appointment_id.to_string(),
            }),
            UpdateOutcome::Unchanged => Err(FacadeError::Conflict(NO_CHANGE.to_string())),
            UpdateOutcome::Updated(appointment) => {
                self.emit(
                    AuditEvent::by_tenant(AuditCategory::AppointmentConfirm, tenant)
                        .with_subject(update.health_id),
                )
                .await;
                Ok(appointment)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------------

    /// Run one store call under the deadline and record its outcome.
    async fn timed<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let started = Instant::now();
        let result = within(self.store_timeout, operation, call).await;
        if let Some(metrics) = metrics() {
            metrics.record_store_operation(
                operation,
                result.is_ok(),
                started.elapsed().as_secs_f64(),
            );
        }
        result
    }

    async fn cached_read<T, F, Fut>(
        &self,
        operation: &'static str,
        key: CacheKey,
        use_cache: bool,
        load: F,
    ) -> Result<CacheRead<T>, FacadeError>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, StoreError>> + Send,
    {
        let result = if use_cache {
            self.cache.read_through(&key, load).await
        } else {
            self.cache.refresh(&key, load).await
        };

        let namespace = key.namespace().as_str();
        let record = |outcome: &str| {
            if let Some(metrics) = metrics() {
                metrics.record_cache_read(namespace, outcome);
            }
        };

        match result {
            Ok(read) => {
                record(match (use_cache, read.was_cache_hit()) {
                    (false, _) => "bypass",
                    (true, true) => "hit",
                    (true, false) => "miss",
                });
                Ok(read)
            }
            Err(CacheError::Backend(err)) => {
                record("error");
                Err(self.store_failure(operation, key.tenant(), err))
            }
            Err(CacheError::Corrupt { key: raw, reason }) => {
                record("corrupt");
                tracing::error!(
                    operation,
                    tenant = %key.tenant(),
                    key = %raw,
                    reason = %reason,
                    "Cached entry could not be decoded"
                );
                Err(FacadeError::CorruptCache(raw))
            }
            Err(CacheError::Load(err)) => Err(self.store_failure(operation, key.tenant(), err)),
        }
    }

    /// Drop a cached entry after a write. A failed delete leaves the entry to
    /// expire with its TTL.
    async fn invalidate(&self, key: &CacheKey) {
        if let Err(err) = self.cache.invalidate(key).await {
            tracing::warn!(
                operation = "cache_invalidate",
                tenant = %key.tenant(),
                key = %key.encode(),
                error = %err,
                "Cache invalidation failed; entry will expire with its TTL"
            );
        }
    }

    /// Publish an audit event. Failures are logged and counted, never returned.
    async fn emit(&self, event: AuditEvent) {
        let category = event.category.as_str();
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(category, error = %err, "Audit event could not be encoded");
                return;
            }
        };
        let published = within(
            self.store_timeout,
            "audit_publish",
            self.audit.publish(AUDIT_QUEUE, payload),
        )
        .await;
        if let Err(err) = published {
            tracing::warn!(
                category,
                tenant = ?event.provider_id,
                error = %err,
                "Audit event dropped"
            );
            if let Some(metrics) = metrics() {
                metrics.record_audit_failure(category);
            }
        }
    }

    /// Translate a store failure and log it with its operation and tenant.
    fn store_failure(
        &self,
        operation: &'static str,
        tenant: &ProviderId,
        err: StoreError,
    ) -> FacadeError {
        match err {
            StoreError::NotFound { entity, id } => {
                tracing::debug!(operation, tenant = %tenant, %entity, %id, "Entity not found");
                FacadeError::NotFound { entity, id }
            }
            StoreError::UniqueViolation { field } => {
                tracing::info!(operation, tenant = %tenant, %field, "Unique constraint violated");
                FacadeError::AlreadyExists { field }
            }
            source @ (StoreError::Unavailable { .. } | StoreError::Timeout { .. }) => {
                tracing::error!(operation, tenant = %tenant, error = %source, "Store unavailable");
                FacadeError::StoreUnavailable { operation, source }
            }
            other => {
                tracing::error!(operation, tenant = %tenant, error = %other, "Store operation failed");
                FacadeError::Internal {
                    operation,
                    reason: other.to_string(),
                }
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
