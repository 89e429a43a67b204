//! HIP Core - Domain Types
//!
//! Pure data structures for the healthcare provider access layer. Every other
//! crate in the workspace depends on this one. Validation lives next to the
//! input types; nothing here touches a store.

pub mod appointment;
pub mod audit;
pub mod enums;
pub mod error;
pub mod identity;
pub mod patient;
pub mod provider;
pub mod validation;

pub use appointment::{Appointment, AppointmentStatusUpdate};
pub use audit::{AuditCategory, AuditEvent, AUDIT_QUEUE};
pub use enums::{AccountStatus, AppointmentStatus, Severity};
pub use error::{ConfigError, HipError, HipResult, StoreError, ValidationError};
pub use identity::{
    AppointmentId, HealthId, License, ProviderId, RecordId, TenantIdentity, Timestamp,
    HEALTH_ID_PREFIX, PROVIDER_ID_PREFIX,
};
pub use patient::{
    BiodataUpdate, ClientStats, NewPatientBiodata, NewPatientRecord, PatientBiodata,
    PatientRecord, RecordQuery, DEFAULT_AVAILABLE_MONEY,
};
pub use provider::{
    Address, NewProvider, PreferenceUpdate, ProviderCredentials, ProviderPreferences,
    ProviderProfile, ProviderRegistration, DEFAULT_APPOINTMENT_FEE, DEFAULT_REQUEST_QUOTA,
};
