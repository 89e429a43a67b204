//! Audit events published to the log queue after a committed action.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::identity::{HealthId, ProviderId, TenantIdentity, Timestamp};

/// Queue every audit event is pushed onto.
pub const AUDIT_QUEUE: &str = "hip:logs";

/// Category tag of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditCategory {
    #[serde(rename = "hip:account_created")]
    AccountCreated,
    #[serde(rename = "hip:account_login")]
    AccountLogin,
    #[serde(rename = "hip:preferences_changed")]
    PreferencesChanged,
    #[serde(rename = "hip:delete_account")]
    DeleteAccount,
    #[serde(rename = "hip:patient_biodata_created")]
    PatientBiodataCreated,
    #[serde(rename = "hip:patient_biodata_viewed")]
    PatientBiodataViewed,
    #[serde(rename = "hip:patient_biodata_updated")]
    PatientBiodataUpdated,
    #[serde(rename = "hip:patient_record_created")]
    PatientRecordCreated,
    #[serde(rename = "hip:patient_record_viewed")]
    PatientRecordViewed,
    #[serde(rename = "hip:appointment_confirm")]
    AppointmentConfirm,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::AccountCreated => "hip:account_created",
            AuditCategory::AccountLogin => "hip:account_login",
            AuditCategory::PreferencesChanged => "hip:preferences_changed",
            AuditCategory::DeleteAccount => "hip:delete_account",
            AuditCategory::PatientBiodataCreated => "hip:patient_biodata_created",
            AuditCategory::PatientBiodataViewed => "hip:patient_biodata_viewed",
            AuditCategory::PatientBiodataUpdated => "hip:patient_biodata_updated",
            AuditCategory::PatientRecordCreated => "hip:patient_record_created",
            AuditCategory::PatientRecordViewed => "hip:patient_record_viewed",
            AuditCategory::AppointmentConfirm => "hip:appointment_confirm",
        }
    }
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit event. Serialized as a flat JSON object onto [`AUDIT_QUEUE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub category: AuditCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "healthcareId", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<ProviderId>,
    #[serde(rename = "healthId", skip_serializing_if = "Option::is_none")]
    pub health_id: Option<HealthId>,
    #[serde(rename = "ipaddress", skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(rename = "occurredAt")]
    pub occurred_at: Timestamp,
}

impl AuditEvent {
    pub fn new(category: AuditCategory) -> Self {
        Self {
            category,
            name: None,
            email: None,
            provider_id: None,
            health_id: None,
            ip_address: None,
            occurred_at: Utc::now(),
        }
    }

    /// Event acted by an authenticated tenant.
    pub fn by_tenant(category: AuditCategory, tenant: &TenantIdentity) -> Self {
        Self::new(category)
            .with_actor(tenant.provider_id.clone(), &tenant.name, &tenant.email)
    }

    pub fn with_actor(mut self, provider_id: ProviderId, name: &str, email: &str) -> Self {
        self.provider_id = Some(provider_id);
        self.name = Some(name.to_string());
        self.email = Some(email.to_string());
        self
    }

    pub fn with_subject(mut self, health_id: HealthId) -> Self {
        self.health_id = Some(health_id);
        self
    }

    pub fn with_ip(mut self, ip: Option<String>) -> Self {
        self.ip_address = ip;
        self
    }
}
