//! HIP Test Utilities
//!
//! Shared test infrastructure for the HIP workspace:
//! - Proptest generators for identifiers and inputs
//! - Fixtures for valid signup, biodata, record and appointment payloads
//! - A bundle of in-memory stores with their fault switches reachable

use std::sync::Arc;

pub use hip_core::{
    Address, Appointment, AppointmentId, AppointmentStatus, BiodataUpdate, HealthId,
    NewPatientBiodata, NewPatientRecord, NewProvider, PreferenceUpdate, ProviderId, Severity,
    StoreError, TenantIdentity, AUDIT_QUEUE,
};
pub use hip_storage::{
    MemoryAuditQueue, MemoryCache, MemoryCounterStore, MemoryDocumentStore,
    MemoryTransactionalStore,
};

// ============================================================================
// MEMORY STORE BUNDLE
// ============================================================================

/// One instance of every in-memory store.
///
/// Fields are `Arc`s so a test can keep a handle for fault injection after
/// handing clones to the code under test.
#[derive(Debug, Clone, Default)]
pub struct MemoryStores {
    pub counters: Arc<MemoryCounterStore>,
    pub cache: Arc<MemoryCache>,
    pub transactional: Arc<MemoryTransactionalStore>,
    pub documents: Arc<MemoryDocumentStore>,
    pub audit: Arc<MemoryAuditQueue>,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Categories of every audit event published so far, in order.
    pub fn audit_categories(&self) -> Vec<String> {
        self.audit
            .messages(AUDIT_QUEUE)
            .unwrap_or_default()
            .iter()
            .filter_map(|event| event["category"].as_str().map(str::to_string))
            .collect()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    /// Generate a provider id with the issued prefix.
    pub fn arb_provider_id() -> impl Strategy<Value = ProviderId> {
        "HCID[0-9a-f]{20}".prop_map(|s| ProviderId::new(s).expect("non-blank id"))
    }

    /// Generate a patient health id with the issued prefix.
    pub fn arb_health_id() -> impl Strategy<Value = HealthId> {
        "HID[0-9a-f]{20}".prop_map(|s| HealthId::new(s).expect("non-blank id"))
    }

    pub fn arb_severity() -> impl Strategy<Value = Severity> {
        prop_oneof![
            Just(Severity::High),
            Just(Severity::Low),
            Just(Severity::Severe),
            Just(Severity::Normal),
        ]
    }

    pub fn arb_appointment_status() -> impl Strategy<Value = AppointmentStatus> {
        prop_oneof![
            Just(AppointmentStatus::Pending),
            Just(AppointmentStatus::Confirmed),
            Just(AppointmentStatus::Rejected),
            Just(AppointmentStatus::NotAvailable),
        ]
    }

    /// Generate a non-empty preference update with a valid email when present.
    pub fn arb_preference_update() -> impl Strategy<Value = PreferenceUpdate> {
        (
            proptest::option::of("[a-z]{3,8}@[a-z]{3,8}\\.org"),
            proptest::option::of(any::<bool>()),
            proptest::option::of(any::<bool>()),
        )
            .prop_filter("update must set a field", |(e, a, d)| {
                e.is_some() || a.is_some() || d.is_some()
            })
            .prop_map(|(email, is_available, scheduled_deletion)| PreferenceUpdate {
                email,
                is_available,
                scheduled_deletion,
            })
    }

    /// Generate a valid clinical record for `health_id`.
    pub fn arb_new_record(health_id: HealthId) -> impl Strategy<Value = NewPatientRecord> {
        ("[A-Za-z ]{3,20}", "[A-Za-z ]{3,50}", arb_severity()).prop_filter_map(
            "issue and description must not be blank",
            move |(issue, description, medical_severity)| {
                (issue.trim().len() >= 3 && description.trim().len() >= 3).then(|| {
                    NewPatientRecord {
                        health_id: health_id.clone(),
                        issue,
                        description,
                        medical_severity,
                    }
                })
            },
        )
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;
    use chrono::Utc;

    pub const PASSWORD: &str = "s3cret-pass";

    pub fn address() -> Address {
        Address {
            country: "India".to_string(),
            state: "Karnataka".to_string(),
            city: "Bengaluru".to_string(),
            landmark: "Near MG Road".to_string(),
        }
    }

    /// A valid signup using [`PASSWORD`].
    pub fn new_provider() -> NewProvider {
        new_provider_with_email("desk@cityclinic.org")
    }

    pub fn new_provider_with_email(email: &str) -> NewProvider {
        NewProvider {
            name: "City Clinic".to_string(),
            email: email.to_string(),
            availability: "24x7".to_string(),
            total_facilities: 12,
            total_mbbs_doc: 8,
            total_worker: 40,
            no_of_beds: 60,
            about: "General and emergency care".to_string(),
            password: PASSWORD.to_string(),
            address: address(),
        }
    }

    pub fn new_biodata() -> NewPatientBiodata {
        NewPatientBiodata {
            fname: "Asha".to_string(),
            middlename: None,
            lname: "Rao".to_string(),
            sex: "F".to_string(),
            dob: "1990-04-12".to_string(),
            bloodgrp: "O+".to_string(),
            bmi: "22.5".to_string(),
            marriage_status: "Single".to_string(),
            weight: "58".to_string(),
            email: "asha@example.org".to_string(),
            mobilenumber: "9876543210".to_string(),
            aadhaar_number: "123412341234".to_string(),
            primary_location: "Bengaluru".to_string(),
            sibling: "1".to_string(),
            twin: "No".to_string(),
            fathername: "Ravi".to_string(),
            mothername: "Meena".to_string(),
            emergencynumber: "9123456780".to_string(),
            address: address(),
        }
    }

    pub fn new_record(health_id: HealthId, medical_severity: Severity) -> NewPatientRecord {
        NewPatientRecord {
            health_id,
            issue: "Fever".to_string(),
            description: "Mild fever for two days".to_string(),
            medical_severity,
        }
    }

    /// A pending appointment booked against `provider_id`.
    pub fn appointment(provider_id: &ProviderId, health_id: HealthId) -> Appointment {
        Appointment {
            appointment_id: AppointmentId::now_v7(),
            provider_id: Some(provider_id.clone()),
            provider_name: "City Clinic".to_string(),
            health_id,
            appointment_date: "2026-11-02".to_string(),
            appointment_time: "10:30".to_string(),
            department: "General".to_string(),
            note: String::new(),
            fname: "Asha".to_string(),
            middlename: String::new(),
            lname: "Rao".to_string(),
            status: AppointmentStatus::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn tenant(provider_id: ProviderId) -> TenantIdentity {
        TenantIdentity::new(provider_id, "desk@cityclinic.org", "City Clinic")
    }
}
