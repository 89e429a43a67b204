//! Patient documents: biodata, clinical records and client stats.

use serde::{Deserialize, Serialize};

use crate::enums::{AccountStatus, Severity};
use crate::error::ValidationError;
use crate::identity::{HealthId, ProviderId, RecordId, Timestamp};
use crate::provider::Address;
use crate::validation::{check_email, check_len, check_optional_len};

/// Starting balance of a new patient's client-stats row.
pub const DEFAULT_AVAILABLE_MONEY: i64 = 5000;

/// Biodata submitted when a provider registers a patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPatientBiodata {
    pub fname: String,
    #[serde(default)]
    pub middlename: Option<String>,
    pub lname: String,
    pub sex: String,
    pub dob: String,
    pub bloodgrp: String,
    pub bmi: String,
    pub marriage_status: String,
    pub weight: String,
    pub email: String,
    pub mobilenumber: String,
    pub aadhaar_number: String,
    pub primary_location: String,
    pub sibling: String,
    pub twin: String,
    pub fathername: String,
    pub mothername: String,
    pub emergencynumber: String,
    pub address: Address,
}

impl NewPatientBiodata {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_len("fname", &self.fname, 3, 10)?;
        check_optional_len("middlename", self.middlename.as_deref(), 0, 10)?;
        check_len("lname", &self.lname, 3, 10)?;
        check_len("sex", &self.sex, 1, 5)?;
        check_len("dob", &self.dob, 1, 15)?;
        check_len("bloodgrp", &self.bloodgrp, 1, 20)?;
        check_len("bmi", &self.bmi, 1, 10)?;
        check_len("marriage_status", &self.marriage_status, 1, 20)?;
        check_len("weight", &self.weight, 1, 10)?;
        check_email("email", &self.email)?;
        check_len("email", &self.email, 1, 50)?;
        check_len("mobilenumber", &self.mobilenumber, 1, 10)?;
        check_len("aadhaar_number", &self.aadhaar_number, 1, 20)?;
        check_len("primary_location", &self.primary_location, 1, 50)?;
        check_len("sibling", &self.sibling, 1, 10)?;
        check_len("twin", &self.twin, 1, 10)?;
        check_len("fathername", &self.fathername, 1, 10)?;
        check_len("mothername", &self.mothername, 1, 10)?;
        check_len("emergencynumber", &self.emergencynumber, 1, 10)?;
        self.address.validate()
    }

    /// Stamp identifiers and timestamps onto the submitted biodata.
    pub fn into_biodata(
        self,
        health_id: HealthId,
        provider_id: ProviderId,
        now: Timestamp,
    ) -> PatientBiodata {
        PatientBiodata {
            health_id,
            provider_id: Some(provider_id),
            fname: self.fname,
            middlename: self.middlename,
            lname: self.lname,
            sex: self.sex,
            dob: self.dob,
            bloodgrp: self.bloodgrp,
            bmi: self.bmi,
            marriage_status: self.marriage_status,
            weight: self.weight,
            email: self.email,
            mobilenumber: self.mobilenumber,
            aadhaar_number: self.aadhaar_number,
            primary_location: self.primary_location,
            sibling: self.sibling,
            twin: self.twin,
            fathername: self.fathername,
            mothername: self.mothername,
            emergencynumber: self.emergencynumber,
            created_at: now,
            updated_at: now,
            address: self.address,
        }
    }
}

/// Stored patient biodata document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientBiodata {
    pub health_id: HealthId,
    /// Provider that registered the patient. `None` marks an orphaned document.
    #[serde(rename = "healthcare_id", default)]
    pub provider_id: Option<ProviderId>,
    pub fname: String,
    #[serde(default)]
    pub middlename: Option<String>,
    pub lname: String,
    pub sex: String,
    pub dob: String,
    pub bloodgrp: String,
    pub bmi: String,
    pub marriage_status: String,
    pub weight: String,
    pub email: String,
    pub mobilenumber: String,
    pub aadhaar_number: String,
    pub primary_location: String,
    pub sibling: String,
    pub twin: String,
    pub fathername: String,
    pub mothername: String,
    pub emergencynumber: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub address: Address,
}

impl PatientBiodata {
    pub fn is_orphaned(&self) -> bool {
        self.provider_id.is_none()
    }
}

/// Whitelisted partial merge for patient biodata.
///
/// Identity, ownership and timestamps are not updatable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BiodataUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middlename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bloodgrp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marriage_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobilenumber: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergencynumber: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

impl BiodataUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::EmptyUpdate);
        }
        check_optional_len("fname", self.fname.as_deref(), 3, 10)?;
        check_optional_len("middlename", self.middlename.as_deref(), 0, 10)?;
        check_optional_len("lname", self.lname.as_deref(), 3, 10)?;
        check_optional_len("bloodgrp", self.bloodgrp.as_deref(), 1, 20)?;
        check_optional_len("bmi", self.bmi.as_deref(), 1, 10)?;
        check_optional_len("marriage_status", self.marriage_status.as_deref(), 1, 20)?;
        check_optional_len("weight", self.weight.as_deref(), 1, 10)?;
        if let Some(email) = &self.email {
            check_email("email", email)?;
        }
        check_optional_len("mobilenumber", self.mobilenumber.as_deref(), 1, 10)?;
        check_optional_len("primary_location", self.primary_location.as_deref(), 1, 50)?;
        check_optional_len("emergencynumber", self.emergencynumber.as_deref(), 1, 10)?;
        if let Some(address) = &self.address {
            address.validate()?;
        }
        Ok(())
    }

    /// Merge into `target`. Returns whether any field actually changed.
    ///
    /// `updated_at` is only touched when something changed.
    pub fn merge_into(&self, target: &mut PatientBiodata, now: Timestamp) -> bool {
        let mut changed = false;

        fn set<T: PartialEq + Clone>(slot: &mut T, value: &Option<T>, changed: &mut bool) {
            if let Some(v) = value {
                if slot != v {
                    *slot = v.clone();
                    *changed = true;
                }
            }
        }

        set(&mut target.fname, &self.fname, &mut changed);
        if let Some(middle) = &self.middlename {
            if target.middlename.as_ref() != Some(middle) {
                target.middlename = Some(middle.clone());
                changed = true;
            }
        }
        set(&mut target.lname, &self.lname, &mut changed);
        set(&mut target.bloodgrp, &self.bloodgrp, &mut changed);
        set(&mut target.bmi, &self.bmi, &mut changed);
        set(&mut target.marriage_status, &self.marriage_status, &mut changed);
        set(&mut target.weight, &self.weight, &mut changed);
        set(&mut target.email, &self.email, &mut changed);
        set(&mut target.mobilenumber, &self.mobilenumber, &mut changed);
        set(&mut target.primary_location, &self.primary_location, &mut changed);
        set(&mut target.emergencynumber, &self.emergencynumber, &mut changed);
        set(&mut target.address, &self.address, &mut changed);

        if changed {
            target.updated_at = now;
        }
        changed
    }
}

/// Record submitted by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPatientRecord {
    pub health_id: HealthId,
    pub issue: String,
    pub description: String,
    pub medical_severity: Severity,
}

impl NewPatientRecord {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_len("issue", &self.issue, 3, 20)?;
        check_len("description", &self.description, 3, 50)?;
        Ok(())
    }

    pub fn into_record(self, created_by: ProviderId, now: Timestamp) -> PatientRecord {
        PatientRecord {
            record_id: RecordId::now_v7(),
            health_id: self.health_id,
            created_by: Some(created_by),
            issue: self.issue,
            description: self.description,
            medical_severity: self.medical_severity,
            created_at: now,
        }
    }
}

/// Stored clinical record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub record_id: RecordId,
    pub health_id: HealthId,
    /// Authoring provider. `None` marks an orphaned record.
    #[serde(default)]
    pub created_by: Option<ProviderId>,
    pub issue: String,
    pub description: String,
    pub medical_severity: Severity,
    pub created_at: Timestamp,
}

impl PatientRecord {
    pub fn is_orphaned(&self) -> bool {
        self.created_by.is_none()
    }
}

/// Filter for listing a patient's records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub health_id: HealthId,
    pub severity: Option<Severity>,
    pub limit: usize,
}

/// Per-patient billing and usage counters kept in the transactional store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientStats {
    pub health_id: HealthId,
    pub status: AccountStatus,
    pub available_money: i64,
    pub records_count: i64,
    pub appointments_count: i64,
}

impl ClientStats {
    /// Stats row created alongside new biodata.
    pub fn trial(health_id: HealthId) -> Self {
        Self {
            health_id,
            status: AccountStatus::Trial,
            available_money: DEFAULT_AVAILABLE_MONEY,
            records_count: 0,
            appointments_count: 0,
        }
    }
}
