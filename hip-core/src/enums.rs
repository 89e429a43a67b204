//! Closed vocabularies used by clinical documents.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Medical severity of a patient record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    High,
    Low,
    Severe,
    Normal,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "High",
            Severity::Low => "Low",
            Severity::Severe => "Severe",
            Severity::Normal => "Normal",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "High" => Ok(Severity::High),
            "Low" => Ok(Severity::Low),
            "Severe" => Ok(Severity::Severe),
            "Normal" => Ok(Severity::Normal),
            other => Err(ValidationError::InvalidValue {
                field: "medical_severity".to_string(),
                reason: format!("unknown severity '{}'", other),
            }),
        }
    }
}

/// Appointment lifecycle state as set by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AppointmentStatus {
    #[default]
    Pending,
    Confirmed,
    Rejected,
    #[serde(rename = "Not Available")]
    NotAvailable,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "Pending",
            AppointmentStatus::Confirmed => "Confirmed",
            AppointmentStatus::Rejected => "Rejected",
            AppointmentStatus::NotAvailable => "Not Available",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing status of a patient's client-stats row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AccountStatus {
    #[default]
    Trial,
    Active,
    Suspended,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Trial => "Trial",
            AccountStatus::Active => "Active",
            AccountStatus::Suspended => "Suspended",
        }
    }
}
