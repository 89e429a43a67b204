//! Appointment documents.

use serde::{Deserialize, Serialize};

use crate::enums::AppointmentStatus;
use crate::identity::{AppointmentId, HealthId, ProviderId, Timestamp};

/// Appointment booked by a patient against a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub appointment_id: AppointmentId,
    /// Owning provider. `None` marks an orphaned appointment.
    #[serde(rename = "healthcare_id", default)]
    pub provider_id: Option<ProviderId>,
    #[serde(rename = "name")]
    pub provider_name: String,
    pub health_id: HealthId,
    pub appointment_date: String,
    pub appointment_time: String,
    pub department: String,
    #[serde(default)]
    pub note: String,
    pub fname: String,
    #[serde(default)]
    pub middlename: String,
    pub lname: String,
    #[serde(default)]
    pub status: AppointmentStatus,
    pub created_at: Timestamp,
}

impl Appointment {
    pub fn is_orphaned(&self) -> bool {
        self.provider_id.is_none()
    }
}

/// Provider's decision on one appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppointmentStatusUpdate {
    pub appointment_id: AppointmentId,
    pub health_id: HealthId,
    pub status: AppointmentStatus,
}
