//! Provider (tenant) records held by the transactional store, and the
//! denormalized profile copy held by the document store.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::{License, ProviderId, Timestamp};
use crate::validation::{check_email, check_len};

/// Remaining-requests budget written into every new preference row.
pub const DEFAULT_REQUEST_QUOTA: i64 = 100;

/// Appointment fee written into every new preference row.
pub const DEFAULT_APPOINTMENT_FEE: i64 = 100;

/// Postal address attached to providers and patients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub country: String,
    pub state: String,
    pub city: String,
    pub landmark: String,
}

impl Address {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_len("address.country", &self.country, 1, 30)?;
        check_len("address.state", &self.state, 1, 20)?;
        check_len("address.city", &self.city, 1, 30)?;
        check_len("address.landmark", &self.landmark, 1, 45)?;
        Ok(())
    }
}

/// Signup payload.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProvider {
    pub name: String,
    pub email: String,
    pub availability: String,
    pub total_facilities: u32,
    pub total_mbbs_doc: u32,
    pub total_worker: u32,
    pub no_of_beds: u32,
    pub about: String,
    pub password: String,
    pub address: Address,
}

impl NewProvider {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_len("name", &self.name, 5, 20)?;
        check_email("email", &self.email)?;
        check_len("availability", &self.availability, 2, 15)?;
        check_len("about", &self.about, 5, 200)?;
        if self.password.chars().count() < 3 {
            return Err(ValidationError::InvalidValue {
                field: "password".to_string(),
                reason: "must be at least 3 characters".to_string(),
            });
        }
        self.address.validate()
    }

    /// Build the stored profile once identifiers have been allocated.
    pub fn into_profile(
        self,
        provider_id: ProviderId,
        license: License,
        registered_at: Timestamp,
    ) -> ProviderProfile {
        ProviderProfile {
            provider_id,
            license,
            name: self.name,
            email: self.email,
            availability: self.availability,
            total_facilities: self.total_facilities,
            total_mbbs_doc: self.total_mbbs_doc,
            total_worker: self.total_worker,
            no_of_beds: self.no_of_beds,
            about: self.about,
            registered_at,
            address: self.address,
        }
    }
}

impl fmt::Debug for NewProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewProvider")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("availability", &self.availability)
            .field("password", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Provider profile. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProfile {
    #[serde(rename = "healthcare_id")]
    pub provider_id: ProviderId,
    #[serde(rename = "healthcare_license")]
    pub license: License,
    pub name: String,
    pub email: String,
    pub availability: String,
    pub total_facilities: u32,
    pub total_mbbs_doc: u32,
    pub total_worker: u32,
    pub no_of_beds: u32,
    pub about: String,
    #[serde(rename = "date_of_registration")]
    pub registered_at: Timestamp,
    pub address: Address,
}

/// What the transactional store needs to create a provider.
#[derive(Clone)]
pub struct ProviderRegistration {
    pub profile: ProviderProfile,
    pub password_hash: String,
}

impl fmt::Debug for ProviderRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistration")
            .field("profile", &self.profile)
            .field("password_hash", &"[REDACTED]")
            .finish()
    }
}

/// Credential row looked up at login.
#[derive(Clone)]
pub struct ProviderCredentials {
    pub provider_id: ProviderId,
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("provider_id", &self.provider_id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password_hash", &"[REDACTED]")
            .finish()
    }
}

/// Preference view: profile email joined with the preference row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderPreferences {
    pub email: String,
    pub is_available: bool,
    pub scheduled_deletion: bool,
}

/// Whitelisted partial update of provider preferences.
///
/// Unknown keys are rejected at deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PreferenceUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_available: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_deletion: Option<bool>,
}

impl PreferenceUpdate {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.is_available.is_none() && self.scheduled_deletion.is_none()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::EmptyUpdate);
        }
        if let Some(email) = &self.email {
            check_email("email", email)?;
        }
        Ok(())
    }

    /// Apply the update to an existing view.
    pub fn apply_to(&self, prefs: &mut ProviderPreferences) {
        if let Some(email) = &self.email {
            prefs.email = email.clone();
        }
        if let Some(available) = self.is_available {
            prefs.is_available = available;
        }
        if let Some(deletion) = self.scheduled_deletion {
            prefs.scheduled_deletion = deletion;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NewProvider {
        NewProvider {
            name: "City Clinic".to_string(),
            email: "desk@cityclinic.org".to_string(),
            availability: "24x7".to_string(),
            total_facilities: 6,
            total_mbbs_doc: 8,
            total_worker: 12,
            no_of_beds: 10,
            about: "General practice".to_string(),
            password: "s3cret".to_string(),
            address: Address {
                country: "India".to_string(),
                state: "Kerala".to_string(),
                city: "Kochi".to_string(),
                landmark: "Near the harbour".to_string(),
            },
        }
    }

    #[test]
    fn test_new_provider_validates() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_new_provider_rejects_short_name() {
        let mut p = sample();
        p.name = "Doc".to_string();
        assert_eq!(
            p.validate().err().and_then(|e| e.field().map(str::to_string)),
            Some("name".to_string())
        );
    }

    #[test]
    fn test_new_provider_debug_redacts_password() {
        let rendered = format!("{:?}", sample());
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_preference_update_rejects_unknown_fields() {
        let parsed: Result<PreferenceUpdate, _> =
            serde_json::from_str(r#"{"is_available": false, "account_locked": true}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_empty_preference_update_invalid() {
        assert_eq!(
            PreferenceUpdate::default().validate(),
            Err(ValidationError::EmptyUpdate)
        );
    }

    #[test]
    fn test_preference_update_apply() {
        let mut prefs = ProviderPreferences {
            email: "old@clinic.org".to_string(),
            is_available: true,
            scheduled_deletion: false,
        };
        let update = PreferenceUpdate {
            is_available: Some(false),
            ..Default::default()
        };
        update.apply_to(&mut prefs);
        assert!(!prefs.is_available);
        assert_eq!(prefs.email, "old@clinic.org");
    }
}
