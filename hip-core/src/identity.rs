//! Identity types for HIP entities

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Prefix on every provider (tenant) identifier.
pub const PROVIDER_ID_PREFIX: &str = "HCID";

/// Prefix on every patient health identifier.
pub const HEALTH_ID_PREFIX: &str = "HID";

/// Number of random hex characters appended after the prefix.
const ID_FRAGMENT_LEN: usize = 20;

fn random_fragment() -> String {
    let simple = Uuid::new_v4().simple().to_string();
    simple[..ID_FRAGMENT_LEN].to_string()
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier, rejecting blank values.
            pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
                let value = value.into();
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(ValidationError::RequiredFieldMissing {
                        field: $field.to_string(),
                    });
                }
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a registered healthcare provider. This is the tenant key.
    ProviderId,
    "healthcare_id"
);

string_id!(
    /// Identifier of a patient, shared across providers.
    HealthId,
    "health_id"
);

string_id!(
    /// Operating license issued to a provider at signup.
    License,
    "healthcare_license"
);

impl ProviderId {
    /// Allocate a fresh provider id together with its license.
    ///
    /// Both carry the same random fragment.
    pub fn generate() -> (Self, License) {
        let fragment = random_fragment();
        (
            Self(format!("{PROVIDER_ID_PREFIX}{fragment}")),
            License(fragment),
        )
    }
}

impl HealthId {
    /// Allocate a fresh patient health id.
    pub fn generate() -> Self {
        Self(format!("{HEALTH_ID_PREFIX}{}", random_fragment()))
    }
}

/// UUIDv7 identifier of a clinical record document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn now_v7() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// UUIDv7 identifier of an appointment document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppointmentId(pub Uuid);

impl AppointmentId {
    pub fn now_v7() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for AppointmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The authenticated caller of a request.
///
/// Built only from a verified credential and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantIdentity {
    pub provider_id: ProviderId,
    pub email: String,
    pub name: String,
}

impl TenantIdentity {
    pub fn new(provider_id: ProviderId, email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            provider_id,
            email: email.into(),
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_provider_id_shares_fragment_with_license() {
        let (id, license) = ProviderId::generate();
        assert!(id.as_str().starts_with(PROVIDER_ID_PREFIX));
        assert_eq!(id.as_str().len(), PROVIDER_ID_PREFIX.len() + ID_FRAGMENT_LEN);
        assert_eq!(&id.as_str()[PROVIDER_ID_PREFIX.len()..], license.as_str());
    }

    #[test]
    fn test_generated_health_ids_are_distinct() {
        let a = HealthId::generate();
        let b = HealthId::generate();
        assert!(a.as_str().starts_with(HEALTH_ID_PREFIX));
        assert_ne!(a, b);
    }

    #[test]
    fn test_blank_id_rejected() {
        assert!(ProviderId::new("   ").is_err());
        assert_eq!(
            HealthId::new(""),
            Err(ValidationError::RequiredFieldMissing {
                field: "health_id".to_string()
            })
        );
    }

    #[test]
    fn test_id_trims_and_serializes_transparently() -> Result<(), serde_json::Error> {
        let id = ProviderId::new(" HCID123 ").expect("non-blank id");
        assert_eq!(id.as_str(), "HCID123");
        assert_eq!(serde_json::to_string(&id)?, "\"HCID123\"");
        Ok(())
    }
}
