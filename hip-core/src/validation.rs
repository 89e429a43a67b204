//! Field-level validation helpers shared by the input types.

use crate::error::ValidationError;

/// Check that `value` is non-blank and its character count lies in `min..=max`.
pub fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), ValidationError> {
    let len = value.trim().chars().count();
    if len == 0 && min > 0 {
        return Err(ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        });
    }
    if len < min || len > max {
        return Err(ValidationError::LengthOutOfRange {
            field: field.to_string(),
            min,
            max,
        });
    }
    Ok(())
}

/// Same as [`check_len`] but an absent value is accepted.
pub fn check_optional_len(
    field: &str,
    value: Option<&str>,
    min: usize,
    max: usize,
) -> Result<(), ValidationError> {
    match value {
        Some(v) => check_len(field, v, min, max),
        None => Ok(()),
    }
}

/// Minimal shape check: one `@` with something on both sides and a dot in the domain.
pub fn check_email(field: &str, value: &str) -> Result<(), ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        });
    }
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidValue {
            field: field.to_string(),
            reason: "not a valid email address".to_string(),
        })
    }
}
