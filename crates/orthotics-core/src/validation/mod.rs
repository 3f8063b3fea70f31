//! Input coercion and validation.
//!
//! Everything that reaches the services from an outer surface passes
//! through here first: loosely typed form payloads are coerced field by
//! field, uploads are checked for extension, size and content, and
//! account forms are checked before any row is written.

pub mod account;
pub mod coerce;
pub mod upload;

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

pub use account::{normalize_email, split_name, validate_password, RegistrationRequest, ValidRegistration};
pub use coerce::{apply_update, coerce_value, FieldKind, FieldSchema, FieldSpec, UpdateMode};
pub use upload::{file_extension, sanitize_filename, validate_scan_file, ScanLimits, UploadedFile};

/// Field name used for errors that are not tied to a single field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Field-level validation messages, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single message for a single field.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn merge(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// `Ok(())` when no message was recorded.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// JSON object of field to messages.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_errors_accumulate() {
        let mut errors = FieldErrors::new();
        assert!(errors.is_empty());

        errors.add("email", "Enter a valid email address.");
        errors.add("email", "This field is required.");
        errors.add("password", "Too short.");

        assert_eq!(errors.get("email").map(|m| m.len()), Some(2));
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["email", "password"]);
        assert!(errors.clone().into_result().is_err());
    }

    #[test]
    fn test_field_errors_json_and_display() {
        let errors = FieldErrors::single("clinic", "User does not have an associated clinic");
        assert_eq!(
            errors.to_json(),
            r#"{"clinic":["User does not have an associated clinic"]}"#
        );
        assert_eq!(
            errors.to_string(),
            "clinic: User does not have an associated clinic"
        );
    }

    #[test]
    fn test_merge() {
        let mut a = FieldErrors::single("left_foot", "bad");
        a.merge(FieldErrors::single("right_foot", "worse"));
        assert_eq!(a.fields().count(), 2);
    }
}
