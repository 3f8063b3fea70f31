//! Account form validation: registration, email and password rules.

use serde::{Deserialize, Serialize};
use validator::ValidateEmail;

use super::FieldErrors;

const MAX_EMAIL_LEN: usize = 254;
const MIN_PASSWORD_LEN: usize = 8;

/// Trim, validate and lower-case an email address.
pub fn normalize_email(email: &str) -> Result<String, String> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err("This field is required.".to_string());
    }
    if trimmed.len() > MAX_EMAIL_LEN {
        return Err(format!(
            "Email address exceeds maximum length of {MAX_EMAIL_LEN} characters"
        ));
    }
    if !trimmed.validate_email() {
        return Err("Enter a valid email address.".to_string());
    }

    Ok(trimmed.to_lowercase())
}

/// Password strength rules; returns every rule the password breaks.
pub fn validate_password(password: &str) -> Vec<String> {
    let mut problems = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LEN {
        problems.push(format!(
            "This password is too short. It must contain at least {MIN_PASSWORD_LEN} characters."
        ));
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("This password is entirely numeric.".to_string());
    }

    problems
}

/// Split a display name into first name and the remainder.
pub fn split_name(name: &str) -> (String, String) {
    let mut parts = name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let rest = parts.collect::<Vec<_>>().join(" ");
    (first, rest)
}

/// Self-service registration form: one user plus their clinic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub phone: String,
    pub clinic_name: String,
    pub clinic_address: String,
    pub clinic_phone: String,
    pub clinic_email: String,
}

/// Registration data after validation and normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRegistration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub clinic_name: String,
    pub clinic_address: String,
    pub clinic_phone: String,
    pub clinic_email: String,
}

impl RegistrationRequest {
    /// Check every field, collecting all problems before failing.
    pub fn validate(&self) -> Result<ValidRegistration, FieldErrors> {
        let mut errors = FieldErrors::new();

        let required = [
            ("name", &self.name),
            ("phone", &self.phone),
            ("clinic_name", &self.clinic_name),
            ("clinic_address", &self.clinic_address),
            ("clinic_phone", &self.clinic_phone),
            ("password", &self.password),
            ("password_confirm", &self.password_confirm),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                errors.add(field, "This field is required.");
            }
        }

        let email = normalize_email(&self.email).map_err(|msg| errors.add("email", msg)).ok();
        let clinic_email = normalize_email(&self.clinic_email)
            .map_err(|msg| errors.add("clinic_email", msg))
            .ok();

        if !self.password.is_empty() {
            for problem in validate_password(&self.password) {
                errors.add("password", problem);
            }
        }
        if self.password != self.password_confirm {
            errors.add("password", "Password fields didn't match.");
        }

        errors.into_result()?;

        let (first_name, last_name) = split_name(&self.name);
        Ok(ValidRegistration {
            first_name,
            last_name,
            email: email.unwrap_or_default(),
            password: self.password.clone(),
            phone: self.phone.trim().to_string(),
            clinic_name: self.clinic_name.trim().to_string(),
            clinic_address: self.clinic_address.trim().to_string(),
            clinic_phone: self.clinic_phone.trim().to_string(),
            clinic_email: clinic_email.unwrap_or_default(),
        })
    }
}
