//! Clinic and user models.

use serde::{Deserialize, Serialize};

use super::choices::choice_enum;

choice_enum! {
    /// Role of a user within the portal.
    Role {
        Clinician => "clinician",
        Admin => "admin",
        LabTech => "lab_tech",
    }
    default Clinician
}

/// A clinic: the tenant boundary for patients and their records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Clinic {
    pub id: String,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    /// Logo location under the media root, if uploaded
    pub logo_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Clinic {
    pub fn new(name: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            address: String::new(),
            phone: String::new(),
            email: String::new(),
            logo_url: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Editable clinic contact fields; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClinicUpdate {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub logo_url: Option<String>,
}

/// A portal user. Email is the only login identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    /// Lower-cased, unique
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub role: Role,
    pub clinic_id: Option<String>,
    pub is_staff: bool,
    pub active: bool,
    /// Argon2 PHC string; never serialized
    #[serde(skip)]
    pub password_hash: String,
    pub last_login: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn new(email: String, first_name: String, last_name: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            email,
            first_name,
            last_name,
            phone: String::new(),
            role: Role::Clinician,
            clinic_id: None,
            is_staff: false,
            active: true,
            password_hash: String::new(),
            last_login: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Staff and admins see every clinic's records.
    pub fn is_privileged(&self) -> bool {
        self.is_staff || self.role == Role::Admin
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Editable profile fields; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}
