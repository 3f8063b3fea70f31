//! Patient models.

use serde::{Deserialize, Serialize};

use super::choices::choice_enum;

choice_enum! {
    Gender {
        Male => "male",
        Female => "female",
        Other => "other",
        Unspecified => "",
    }
    default Unspecified
}

/// A patient, always owned by exactly one clinic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: String,
    /// Identifier from an outside system; unique when present
    pub external_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    /// ISO 8601 date (YYYY-MM-DD)
    pub date_of_birth: String,
    pub gender: Gender,
    /// Weight in kg
    pub weight: Option<f64>,
    pub clinic_id: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Patient {
    pub fn new(
        first_name: String,
        last_name: String,
        date_of_birth: String,
        clinic_id: String,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            external_id: None,
            first_name,
            last_name,
            date_of_birth,
            gender: Gender::Unspecified,
            weight: None,
            clinic_id,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Input for creating a patient.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NewPatient {
    pub external_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub gender: Gender,
    pub weight: Option<f64>,
    /// Template for the first prescription; first active template if absent
    pub template_id: Option<String>,
}

/// Patient fields that may change after creation; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PatientUpdate {
    pub external_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<Gender>,
    pub weight: Option<f64>,
}
