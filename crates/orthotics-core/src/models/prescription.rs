//! The prescription aggregate.

use serde::{Deserialize, Serialize};

use super::choices::choice_enum;
use super::details::{
    Administration, ClinicalMeasure, DetailEntry, DeviceOption, IntrinsicAdjustment,
    MaterialSelection, OffLoading, PlantarModifier, Posting, ShoeFitting,
};
use super::{Attachment, LookupOption, Patient, Scan, Template};

choice_enum! {
    /// Manufacturing turnaround.
    Turnaround {
        /// 3DP standard, 5 working days
        Standard => "standard",
        /// 3DP express, 3 working days
        Express => "express",
        /// 3DP urgent, 1 working day
        Urgent => "urgent",
    }
    default Standard
}

/// One orthotic device build for one patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prescription {
    pub id: String,
    pub patient_id: String,
    pub clinician_id: String,
    pub template_id: String,
    pub status_id: Option<String>,
    pub foot_type_id: Option<String>,
    pub wear_time_id: Option<String>,
    pub activity_level_id: Option<String>,
    pub turnaround: Turnaround,
    pub contact_clinician: bool,
    pub confirm_before_manufacture: bool,
    pub clinician_computer_aided_design: bool,
    pub general_notes: String,
    pub left_foot_notes: String,
    pub right_foot_notes: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Prescription {
    pub fn new(patient_id: String, clinician_id: String, template_id: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            patient_id,
            clinician_id,
            template_id,
            status_id: None,
            foot_type_id: None,
            wear_time_id: None,
            activity_level_id: None,
            turnaround: Turnaround::Standard,
            contact_clinician: false,
            confirm_before_manufacture: false,
            clinician_computer_aided_design: false,
            general_notes: String::new(),
            left_foot_notes: String::new(),
            right_foot_notes: String::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// The administration facet as an editable record.
    pub fn administration(&self) -> Administration {
        Administration {
            status: self.status_id.clone(),
            foot_type: self.foot_type_id.clone(),
            wear_time: self.wear_time_id.clone(),
            activity_level: self.activity_level_id.clone(),
            turnaround: self.turnaround,
            contact_clinician: self.contact_clinician,
            confirm_before_manufacture: self.confirm_before_manufacture,
            clinician_computer_aided_design: self.clinician_computer_aided_design,
            general_notes: self.general_notes.clone(),
            left_foot_notes: self.left_foot_notes.clone(),
            right_foot_notes: self.right_foot_notes.clone(),
        }
    }

    pub fn apply_administration(&mut self, admin: Administration) {
        self.status_id = admin.status;
        self.foot_type_id = admin.foot_type;
        self.wear_time_id = admin.wear_time;
        self.activity_level_id = admin.activity_level;
        self.turnaround = admin.turnaround;
        self.contact_clinician = admin.contact_clinician;
        self.confirm_before_manufacture = admin.confirm_before_manufacture;
        self.clinician_computer_aided_design = admin.clinician_computer_aided_design;
        self.general_notes = admin.general_notes;
        self.left_foot_notes = admin.left_foot_notes;
        self.right_foot_notes = admin.right_foot_notes;
    }
}

/// List row for a prescription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionSummary {
    pub id: String,
    pub patient_id: String,
    pub patient_name: String,
    pub clinician_id: String,
    pub clinician_name: String,
    pub template_id: String,
    pub template_name: String,
    pub status_name: Option<String>,
    pub turnaround: Turnaround,
    pub created_at: String,
    pub updated_at: String,
}

/// Filters for listing prescriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PrescriptionFilter {
    pub patient_id: Option<String>,
    pub clinician_id: Option<String>,
    pub template_id: Option<String>,
}

/// A prescription with everything it refers to and every detail record that
/// exists so far.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PrescriptionView {
    #[serde(flatten)]
    pub prescription: Prescription,
    pub patient: Patient,
    pub clinician_name: String,
    pub template: Template,
    pub status: Option<LookupOption>,
    pub foot_type: Option<LookupOption>,
    pub wear_time: Option<LookupOption>,
    pub activity_level: Option<LookupOption>,
    pub clinical_measures: Option<DetailEntry<ClinicalMeasure>>,
    pub intrinsic_adjustments: Option<DetailEntry<IntrinsicAdjustment>>,
    pub off_loading: Option<DetailEntry<OffLoading>>,
    pub plantar_modifiers: Option<DetailEntry<PlantarModifier>>,
    pub postings: Option<DetailEntry<Posting>>,
    pub material_selection: Option<DetailEntry<MaterialSelection>>,
    pub shoe_fitting: Option<DetailEntry<ShoeFitting>>,
    pub device_options: Option<DetailEntry<DeviceOption>>,
    pub scans: Vec<Scan>,
    pub attachments: Vec<Attachment>,
}
