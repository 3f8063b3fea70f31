//! Patients. Creating one also opens their first prescription.

use chrono::NaiveDate;

use super::prescriptions::{prescription_files, resolve_template};
use super::uploads::remove_media;
use super::{actor_clinic, ensure_visible, required};
use crate::access::{Aggregate, TenantScope};
use crate::config::CoreConfig;
use crate::db::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::media::MediaStore;
use crate::models::{NewPatient, Patient, PatientUpdate, Prescription, User};
use crate::validation::FieldErrors;

const DATE_FORMAT: &str = "%Y-%m-%d";

fn check_date(field: &str, value: &str, errors: &mut FieldErrors) {
    if !value.trim().is_empty() && NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).is_err() {
        errors.add(
            field,
            "Date has wrong format. Use one of these formats instead: YYYY-MM-DD.",
        );
    }
}

fn check_weight(weight: Option<f64>, errors: &mut FieldErrors) {
    if let Some(weight) = weight {
        if !weight.is_finite() || weight < 0.0 {
            errors.add("weight", "Ensure this value is greater than or equal to 0.");
        }
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub struct PatientService<'a> {
    db: &'a Database,
    config: &'a CoreConfig,
    media: &'a dyn MediaStore,
}

impl<'a> PatientService<'a> {
    pub fn new(db: &'a Database, config: &'a CoreConfig, media: &'a dyn MediaStore) -> Self {
        Self { db, config, media }
    }

    pub fn list(&self, actor: &User) -> ServiceResult<Vec<Patient>> {
        Ok(self.db.list_patients(&TenantScope::for_actor(actor))?)
    }

    pub fn get(&self, actor: &User, id: &str) -> ServiceResult<Patient> {
        ensure_visible(self.db, actor, Aggregate::Patient, id)?;
        self.db
            .get_patient(id)?
            .ok_or_else(|| ServiceError::not_found(format!("Patient {}", id)))
    }

    /// Create a patient in the actor's clinic together with their first
    /// prescription, written by the actor.
    pub fn create(&self, actor: &User, input: NewPatient) -> ServiceResult<(Patient, Prescription)> {
        let mut errors = FieldErrors::new();
        for (field, value) in [
            ("first_name", &input.first_name),
            ("last_name", &input.last_name),
            ("date_of_birth", &input.date_of_birth),
        ] {
            if value.trim().is_empty() {
                errors.add(field, "This field is required.");
            }
        }
        check_date("date_of_birth", &input.date_of_birth, &mut errors);
        check_weight(input.weight, &mut errors);
        errors.into_result()?;

        let clinic_id = actor_clinic(actor)?;
        let external_id = blank_to_none(input.external_id);
        self.ensure_unique_external_id(external_id.as_deref(), None)?;

        let mut patient = Patient::new(
            input.first_name.trim().to_string(),
            input.last_name.trim().to_string(),
            input.date_of_birth.trim().to_string(),
            clinic_id.to_string(),
        );
        patient.external_id = external_id;
        patient.gender = input.gender;
        patient.weight = input.weight;

        let rx = self.db.atomic(|db| -> ServiceResult<Prescription> {
            db.insert_patient(&patient)?;
            let template = resolve_template(db, self.config, input.template_id.as_deref())?;
            let rx = Prescription::new(patient.id.clone(), actor.id.clone(), template.id);
            db.insert_prescription(&rx)?;
            Ok(rx)
        })?;

        log::info!(
            "Created patient {} with prescription {} in clinic {}",
            patient.id,
            rx.id,
            patient.clinic_id
        );
        Ok((patient, rx))
    }

    pub fn update(&self, actor: &User, id: &str, update: PatientUpdate) -> ServiceResult<Patient> {
        let mut patient = self.get(actor, id)?;

        let mut errors = FieldErrors::new();
        if let Some(dob) = &update.date_of_birth {
            check_date("date_of_birth", dob, &mut errors);
        }
        check_weight(update.weight, &mut errors);
        errors.into_result()?;

        if let Some(first_name) = update.first_name {
            patient.first_name = required("first_name", &first_name)?;
        }
        if let Some(last_name) = update.last_name {
            patient.last_name = required("last_name", &last_name)?;
        }
        if let Some(dob) = update.date_of_birth {
            patient.date_of_birth = required("date_of_birth", &dob)?;
        }
        if update.external_id.is_some() {
            let external_id = blank_to_none(update.external_id);
            self.ensure_unique_external_id(external_id.as_deref(), Some(id))?;
            patient.external_id = external_id;
        }
        if let Some(gender) = update.gender {
            patient.gender = gender;
        }
        if update.weight.is_some() {
            patient.weight = update.weight;
        }

        self.db.update_patient(&patient)?;
        self.get(actor, id)
    }

    /// Delete a patient and everything recorded for them.
    pub fn delete(&self, actor: &User, id: &str) -> ServiceResult<()> {
        ensure_visible(self.db, actor, Aggregate::Patient, id)?;

        let mut files = Vec::new();
        for rx in self.db.list_prescriptions_for_patient(id)? {
            files.extend(prescription_files(self.db, &rx.id)?);
        }
        self.db.delete_patient(id)?;
        remove_media(self.media, &files);

        log::info!("Deleted patient {}", id);
        Ok(())
    }

    /// Prescriptions of a patient, newest first.
    pub fn prescriptions(&self, actor: &User, patient_id: &str) -> ServiceResult<Vec<Prescription>> {
        ensure_visible(self.db, actor, Aggregate::Patient, patient_id)?;
        Ok(self.db.list_prescriptions_for_patient(patient_id)?)
    }

    fn ensure_unique_external_id(&self, external_id: Option<&str>, except: Option<&str>) -> ServiceResult<()> {
        let Some(external_id) = external_id else {
            return Ok(());
        };
        match self.db.get_patient_by_external_id(external_id)? {
            Some(existing) if Some(existing.id.as_str()) != except => Err(ServiceError::validation(
                "external_id",
                "patient with this external id already exists.",
            )),
            _ => Ok(()),
        }
    }
}
