//! The prescription aggregate and its detail sub-resources.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ensure_visible;
use super::uploads::remove_media;
use crate::access::{Aggregate, TenantScope};
use crate::config::CoreConfig;
use crate::db::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::media::MediaStore;
use crate::models::{
    Administration, ClinicalMeasure, DetailEntry, DetailKind, DetailRecord, DeviceOption,
    IntrinsicAdjustment, LookupKind, LookupOption, MaterialSelection, OffLoading,
    PlantarModifier, Posting, Prescription, PrescriptionFilter, PrescriptionSummary,
    PrescriptionView, ShoeFitting, Template, User,
};
use crate::validation::{apply_update, FieldErrors, UpdateMode};

const TEMPLATE_AUTO_DESCRIPTION: &str = "Auto-generated default template";

/// Input for creating a prescription.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewPrescription {
    pub patient_id: String,
    /// First active template, or the default template, when absent
    pub template_id: Option<String>,
}

/// A detail record of any kind, as returned to an outer surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailResponse {
    pub kind: DetailKind,
    /// Whether this call created the record.
    pub created: bool,
    pub record: Value,
}

impl DetailResponse {
    fn new<T: DetailRecord>((entry, created): (DetailEntry<T>, bool)) -> ServiceResult<Self> {
        Ok(Self {
            kind: T::KIND,
            created,
            record: to_value(&entry)?,
        })
    }
}

fn to_value<T: Serialize>(value: &T) -> ServiceResult<Value> {
    serde_json::to_value(value).map_err(|e| {
        log::error!("Failed to serialize detail record: {}", e);
        ServiceError::Internal
    })
}

/// Explicit template, else the first active one, else the default template
/// (created on demand).
pub(crate) fn resolve_template(
    db: &Database,
    config: &CoreConfig,
    explicit: Option<&str>,
) -> ServiceResult<Template> {
    if let Some(id) = explicit {
        return db.get_template(id)?.ok_or_else(|| {
            ServiceError::validation("template", format!("Invalid pk \"{}\" - object does not exist.", id))
        });
    }
    if let Some(template) = db.first_active_template()? {
        return Ok(template);
    }
    if let Some(template) = db.find_template_by_name(&config.default_template_name)? {
        return Ok(template);
    }

    let template = Template::new(
        config.default_template_name.clone(),
        TEMPLATE_AUTO_DESCRIPTION.to_string(),
    );
    db.insert_template(&template)?;
    log::info!("Created default template {}", template.id);
    Ok(template)
}

pub struct PrescriptionService<'a> {
    db: &'a Database,
    config: &'a CoreConfig,
    media: &'a dyn MediaStore,
}

impl<'a> PrescriptionService<'a> {
    pub fn new(db: &'a Database, config: &'a CoreConfig, media: &'a dyn MediaStore) -> Self {
        Self { db, config, media }
    }

    pub fn list(&self, actor: &User, filter: &PrescriptionFilter) -> ServiceResult<Vec<PrescriptionSummary>> {
        let scope = TenantScope::for_actor(actor);
        Ok(self.db.list_prescription_summaries(&scope, filter)?)
    }

    /// Create a prescription for a patient of the actor's clinic, written by
    /// the actor.
    pub fn create(&self, actor: &User, input: NewPrescription) -> ServiceResult<Prescription> {
        let patient = self.db.get_patient(&input.patient_id)?.ok_or_else(|| {
            ServiceError::validation(
                "patient",
                format!("Invalid pk \"{}\" - object does not exist.", input.patient_id),
            )
        })?;

        if !TenantScope::for_actor(actor).allows_clinic(&patient.clinic_id) {
            log::warn!(
                "User {} tried to prescribe for patient {} of another clinic",
                actor.id,
                patient.id
            );
            return Err(ServiceError::Forbidden(
                "Patient does not belong to your clinic".to_string(),
            ));
        }

        let rx = self.db.atomic(|db| -> ServiceResult<Prescription> {
            let template = resolve_template(db, self.config, input.template_id.as_deref())?;
            let rx = Prescription::new(patient.id.clone(), actor.id.clone(), template.id);
            db.insert_prescription(&rx)?;
            Ok(rx)
        })?;

        log::info!("Created prescription {} for patient {}", rx.id, patient.id);
        Ok(rx)
    }

    /// The bare prescription row.
    pub fn get(&self, actor: &User, id: &str) -> ServiceResult<Prescription> {
        ensure_visible(self.db, actor, Aggregate::Prescription, id)?;
        self.db
            .get_prescription(id)?
            .ok_or_else(|| ServiceError::not_found(format!("Prescription {}", id)))
    }

    /// The prescription with everything it refers to.
    pub fn view(&self, actor: &User, id: &str) -> ServiceResult<PrescriptionView> {
        let prescription = self.get(actor, id)?;

        let patient = self
            .db
            .get_patient(&prescription.patient_id)?
            .ok_or_else(|| ServiceError::not_found(format!("Patient {}", prescription.patient_id)))?;
        let template = self
            .db
            .get_template(&prescription.template_id)?
            .ok_or_else(|| ServiceError::not_found(format!("Template {}", prescription.template_id)))?;
        let clinician_name = self
            .db
            .get_user(&prescription.clinician_id)?
            .map(|user| user.full_name())
            .unwrap_or_default();

        Ok(PrescriptionView {
            status: self.lookup(prescription.status_id.as_deref())?,
            foot_type: self.lookup(prescription.foot_type_id.as_deref())?,
            wear_time: self.lookup(prescription.wear_time_id.as_deref())?,
            activity_level: self.lookup(prescription.activity_level_id.as_deref())?,
            clinical_measures: self.db.find_detail(id)?,
            intrinsic_adjustments: self.db.find_detail(id)?,
            off_loading: self.db.find_detail(id)?,
            plantar_modifiers: self.db.find_detail(id)?,
            postings: self.db.find_detail(id)?,
            material_selection: self.db.find_detail(id)?,
            shoe_fitting: self.db.find_detail(id)?,
            device_options: self.db.find_detail(id)?,
            scans: self.db.list_scans(id)?,
            attachments: self.db.list_attachments(id)?,
            patient,
            clinician_name,
            template,
            prescription,
        })
    }

    fn lookup(&self, id: Option<&str>) -> ServiceResult<Option<LookupOption>> {
        match id {
            Some(id) => Ok(self.db.get_lookup_option(id)?),
            None => Ok(None),
        }
    }

    /// Delete a prescription with its details, scans, attachments and order
    /// links, then drop its stored files.
    pub fn delete(&self, actor: &User, id: &str) -> ServiceResult<()> {
        ensure_visible(self.db, actor, Aggregate::Prescription, id)?;

        let files = prescription_files(self.db, id)?;
        self.db.delete_prescription(id)?;
        remove_media(self.media, &files);

        log::info!("Deleted prescription {}", id);
        Ok(())
    }

    /// Get-or-create a detail record.
    pub fn detail<T: DetailRecord>(
        &self,
        actor: &User,
        prescription_id: &str,
    ) -> ServiceResult<(DetailEntry<T>, bool)> {
        ensure_visible(self.db, actor, Aggregate::Prescription, prescription_id)?;

        let (entry, created) = self.db.get_or_create_detail::<T>(prescription_id)?;
        if created {
            log::info!("Created {} for prescription {}", T::KIND, prescription_id);
        }
        Ok((entry, created))
    }

    /// Get-or-create a detail record, then apply a coerced payload to it.
    pub fn update_detail<T: DetailRecord>(
        &self,
        actor: &User,
        prescription_id: &str,
        payload: &Map<String, Value>,
        mode: UpdateMode,
    ) -> ServiceResult<(DetailEntry<T>, bool)> {
        ensure_visible(self.db, actor, Aggregate::Prescription, prescription_id)?;

        // A rejected update must not leave a freshly created record behind.
        let (saved, created) = self.db.atomic(|db| -> ServiceResult<(DetailEntry<T>, bool)> {
            let (entry, created) = db.get_or_create_detail::<T>(prescription_id)?;
            let record = apply_update(&entry.record, payload, mode).map_err(|errors| {
                log::warn!("Rejected {} update for {}: {}", T::KIND, prescription_id, errors);
                ServiceError::Validation(errors)
            })?;
            Ok((db.save_detail(prescription_id, &record)?, created))
        })?;

        log::info!("Updated {} for prescription {}", T::KIND, prescription_id);
        Ok((saved, created))
    }

    /// [`Self::detail`] for a kind chosen at runtime.
    pub fn detail_by_kind(
        &self,
        actor: &User,
        prescription_id: &str,
        kind: DetailKind,
    ) -> ServiceResult<DetailResponse> {
        match kind {
            DetailKind::ClinicalMeasures => {
                DetailResponse::new(self.detail::<ClinicalMeasure>(actor, prescription_id)?)
            }
            DetailKind::IntrinsicAdjustments => {
                DetailResponse::new(self.detail::<IntrinsicAdjustment>(actor, prescription_id)?)
            }
            DetailKind::OffLoading => {
                DetailResponse::new(self.detail::<OffLoading>(actor, prescription_id)?)
            }
            DetailKind::PlantarModifiers => {
                DetailResponse::new(self.detail::<PlantarModifier>(actor, prescription_id)?)
            }
            DetailKind::Postings => DetailResponse::new(self.detail::<Posting>(actor, prescription_id)?),
            DetailKind::MaterialSelection => {
                DetailResponse::new(self.detail::<MaterialSelection>(actor, prescription_id)?)
            }
            DetailKind::ShoeFitting => {
                DetailResponse::new(self.detail::<ShoeFitting>(actor, prescription_id)?)
            }
            DetailKind::DeviceOptions => {
                DetailResponse::new(self.detail::<DeviceOption>(actor, prescription_id)?)
            }
            DetailKind::Administration => {
                let entry = self.administration(actor, prescription_id)?;
                Ok(DetailResponse {
                    kind,
                    created: false,
                    record: to_value(&entry)?,
                })
            }
        }
    }

    /// [`Self::update_detail`] for a kind chosen at runtime.
    pub fn update_detail_by_kind(
        &self,
        actor: &User,
        prescription_id: &str,
        kind: DetailKind,
        payload: &Map<String, Value>,
        mode: UpdateMode,
    ) -> ServiceResult<DetailResponse> {
        let id = prescription_id;
        match kind {
            DetailKind::ClinicalMeasures => {
                DetailResponse::new(self.update_detail::<ClinicalMeasure>(actor, id, payload, mode)?)
            }
            DetailKind::IntrinsicAdjustments => DetailResponse::new(
                self.update_detail::<IntrinsicAdjustment>(actor, id, payload, mode)?,
            ),
            DetailKind::OffLoading => {
                DetailResponse::new(self.update_detail::<OffLoading>(actor, id, payload, mode)?)
            }
            DetailKind::PlantarModifiers => {
                DetailResponse::new(self.update_detail::<PlantarModifier>(actor, id, payload, mode)?)
            }
            DetailKind::Postings => {
                DetailResponse::new(self.update_detail::<Posting>(actor, id, payload, mode)?)
            }
            DetailKind::MaterialSelection => {
                DetailResponse::new(self.update_detail::<MaterialSelection>(actor, id, payload, mode)?)
            }
            DetailKind::ShoeFitting => {
                DetailResponse::new(self.update_detail::<ShoeFitting>(actor, id, payload, mode)?)
            }
            DetailKind::DeviceOptions => {
                DetailResponse::new(self.update_detail::<DeviceOption>(actor, id, payload, mode)?)
            }
            DetailKind::Administration => {
                let entry = self.update_administration(actor, id, payload, mode)?;
                Ok(DetailResponse {
                    kind,
                    created: false,
                    record: to_value(&entry)?,
                })
            }
        }
    }

    /// Status, lookups, turnaround and notes of a prescription.
    pub fn administration(
        &self,
        actor: &User,
        prescription_id: &str,
    ) -> ServiceResult<DetailEntry<Administration>> {
        let rx = self.get(actor, prescription_id)?;
        Ok(administration_entry(&rx))
    }

    pub fn update_administration(
        &self,
        actor: &User,
        prescription_id: &str,
        payload: &Map<String, Value>,
        mode: UpdateMode,
    ) -> ServiceResult<DetailEntry<Administration>> {
        let mut rx = self.get(actor, prescription_id)?;

        let mut admin = apply_update(&rx.administration(), payload, mode)?;
        for reference in [
            &mut admin.status,
            &mut admin.foot_type,
            &mut admin.wear_time,
            &mut admin.activity_level,
        ] {
            if reference.as_deref().is_some_and(|id| id.trim().is_empty()) {
                *reference = None;
            }
        }
        self.check_lookups(&admin)?;

        rx.apply_administration(admin);
        self.db.update_prescription(&rx)?;
        log::info!("Updated administration for prescription {}", rx.id);

        let rx = self.get(actor, prescription_id)?;
        Ok(administration_entry(&rx))
    }

    /// Every referenced lookup option must exist and be of the right kind.
    fn check_lookups(&self, admin: &Administration) -> ServiceResult<()> {
        let mut errors = FieldErrors::new();
        let references = [
            ("status", LookupKind::Status, &admin.status),
            ("foot_type", LookupKind::FootType, &admin.foot_type),
            ("wear_time", LookupKind::WearTime, &admin.wear_time),
            ("activity_level", LookupKind::Activity, &admin.activity_level),
        ];

        for (field, kind, reference) in references {
            let Some(id) = reference else { continue };
            match self.db.get_lookup_option(id)? {
                Some(option) if option.kind == kind => {}
                _ => errors.add(field, format!("Invalid pk \"{}\" - object does not exist.", id)),
            }
        }

        if !errors.is_empty() {
            log::warn!("Rejected administration update: {}", errors);
        }
        Ok(errors.into_result()?)
    }
}

fn administration_entry(rx: &Prescription) -> DetailEntry<Administration> {
    DetailEntry {
        prescription_id: rx.id.clone(),
        record: rx.administration(),
        created_at: rx.created_at.clone(),
        updated_at: rx.updated_at.clone(),
    }
}

/// Media paths of every scan and attachment of a prescription.
pub(crate) fn prescription_files(db: &Database, prescription_id: &str) -> ServiceResult<Vec<String>> {
    let mut files: Vec<String> = db
        .list_scans(prescription_id)?
        .into_iter()
        .flat_map(|scan| [scan.left_foot, scan.right_foot])
        .flatten()
        .collect();
    files.extend(
        db.list_attachments(prescription_id)?
            .into_iter()
            .map(|attachment| attachment.file_path),
    );
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::FsMediaStore;
    use crate::models::{Clinic, Patient, Role, Turnaround};
    use serde_json::json;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("payload must be an object"),
        }
    }

    struct Fixture {
        clinician: User,
        patient: Patient,
    }

    impl Fixture {
        fn new(db: &Database, name: &str) -> Self {
            let clinic = Clinic::new(name.into());
            db.insert_clinic(&clinic).unwrap();
            let mut clinician = User::new(format!("{name}@example.com"), name.into(), "Doc".into());
            clinician.clinic_id = Some(clinic.id.clone());
            db.insert_user(&clinician).unwrap();
            let patient = Patient::new("Pat".into(), name.into(), "1985-03-03".into(), clinic.id.clone());
            db.insert_patient(&patient).unwrap();
            Self { clinician, patient }
        }
    }

    fn create(service: &PrescriptionService<'_>, f: &Fixture) -> Prescription {
        service
            .create(
                &f.clinician,
                NewPrescription {
                    patient_id: f.patient.id.clone(),
                    template_id: None,
                },
            )
            .unwrap()
    }

    #[test]
    fn test_create_uses_default_template() {
        let db = setup_db();
        let config = CoreConfig::default();
        let media = FsMediaStore::new("unused");
        let service = PrescriptionService::new(&db, &config, &media);
        let f = Fixture::new(&db, "a");

        let first = create(&service, &f);
        let second = create(&service, &f);

        let template = db.get_template(&first.template_id).unwrap().unwrap();
        assert_eq!(template.name, "Default Template");
        assert_eq!(template.description, "Auto-generated default template");
        assert_eq!(second.template_id, first.template_id);
        assert_eq!(first.clinician_id, f.clinician.id);
    }

    #[test]
    fn test_create_prefers_active_template() {
        let db = setup_db();
        let config = CoreConfig::default();
        let media = FsMediaStore::new("unused");
        let service = PrescriptionService::new(&db, &config, &media);
        let f = Fixture::new(&db, "a");

        let sports = Template::new("Sports".into(), String::new());
        db.insert_template(&sports).unwrap();
        assert_eq!(create(&service, &f).template_id, sports.id);

        let err = service
            .create(
                &f.clinician,
                NewPrescription {
                    patient_id: f.patient.id.clone(),
                    template_id: Some("missing".into()),
                },
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn test_create_for_other_clinic_is_forbidden() {
        let db = setup_db();
        let config = CoreConfig::default();
        let media = FsMediaStore::new("unused");
        let service = PrescriptionService::new(&db, &config, &media);
        let a = Fixture::new(&db, "a");
        let b = Fixture::new(&db, "b");

        let err = service
            .create(
                &a.clinician,
                NewPrescription {
                    patient_id: b.patient.id.clone(),
                    template_id: None,
                },
            )
            .unwrap_err();
        match err {
            ServiceError::Forbidden(message) => {
                assert_eq!(message, "Patient does not belong to your clinic")
            }
            other => panic!("unexpected {other:?}"),
        }

        let mut admin = a.clinician.clone();
        admin.role = Role::Admin;
        assert!(service
            .create(
                &admin,
                NewPrescription {
                    patient_id: b.patient.id.clone(),
                    template_id: None,
                },
            )
            .is_ok());
    }

    #[test]
    fn test_out_of_scope_is_not_found() {
        let db = setup_db();
        let config = CoreConfig::default();
        let media = FsMediaStore::new("unused");
        let service = PrescriptionService::new(&db, &config, &media);
        let a = Fixture::new(&db, "a");
        let b = Fixture::new(&db, "b");
        let rx = create(&service, &a);

        assert!(matches!(service.view(&b.clinician, &rx.id), Err(ServiceError::NotFound(_))));
        assert!(matches!(
            service.detail::<Posting>(&b.clinician, &rx.id),
            Err(ServiceError::NotFound(_))
        ));
        assert!(db.find_detail::<Posting>(&rx.id).unwrap().is_none());
        assert!(service.list(&b.clinician, &PrescriptionFilter::default()).unwrap().is_empty());
        assert_eq!(service.list(&a.clinician, &PrescriptionFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_detail_get_or_create_then_update() {
        let db = setup_db();
        let config = CoreConfig::default();
        let media = FsMediaStore::new("unused");
        let service = PrescriptionService::new(&db, &config, &media);
        let f = Fixture::new(&db, "a");
        let rx = create(&service, &f);

        let first = service.detail_by_kind(&f.clinician, &rx.id, DetailKind::Postings).unwrap();
        assert!(first.created);
        assert_eq!(first.record["left_heel_post_width"], "none");
        let again = service.detail_by_kind(&f.clinician, &rx.id, DetailKind::Postings).unwrap();
        assert!(!again.created);

        let updated = service
            .update_detail_by_kind(
                &f.clinician,
                &rx.id,
                DetailKind::Postings,
                &payload(json!({"left_heel_post_angle": "4.5", "id": "ignored"})),
                UpdateMode::Partial,
            )
            .unwrap();
        assert_eq!(updated.record["left_heel_post_angle"], 4.5);
        assert_eq!(updated.record["prescription_id"], rx.id.as_str());
    }

    #[test]
    fn test_full_update_resets_absent_fields() {
        let db = setup_db();
        let config = CoreConfig::default();
        let media = FsMediaStore::new("unused");
        let service = PrescriptionService::new(&db, &config, &media);
        let f = Fixture::new(&db, "a");
        let rx = create(&service, &f);

        service
            .update_detail::<OffLoading>(
                &f.clinician,
                &rx.id,
                &payload(json!({"metatarsal_dome": true, "heel_skive": "yes"})),
                UpdateMode::Partial,
            )
            .unwrap();
        let (entry, _) = service
            .update_detail::<OffLoading>(
                &f.clinician,
                &rx.id,
                &payload(json!({"heel_skive": 1})),
                UpdateMode::Full,
            )
            .unwrap();
        assert!(!entry.record.metatarsal_dome);
        assert!(entry.record.heel_skive);
    }

    #[test]
    fn test_plantar_modifier_range_rejected() {
        let db = setup_db();
        let config = CoreConfig::default();
        let media = FsMediaStore::new("unused");
        let service = PrescriptionService::new(&db, &config, &media);
        let f = Fixture::new(&db, "a");
        let rx = create(&service, &f);

        let err = service
            .update_detail::<PlantarModifier>(
                &f.clinician,
                &rx.id,
                &payload(json!({"left_cuboid": 150, "right_y_rib": -1})),
                UpdateMode::Partial,
            )
            .unwrap_err();
        match err {
            ServiceError::Validation(errors) => {
                assert!(errors.get("left_cuboid").is_some());
                assert!(errors.get("right_y_rib").is_some());
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(db.find_detail::<PlantarModifier>(&rx.id).unwrap().is_none());
        let (entry, created) = service.detail::<PlantarModifier>(&f.clinician, &rx.id).unwrap();
        assert!(created);
        assert_eq!(entry.record, PlantarModifier::default());
    }

    #[test]
    fn test_administration_checks_lookups() {
        let db = setup_db();
        let config = CoreConfig::default();
        let media = FsMediaStore::new("unused");
        let service = PrescriptionService::new(&db, &config, &media);
        let f = Fixture::new(&db, "a");
        let rx = create(&service, &f);

        let status = LookupOption::new(LookupKind::Status, "Submitted".into());
        db.insert_lookup_option(&status).unwrap();
        let foot_type = LookupOption::new(LookupKind::FootType, "Cavus".into());
        db.insert_lookup_option(&foot_type).unwrap();

        let err = service
            .update_administration(
                &f.clinician,
                &rx.id,
                &payload(json!({"status": foot_type.id, "wear_time": "nope"})),
                UpdateMode::Partial,
            )
            .unwrap_err();
        match err {
            ServiceError::Validation(errors) => {
                assert!(errors.get("status").is_some());
                assert!(errors.get("wear_time").is_some());
            }
            other => panic!("unexpected {other:?}"),
        }

        let entry = service
            .update_administration(
                &f.clinician,
                &rx.id,
                &payload(json!({
                    "status": status.id,
                    "turnaround": "urgent",
                    "general_notes": "Check fit",
                    "contact_clinician": "on",
                })),
                UpdateMode::Partial,
            )
            .unwrap();
        assert_eq!(entry.record.turnaround, Turnaround::Urgent);
        assert!(entry.record.contact_clinician);

        let view = service.view(&f.clinician, &rx.id).unwrap();
        assert_eq!(view.status.unwrap().name, "Submitted");
        assert_eq!(view.prescription.general_notes, "Check fit");
        assert_eq!(view.patient.id, f.patient.id);

        let cleared = service
            .update_administration(&f.clinician, &rx.id, &payload(json!({"status": ""})), UpdateMode::Partial)
            .unwrap();
        assert_eq!(cleared.record.status, None);
    }

    #[test]
    fn test_delete_removes_files() {
        let db = setup_db();
        let config = CoreConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let media = FsMediaStore::new(dir.path());
        let service = PrescriptionService::new(&db, &config, &media);
        let f = Fixture::new(&db, "a");
        let rx = create(&service, &f);

        let attachment = crate::models::Attachment::new(rx.id.clone(), "note.txt".into(), 2);
        media.save(&attachment.file_path, b"hi").unwrap();
        db.insert_attachment(&attachment).unwrap();

        service.delete(&f.clinician, &rx.id).unwrap();
        assert!(!db.prescription_exists(&rx.id).unwrap());
        assert!(!dir.path().join(&attachment.file_path).exists());
    }
}
