//! Foot scans and prescription attachments.

use super::ensure_visible;
use crate::access::Aggregate;
use crate::config::CoreConfig;
use crate::db::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::media::MediaStore;
use crate::models::{Attachment, Foot, Scan, User};
use crate::validation::{
    sanitize_filename, validate_scan_file, FieldErrors, ScanLimits, UploadedFile, NON_FIELD_ERRORS,
};

/// Best-effort removal of stored files. The rows are already gone, so a
/// failure here only leaves an orphaned file behind.
pub(crate) fn remove_media(media: &dyn MediaStore, paths: &[String]) {
    for path in paths {
        if let Err(e) = media.delete(path) {
            log::warn!("Failed to remove media file {}: {}", path, e);
        }
    }
}

pub struct UploadService<'a> {
    db: &'a Database,
    config: &'a CoreConfig,
    media: &'a dyn MediaStore,
}

impl<'a> UploadService<'a> {
    pub fn new(db: &'a Database, config: &'a CoreConfig, media: &'a dyn MediaStore) -> Self {
        Self { db, config, media }
    }

    pub fn list_scans(&self, actor: &User, prescription_id: &str) -> ServiceResult<Vec<Scan>> {
        ensure_visible(self.db, actor, Aggregate::Prescription, prescription_id)?;
        Ok(self.db.list_scans(prescription_id)?)
    }

    /// Replace the scans of a prescription with one new scan holding the
    /// given feet. Both files are checked before anything is written.
    pub fn upload_scans(
        &self,
        actor: &User,
        prescription_id: &str,
        left: Option<UploadedFile>,
        right: Option<UploadedFile>,
    ) -> ServiceResult<Scan> {
        ensure_visible(self.db, actor, Aggregate::Prescription, prescription_id)?;

        if left.is_none() && right.is_none() {
            return Err(ServiceError::validation(
                NON_FIELD_ERRORS,
                "At least one scan file must be provided.",
            ));
        }

        let limits = ScanLimits::from_config(self.config);
        let mut scan = Scan::new(prescription_id.to_string());
        let mut errors = FieldErrors::new();
        let mut accepted = Vec::new();
        for (field, foot, file) in [("left_foot", Foot::Left, left), ("right_foot", Foot::Right, right)] {
            let Some(file) = file else { continue };
            match validate_scan_file(&file, &limits) {
                Ok(extension) => {
                    let path = foot.scan_path(prescription_id, &scan.id, &extension);
                    accepted.push((foot, path, file));
                }
                Err(message) => errors.add(field, message),
            }
        }
        if !errors.is_empty() {
            log::warn!("Rejected scan upload for {}: {}", prescription_id, errors);
            return Err(errors.into());
        }

        let mut saved = Vec::new();
        let result = self.db.atomic(|db| -> ServiceResult<Vec<Scan>> {
            let replaced = db.delete_scans_for_prescription(prescription_id)?;

            for (foot, path, file) in &accepted {
                self.media.save(path, &file.content)?;
                saved.push(path.clone());
                let size = Some(file.size() as i64);
                match foot {
                    Foot::Left => {
                        scan.left_foot = Some(path.clone());
                        scan.left_foot_size = size;
                    }
                    Foot::Right => {
                        scan.right_foot = Some(path.clone());
                        scan.right_foot_size = size;
                    }
                }
            }
            db.insert_scan(&scan)?;
            Ok(replaced)
        });

        let replaced = match result {
            Ok(replaced) => replaced,
            Err(e) => {
                // The old rows are back; drop the files they never pointed at.
                remove_media(self.media, &saved);
                return Err(e);
            }
        };

        let stale: Vec<String> = replaced
            .into_iter()
            .flat_map(|old| [old.left_foot, old.right_foot])
            .flatten()
            .collect();
        remove_media(self.media, &stale);

        log::info!("Stored scan {} for prescription {}", scan.id, prescription_id);
        Ok(scan)
    }

    pub fn list_attachments(&self, actor: &User, prescription_id: &str) -> ServiceResult<Vec<Attachment>> {
        ensure_visible(self.db, actor, Aggregate::Prescription, prescription_id)?;
        Ok(self.db.list_attachments(prescription_id)?)
    }

    /// Attach a document. `display_name` overrides the uploaded filename.
    pub fn add_attachment(
        &self,
        actor: &User,
        prescription_id: &str,
        file: UploadedFile,
        display_name: Option<String>,
    ) -> ServiceResult<Attachment> {
        ensure_visible(self.db, actor, Aggregate::Prescription, prescription_id)?;

        let filename = display_name
            .as_deref()
            .and_then(sanitize_filename)
            .or_else(|| sanitize_filename(&file.filename))
            .ok_or_else(|| ServiceError::validation("file", "No file provided"))?;
        if file.content.is_empty() {
            return Err(ServiceError::validation("file", "The submitted file is empty."));
        }

        let attachment = Attachment::new(prescription_id.to_string(), filename, file.size() as i64);
        self.media.save(&attachment.file_path, &file.content)?;
        if let Err(e) = self.db.insert_attachment(&attachment) {
            remove_media(self.media, std::slice::from_ref(&attachment.file_path));
            return Err(e.into());
        }

        log::info!(
            "Attached {} ({} bytes) to prescription {}",
            attachment.filename,
            attachment.size_bytes,
            prescription_id
        );
        Ok(attachment)
    }

    pub fn delete_attachment(&self, actor: &User, prescription_id: &str, attachment_id: &str) -> ServiceResult<()> {
        ensure_visible(self.db, actor, Aggregate::Prescription, prescription_id)?;

        let attachment = self
            .db
            .get_attachment(prescription_id, attachment_id)?
            .ok_or_else(|| ServiceError::not_found("Attachment not found"))?;
        self.db.delete_attachment(prescription_id, attachment_id)?;
        remove_media(self.media, &[attachment.file_path]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{FsMediaStore, MediaError, MediaResult};
    use crate::models::{Clinic, Patient, Prescription, Template};

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn setup_prescription(db: &Database) -> (User, Prescription) {
        let clinic = Clinic::new("Clinic".into());
        db.insert_clinic(&clinic).unwrap();
        let mut user = User::new("doc@example.com".into(), "Doc".into(), "Tor".into());
        user.clinic_id = Some(clinic.id.clone());
        db.insert_user(&user).unwrap();
        let patient = Patient::new("Pat".into(), "Ient".into(), "1990-01-01".into(), clinic.id);
        db.insert_patient(&patient).unwrap();
        let template = Template::new("Default".into(), String::new());
        db.insert_template(&template).unwrap();
        let rx = Prescription::new(patient.id, user.id.clone(), template.id);
        db.insert_prescription(&rx).unwrap();
        (user, rx)
    }

    fn stl(name: &str) -> UploadedFile {
        UploadedFile::new(name, b"solid foot\nendsolid foot\n".to_vec())
    }

    #[test]
    fn test_upload_requires_a_file() {
        let db = setup_db();
        let config = CoreConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let media = FsMediaStore::new(dir.path());
        let uploads = UploadService::new(&db, &config, &media);
        let (user, rx) = setup_prescription(&db);

        match uploads.upload_scans(&user, &rx.id, None, None).unwrap_err() {
            ServiceError::Validation(errors) => assert!(errors.get(NON_FIELD_ERRORS).is_some()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_upload_rejects_bad_extension_without_writing() {
        let db = setup_db();
        let config = CoreConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let media = FsMediaStore::new(dir.path());
        let uploads = UploadService::new(&db, &config, &media);
        let (user, rx) = setup_prescription(&db);

        let err = uploads
            .upload_scans(&user, &rx.id, Some(stl("left.stl")), Some(UploadedFile::new("photo.png", b"png".to_vec())))
            .unwrap_err();
        match err {
            ServiceError::Validation(errors) => {
                assert!(errors.get("right_foot").is_some());
                assert!(errors.get("left_foot").is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(db.list_scans(&rx.id).unwrap().is_empty());
        assert!(!dir.path().join("scans").exists());
    }

    #[test]
    fn test_upload_replaces_previous_scans() {
        let db = setup_db();
        let config = CoreConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let media = FsMediaStore::new(dir.path());
        let uploads = UploadService::new(&db, &config, &media);
        let (user, rx) = setup_prescription(&db);

        let first = uploads
            .upload_scans(&user, &rx.id, Some(UploadedFile::new("l.obj", b"v 0 0 0".to_vec())), None)
            .unwrap();
        let old_path = first.left_foot.clone().unwrap();
        assert!(dir.path().join(&old_path).exists());

        let second = uploads
            .upload_scans(&user, &rx.id, Some(stl("left.stl")), Some(stl("right.stl")))
            .unwrap();

        let scans = db.list_scans(&rx.id).unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].id, second.id);
        assert_eq!(
            second.left_foot.as_deref(),
            Some(format!("scans/left/{}_left_{}.stl", rx.id, second.id).as_str())
        );
        assert_eq!(second.right_foot_size, Some(25));
        assert!(!dir.path().join(&old_path).exists());
        assert!(dir.path().join(second.right_foot.unwrap()).exists());
    }

    /// Writes into a real store but refuses one path.
    struct RefusingStore {
        inner: FsMediaStore,
        refuse: &'static str,
    }

    impl MediaStore for RefusingStore {
        fn save(&self, path: &str, content: &[u8]) -> MediaResult<()> {
            if path.starts_with(self.refuse) {
                return Err(MediaError::Io(std::io::Error::other("disk full")));
            }
            self.inner.save(path, content)
        }

        fn delete(&self, path: &str) -> MediaResult<()> {
            self.inner.delete(path)
        }
    }

    #[test]
    fn test_failed_replacement_keeps_old_scan_and_files() {
        let db = setup_db();
        let config = CoreConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let (user, rx) = setup_prescription(&db);

        let media = FsMediaStore::new(dir.path());
        let first = UploadService::new(&db, &config, &media)
            .upload_scans(&user, &rx.id, Some(stl("left.stl")), Some(stl("right.stl")))
            .unwrap();
        let old_left = first.left_foot.clone().unwrap();

        let refusing = RefusingStore {
            inner: FsMediaStore::new(dir.path()),
            refuse: "scans/right/",
        };
        let replacement = UploadedFile::new("left.stl", b"solid new\nendsolid new\n".to_vec());
        let result = UploadService::new(&db, &config, &refusing).upload_scans(
            &user,
            &rx.id,
            Some(replacement),
            Some(stl("right.stl")),
        );
        assert!(result.is_err());

        assert_eq!(db.list_scans(&rx.id).unwrap(), vec![first]);
        assert_eq!(
            std::fs::read(dir.path().join(&old_left)).unwrap(),
            b"solid foot\nendsolid foot\n"
        );
        let left_files = std::fs::read_dir(dir.path().join("scans/left")).unwrap().count();
        assert_eq!(left_files, 1);
    }

    #[test]
    fn test_attachments() {
        let db = setup_db();
        let config = CoreConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let media = FsMediaStore::new(dir.path());
        let uploads = UploadService::new(&db, &config, &media);
        let (user, rx) = setup_prescription(&db);

        let err = uploads
            .add_attachment(&user, &rx.id, UploadedFile::new("empty.pdf", Vec::new()), None)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let attachment = uploads
            .add_attachment(
                &user,
                &rx.id,
                UploadedFile::new("C:\\docs\\referral.pdf", b"%PDF".to_vec()),
                Some("../../Referral letter.pdf".into()),
            )
            .unwrap();
        assert_eq!(attachment.filename, "Referral letter.pdf");
        assert_eq!(attachment.size_bytes, 4);
        assert!(dir.path().join(&attachment.file_path).exists());
        assert_eq!(uploads.list_attachments(&user, &rx.id).unwrap().len(), 1);

        uploads.delete_attachment(&user, &rx.id, &attachment.id).unwrap();
        assert!(!dir.path().join(&attachment.file_path).exists());
        assert!(matches!(
            uploads.delete_attachment(&user, &rx.id, &attachment.id),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn test_other_clinic_cannot_upload() {
        let db = setup_db();
        let config = CoreConfig::default();
        let media = FsMediaStore::new("unused");
        let uploads = UploadService::new(&db, &config, &media);
        let (_, rx) = setup_prescription(&db);
        let stranger = User::new("x@example.com".into(), "X".into(), "Y".into());

        assert!(matches!(
            uploads.upload_scans(&stranger, &rx.id, Some(stl("a.stl")), None),
            Err(ServiceError::NotFound(_))
        ));
    }
}
