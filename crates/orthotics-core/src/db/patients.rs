//! Patient database operations.

use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::{now, Database, DbError, DbResult, WhereClause};
use crate::access::{Aggregate, TenantScope};
use crate::models::{Gender, Patient};

const PATIENT_COLUMNS: &str = r#"
    patients.id, patients.external_id, patients.first_name, patients.last_name,
    patients.date_of_birth, patients.gender, patients.weight, patients.clinic_id,
    patients.created_at, patients.updated_at
"#;

impl Database {
    /// Insert a new patient.
    pub fn insert_patient(&self, patient: &Patient) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO patients (
                id, external_id, first_name, last_name, date_of_birth,
                gender, weight, clinic_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                patient.id,
                patient.external_id,
                patient.first_name,
                patient.last_name,
                patient.date_of_birth,
                patient.gender.as_str(),
                patient.weight,
                patient.clinic_id,
                patient.created_at,
                patient.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update an existing patient. The owning clinic never changes.
    pub fn update_patient(&self, patient: &Patient) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE patients SET
                external_id = ?2,
                first_name = ?3,
                last_name = ?4,
                date_of_birth = ?5,
                gender = ?6,
                weight = ?7,
                updated_at = ?8
            WHERE id = ?1
            "#,
            params![
                patient.id,
                patient.external_id,
                patient.first_name,
                patient.last_name,
                patient.date_of_birth,
                patient.gender.as_str(),
                patient.weight,
                now(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a patient by ID, regardless of scope.
    pub fn get_patient(&self, id: &str) -> DbResult<Option<Patient>> {
        self.conn
            .query_row(
                &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE patients.id = ?"),
                [id],
                patient_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Patient with this external ID, if any.
    pub fn get_patient_by_external_id(&self, external_id: &str) -> DbResult<Option<Patient>> {
        self.conn
            .query_row(
                &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE patients.external_id = ?"),
                [external_id],
                patient_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Patients visible within `scope`, by name.
    pub fn list_patients(&self, scope: &TenantScope) -> DbResult<Vec<Patient>> {
        let Some(filter) = WhereClause::scoped(scope, Aggregate::Patient) else {
            return Ok(Vec::new());
        };

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients{} \
             ORDER BY patients.last_name, patients.first_name, patients.created_at",
            filter.sql()
        ))?;

        let rows = stmt.query_map(params_from_iter(filter.params()), patient_row)?;

        let mut patients = Vec::new();
        for row in rows {
            patients.push(row?.try_into()?);
        }
        Ok(patients)
    }

    /// Delete a patient and, through cascades, their prescriptions.
    pub fn delete_patient(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM patients WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }
}

fn patient_row(row: &Row<'_>) -> rusqlite::Result<PatientRow> {
    Ok(PatientRow {
        id: row.get(0)?,
        external_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        date_of_birth: row.get(4)?,
        gender: row.get(5)?,
        weight: row.get(6)?,
        clinic_id: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// Internal row representation for patients.
struct PatientRow {
    id: String,
    external_id: Option<String>,
    first_name: String,
    last_name: String,
    date_of_birth: String,
    gender: String,
    weight: Option<f64>,
    clinic_id: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<PatientRow> for Patient {
    type Error = DbError;

    fn try_from(row: PatientRow) -> Result<Self, Self::Error> {
        let gender = Gender::parse(&row.gender)
            .ok_or_else(|| DbError::Constraint(format!("Invalid gender: {}", row.gender)))?;

        Ok(Patient {
            id: row.id,
            external_id: row.external_id,
            first_name: row.first_name,
            last_name: row.last_name,
            date_of_birth: row.date_of_birth,
            gender,
            weight: row.weight,
            clinic_id: row.clinic_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Clinic;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn clinic(db: &Database, name: &str) -> Clinic {
        let clinic = Clinic::new(name.into());
        db.insert_clinic(&clinic).unwrap();
        clinic
    }

    fn patient(db: &Database, clinic: &Clinic, first: &str, last: &str) -> Patient {
        let patient = Patient::new(first.into(), last.into(), "1990-05-01".into(), clinic.id.clone());
        db.insert_patient(&patient).unwrap();
        patient
    }

    #[test]
    fn test_insert_and_get_patient() {
        let db = setup_db();
        let c = clinic(&db, "Stride");
        let mut p = Patient::new("Grace".into(), "Hopper".into(), "1906-12-09".into(), c.id.clone());
        p.gender = Gender::Female;
        p.weight = Some(61.5);
        p.external_id = Some("EXT-1".into());
        db.insert_patient(&p).unwrap();

        let retrieved = db.get_patient(&p.id).unwrap().unwrap();
        assert_eq!(retrieved, p);

        let by_external = db.get_patient_by_external_id("EXT-1").unwrap().unwrap();
        assert_eq!(by_external.id, p.id);
    }

    #[test]
    fn test_update_patient() {
        let db = setup_db();
        let c = clinic(&db, "Stride");
        let mut p = patient(&db, &c, "Grace", "Hopper");

        p.last_name = "Murray Hopper".into();
        p.gender = Gender::Other;
        assert!(db.update_patient(&p).unwrap());

        let retrieved = db.get_patient(&p.id).unwrap().unwrap();
        assert_eq!(retrieved.last_name, "Murray Hopper");
        assert_eq!(retrieved.gender, Gender::Other);
    }

    #[test]
    fn test_list_patients_is_scoped() {
        let db = setup_db();
        let a = clinic(&db, "A");
        let b = clinic(&db, "B");
        patient(&db, &a, "Zed", "Alpha");
        patient(&db, &a, "Amy", "Beta");
        patient(&db, &b, "Bob", "Gamma");

        let in_a = db.list_patients(&TenantScope::Clinic(a.id.clone())).unwrap();
        assert_eq!(in_a.len(), 2);
        assert_eq!(in_a[0].last_name, "Alpha");
        assert!(in_a.iter().all(|p| p.clinic_id == a.id));

        assert_eq!(db.list_patients(&TenantScope::All).unwrap().len(), 3);
        assert!(db.list_patients(&TenantScope::Nothing).unwrap().is_empty());
    }

    #[test]
    fn test_visibility() {
        let db = setup_db();
        let a = clinic(&db, "A");
        let b = clinic(&db, "B");
        let p = patient(&db, &a, "Grace", "Hopper");

        let scope_a = TenantScope::Clinic(a.id.clone());
        let scope_b = TenantScope::Clinic(b.id.clone());
        assert!(db.is_visible(&scope_a, Aggregate::Patient, &p.id).unwrap());
        assert!(!db.is_visible(&scope_b, Aggregate::Patient, &p.id).unwrap());
        assert!(db.is_visible(&TenantScope::All, Aggregate::Patient, &p.id).unwrap());
        assert!(!db.is_visible(&TenantScope::Nothing, Aggregate::Patient, &p.id).unwrap());
        assert!(!db.is_visible(&TenantScope::All, Aggregate::Patient, "missing").unwrap());
    }

    #[test]
    fn test_delete_patient() {
        let db = setup_db();
        let c = clinic(&db, "Stride");
        let p = patient(&db, &c, "Grace", "Hopper");
        assert!(db.delete_patient(&p.id).unwrap());
        assert!(!db.delete_patient(&p.id).unwrap());
        assert!(db.get_patient(&p.id).unwrap().is_none());
    }
}
