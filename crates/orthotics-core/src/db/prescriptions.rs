//! Prescription database operations.

use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::{now, Database, DbError, DbResult, WhereClause};
use crate::access::{Aggregate, TenantScope};
use crate::models::{Prescription, PrescriptionFilter, PrescriptionSummary, Turnaround};

const PRESCRIPTION_COLUMNS: &str = r#"
    id, patient_id, clinician_id, template_id, status_id, foot_type_id,
    wear_time_id, activity_level_id, turnaround, contact_clinician,
    confirm_before_manufacture, clinician_computer_aided_design,
    general_notes, left_foot_notes, right_foot_notes, created_at, updated_at
"#;

impl Database {
    /// Insert a new prescription.
    pub fn insert_prescription(&self, rx: &Prescription) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO prescriptions (
                id, patient_id, clinician_id, template_id, status_id, foot_type_id,
                wear_time_id, activity_level_id, turnaround, contact_clinician,
                confirm_before_manufacture, clinician_computer_aided_design,
                general_notes, left_foot_notes, right_foot_notes, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
            params![
                rx.id,
                rx.patient_id,
                rx.clinician_id,
                rx.template_id,
                rx.status_id,
                rx.foot_type_id,
                rx.wear_time_id,
                rx.activity_level_id,
                rx.turnaround.as_str(),
                rx.contact_clinician,
                rx.confirm_before_manufacture,
                rx.clinician_computer_aided_design,
                rx.general_notes,
                rx.left_foot_notes,
                rx.right_foot_notes,
                rx.created_at,
                rx.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update a prescription's template, lookups, administration and notes.
    ///
    /// Patient and clinician are fixed at creation.
    pub fn update_prescription(&self, rx: &Prescription) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE prescriptions SET
                template_id = ?2,
                status_id = ?3,
                foot_type_id = ?4,
                wear_time_id = ?5,
                activity_level_id = ?6,
                turnaround = ?7,
                contact_clinician = ?8,
                confirm_before_manufacture = ?9,
                clinician_computer_aided_design = ?10,
                general_notes = ?11,
                left_foot_notes = ?12,
                right_foot_notes = ?13,
                updated_at = ?14
            WHERE id = ?1
            "#,
            params![
                rx.id,
                rx.template_id,
                rx.status_id,
                rx.foot_type_id,
                rx.wear_time_id,
                rx.activity_level_id,
                rx.turnaround.as_str(),
                rx.contact_clinician,
                rx.confirm_before_manufacture,
                rx.clinician_computer_aided_design,
                rx.general_notes,
                rx.left_foot_notes,
                rx.right_foot_notes,
                now(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a prescription by ID, regardless of scope.
    pub fn get_prescription(&self, id: &str) -> DbResult<Option<Prescription>> {
        self.conn
            .query_row(
                &format!("SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE id = ?"),
                [id],
                prescription_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Whether a prescription exists at all.
    pub fn prescription_exists(&self, id: &str) -> DbResult<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM prescriptions WHERE id = ?)",
            [id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Prescriptions of one patient, newest first.
    pub fn list_prescriptions_for_patient(&self, patient_id: &str) -> DbResult<Vec<Prescription>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions \
             WHERE patient_id = ? ORDER BY created_at DESC"
        ))?;

        let rows = stmt.query_map([patient_id], prescription_row)?;

        let mut prescriptions = Vec::new();
        for row in rows {
            prescriptions.push(row?.try_into()?);
        }
        Ok(prescriptions)
    }

    /// List rows for prescriptions visible within `scope`, newest first.
    pub fn list_prescription_summaries(
        &self,
        scope: &TenantScope,
        filter: &PrescriptionFilter,
    ) -> DbResult<Vec<PrescriptionSummary>> {
        let Some(mut clause) = WhereClause::scoped(scope, Aggregate::Prescription) else {
            return Ok(Vec::new());
        };
        if let Some(patient_id) = &filter.patient_id {
            clause.push("prescriptions.patient_id = ?", patient_id.as_str());
        }
        if let Some(clinician_id) = &filter.clinician_id {
            clause.push("prescriptions.clinician_id = ?", clinician_id.as_str());
        }
        if let Some(template_id) = &filter.template_id {
            clause.push("prescriptions.template_id = ?", template_id.as_str());
        }

        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT prescriptions.id, prescriptions.patient_id,
                   pa.first_name, pa.last_name,
                   prescriptions.clinician_id, u.first_name, u.last_name,
                   prescriptions.template_id, t.name, st.name,
                   prescriptions.turnaround, prescriptions.created_at,
                   prescriptions.updated_at
            FROM prescriptions
            JOIN patients pa ON pa.id = prescriptions.patient_id
            JOIN users u ON u.id = prescriptions.clinician_id
            JOIN templates t ON t.id = prescriptions.template_id
            LEFT JOIN lookup_options st ON st.id = prescriptions.status_id
            {}
            ORDER BY prescriptions.created_at DESC
            "#,
            clause.sql()
        ))?;

        let rows = stmt.query_map(params_from_iter(clause.params()), |row| {
            Ok(SummaryRow {
                id: row.get(0)?,
                patient_id: row.get(1)?,
                patient_first_name: row.get(2)?,
                patient_last_name: row.get(3)?,
                clinician_id: row.get(4)?,
                clinician_first_name: row.get(5)?,
                clinician_last_name: row.get(6)?,
                template_id: row.get(7)?,
                template_name: row.get(8)?,
                status_name: row.get(9)?,
                turnaround: row.get(10)?,
                created_at: row.get(11)?,
                updated_at: row.get(12)?,
            })
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?.try_into()?);
        }
        Ok(summaries)
    }

    /// Delete a prescription with its details, scans, attachments and
    /// order links.
    pub fn delete_prescription(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM prescriptions WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }
}

fn parse_turnaround(value: &str) -> DbResult<Turnaround> {
    Turnaround::parse(value)
        .ok_or_else(|| DbError::Constraint(format!("Invalid turnaround: {}", value)))
}

fn full_name(first: &str, last: &str) -> String {
    format!("{} {}", first, last).trim().to_string()
}

fn prescription_row(row: &Row<'_>) -> rusqlite::Result<PrescriptionRow> {
    Ok(PrescriptionRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        clinician_id: row.get(2)?,
        template_id: row.get(3)?,
        status_id: row.get(4)?,
        foot_type_id: row.get(5)?,
        wear_time_id: row.get(6)?,
        activity_level_id: row.get(7)?,
        turnaround: row.get(8)?,
        contact_clinician: row.get(9)?,
        confirm_before_manufacture: row.get(10)?,
        clinician_computer_aided_design: row.get(11)?,
        general_notes: row.get(12)?,
        left_foot_notes: row.get(13)?,
        right_foot_notes: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

/// Internal row representation for prescriptions.
struct PrescriptionRow {
    id: String,
    patient_id: String,
    clinician_id: String,
    template_id: String,
    status_id: Option<String>,
    foot_type_id: Option<String>,
    wear_time_id: Option<String>,
    activity_level_id: Option<String>,
    turnaround: String,
    contact_clinician: bool,
    confirm_before_manufacture: bool,
    clinician_computer_aided_design: bool,
    general_notes: String,
    left_foot_notes: String,
    right_foot_notes: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<PrescriptionRow> for Prescription {
    type Error = DbError;

    fn try_from(row: PrescriptionRow) -> Result<Self, Self::Error> {
        Ok(Prescription {
            turnaround: parse_turnaround(&row.turnaround)?,
            id: row.id,
            patient_id: row.patient_id,
            clinician_id: row.clinician_id,
            template_id: row.template_id,
            status_id: row.status_id,
            foot_type_id: row.foot_type_id,
            wear_time_id: row.wear_time_id,
            activity_level_id: row.activity_level_id,
            contact_clinician: row.contact_clinician,
            confirm_before_manufacture: row.confirm_before_manufacture,
            clinician_computer_aided_design: row.clinician_computer_aided_design,
            general_notes: row.general_notes,
            left_foot_notes: row.left_foot_notes,
            right_foot_notes: row.right_foot_notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Internal row representation for prescription list rows.
struct SummaryRow {
    id: String,
    patient_id: String,
    patient_first_name: String,
    patient_last_name: String,
    clinician_id: String,
    clinician_first_name: String,
    clinician_last_name: String,
    template_id: String,
    template_name: String,
    status_name: Option<String>,
    turnaround: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SummaryRow> for PrescriptionSummary {
    type Error = DbError;

    fn try_from(row: SummaryRow) -> Result<Self, Self::Error> {
        Ok(PrescriptionSummary {
            turnaround: parse_turnaround(&row.turnaround)?,
            patient_name: full_name(&row.patient_first_name, &row.patient_last_name),
            clinician_name: full_name(&row.clinician_first_name, &row.clinician_last_name),
            id: row.id,
            patient_id: row.patient_id,
            clinician_id: row.clinician_id,
            template_id: row.template_id,
            template_name: row.template_name,
            status_name: row.status_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
