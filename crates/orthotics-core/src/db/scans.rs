//! Scan and attachment database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbResult};
use crate::models::{Attachment, Scan};

impl Database {
    /// Insert a scan record.
    pub fn insert_scan(&self, scan: &Scan) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO scans (
                id, prescription_id, left_foot, right_foot,
                left_foot_size, right_foot_size, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                scan.id,
                scan.prescription_id,
                scan.left_foot,
                scan.right_foot,
                scan.left_foot_size,
                scan.right_foot_size,
                scan.created_at,
                scan.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Scans of a prescription, oldest first.
    pub fn list_scans(&self, prescription_id: &str) -> DbResult<Vec<Scan>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, prescription_id, left_foot, right_foot,
                   left_foot_size, right_foot_size, created_at, updated_at
            FROM scans
            WHERE prescription_id = ?
            ORDER BY created_at
            "#,
        )?;

        let scans = stmt
            .query_map([prescription_id], scan_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(scans)
    }

    /// Remove every scan of a prescription and return what was removed, so
    /// the caller can drop the stored files.
    pub fn delete_scans_for_prescription(&self, prescription_id: &str) -> DbResult<Vec<Scan>> {
        let removed = self.list_scans(prescription_id)?;
        self.conn
            .execute("DELETE FROM scans WHERE prescription_id = ?", [prescription_id])?;
        Ok(removed)
    }

    /// Insert an attachment record.
    pub fn insert_attachment(&self, attachment: &Attachment) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO attachments (
                id, prescription_id, file_path, filename, size_bytes, uploaded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                attachment.id,
                attachment.prescription_id,
                attachment.file_path,
                attachment.filename,
                attachment.size_bytes,
                attachment.uploaded_at,
            ],
        )?;
        Ok(())
    }

    /// Attachments of a prescription, newest first.
    pub fn list_attachments(&self, prescription_id: &str) -> DbResult<Vec<Attachment>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, prescription_id, file_path, filename, size_bytes, uploaded_at
            FROM attachments
            WHERE prescription_id = ?
            ORDER BY uploaded_at DESC, filename
            "#,
        )?;

        let attachments = stmt
            .query_map([prescription_id], attachment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(attachments)
    }

    /// An attachment of a specific prescription.
    pub fn get_attachment(&self, prescription_id: &str, id: &str) -> DbResult<Option<Attachment>> {
        self.conn
            .query_row(
                r#"
                SELECT id, prescription_id, file_path, filename, size_bytes, uploaded_at
                FROM attachments
                WHERE prescription_id = ?1 AND id = ?2
                "#,
                params![prescription_id, id],
                attachment_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Delete an attachment of a specific prescription.
    pub fn delete_attachment(&self, prescription_id: &str, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "DELETE FROM attachments WHERE prescription_id = ?1 AND id = ?2",
            params![prescription_id, id],
        )?;
        Ok(rows_affected > 0)
    }
}

fn scan_from_row(row: &Row<'_>) -> rusqlite::Result<Scan> {
    Ok(Scan {
        id: row.get(0)?,
        prescription_id: row.get(1)?,
        left_foot: row.get(2)?,
        right_foot: row.get(3)?,
        left_foot_size: row.get(4)?,
        right_foot_size: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn attachment_from_row(row: &Row<'_>) -> rusqlite::Result<Attachment> {
    Ok(Attachment {
        id: row.get(0)?,
        prescription_id: row.get(1)?,
        file_path: row.get(2)?,
        filename: row.get(3)?,
        size_bytes: row.get(4)?,
        uploaded_at: row.get(5)?,
    })
}
