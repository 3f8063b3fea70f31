//! Prescription detail record database operations.
//!
//! Every detail kind shares one table keyed by (prescription, kind) with the
//! record serialized as JSON, so a single generic get-or-create and upsert
//! serves all of them.

use rusqlite::{params, OptionalExtension};

use super::{now, Database, DbError, DbResult};
use crate::models::{DetailEntry, DetailKind, DetailRecord};

impl Database {
    /// The stored `T` for a prescription, if it was ever created.
    pub fn find_detail<T: DetailRecord>(&self, prescription_id: &str) -> DbResult<Option<DetailEntry<T>>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT payload, created_at, updated_at
                FROM prescription_details
                WHERE prescription_id = ?1 AND kind = ?2
                "#,
                params![prescription_id, T::KIND.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(payload, created_at, updated_at)| -> DbResult<DetailEntry<T>> {
            Ok(DetailEntry {
                prescription_id: prescription_id.to_string(),
                record: serde_json::from_str(&payload)?,
                created_at,
                updated_at,
            })
        })
        .transpose()
    }

    /// The stored `T` for a prescription, created with default values on
    /// first access. The flag reports whether it was just created.
    pub fn get_or_create_detail<T: DetailRecord>(
        &self,
        prescription_id: &str,
    ) -> DbResult<(DetailEntry<T>, bool)> {
        if !self.prescription_exists(prescription_id)? {
            return Err(DbError::NotFound(format!("Prescription {}", prescription_id)));
        }

        let payload = serde_json::to_string(&T::default())?;
        let timestamp = now();
        let inserted = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO prescription_details (
                prescription_id, kind, payload, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?4)
            "#,
            params![prescription_id, T::KIND.as_str(), payload, timestamp],
        )?;

        let entry = self
            .find_detail::<T>(prescription_id)?
            .ok_or_else(|| DbError::NotFound(format!("{} for {}", T::KIND, prescription_id)))?;
        Ok((entry, inserted > 0))
    }

    /// Store `record` for a prescription, creating or replacing it.
    pub fn save_detail<T: DetailRecord>(
        &self,
        prescription_id: &str,
        record: &T,
    ) -> DbResult<DetailEntry<T>> {
        let payload = serde_json::to_string(record)?;
        let timestamp = now();
        self.conn.execute(
            r#"
            INSERT INTO prescription_details (
                prescription_id, kind, payload, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?4)
            ON CONFLICT (prescription_id, kind) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
            params![prescription_id, T::KIND.as_str(), payload, timestamp],
        )?;

        self.find_detail::<T>(prescription_id)?
            .ok_or_else(|| DbError::NotFound(format!("{} for {}", T::KIND, prescription_id)))
    }

    /// Detail kinds that exist for a prescription.
    pub fn list_detail_kinds(&self, prescription_id: &str) -> DbResult<Vec<DetailKind>> {
        let mut stmt = self.conn.prepare(
            "SELECT kind FROM prescription_details WHERE prescription_id = ? ORDER BY kind",
        )?;
        let kinds = stmt
            .query_map([prescription_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        kinds
            .into_iter()
            .map(|kind| {
                DetailKind::parse(&kind)
                    .ok_or_else(|| DbError::Constraint(format!("Invalid detail kind: {}", kind)))
            })
            .collect()
    }
}
