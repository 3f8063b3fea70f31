//! Template and lookup option database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{now, Database, DbError, DbResult};
use crate::models::{LookupKind, LookupOption, Template};

impl Database {
    /// Insert a new template.
    pub fn insert_template(&self, template: &Template) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO templates (id, name, description, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                template.id,
                template.name,
                template.description,
                template.is_active,
                template.created_at,
                template.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update an existing template.
    pub fn update_template(&self, template: &Template) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE templates SET
                name = ?2,
                description = ?3,
                is_active = ?4,
                updated_at = ?5
            WHERE id = ?1
            "#,
            params![
                template.id,
                template.name,
                template.description,
                template.is_active,
                now(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a template by ID.
    pub fn get_template(&self, id: &str) -> DbResult<Option<Template>> {
        self.conn
            .query_row(
                r#"
                SELECT id, name, description, is_active, created_at, updated_at
                FROM templates
                WHERE id = ?
                "#,
                [id],
                template_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Oldest template with exactly this name.
    pub fn find_template_by_name(&self, name: &str) -> DbResult<Option<Template>> {
        self.conn
            .query_row(
                r#"
                SELECT id, name, description, is_active, created_at, updated_at
                FROM templates
                WHERE name = ?
                ORDER BY created_at
                LIMIT 1
                "#,
                [name],
                template_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Oldest active template.
    pub fn first_active_template(&self) -> DbResult<Option<Template>> {
        self.conn
            .query_row(
                r#"
                SELECT id, name, description, is_active, created_at, updated_at
                FROM templates
                WHERE is_active = 1
                ORDER BY created_at, name
                LIMIT 1
                "#,
                [],
                template_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// List templates, optionally only active or inactive ones.
    pub fn list_templates(&self, is_active: Option<bool>) -> DbResult<Vec<Template>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, name, description, is_active, created_at, updated_at
            FROM templates
            WHERE ?1 IS NULL OR is_active = ?1
            ORDER BY name
            "#,
        )?;

        let templates = stmt
            .query_map([is_active], template_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(templates)
    }

    /// Delete a template. Prescriptions using it are deleted with it.
    pub fn delete_template(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM templates WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    /// Insert a new lookup option.
    pub fn insert_lookup_option(&self, option: &LookupOption) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO lookup_options (
                id, kind, name, description, color, sort_order, is_active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                option.id,
                option.kind.as_str(),
                option.name,
                option.description,
                option.color,
                option.sort_order,
                option.is_active,
                option.created_at,
                option.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update an existing lookup option. Its kind never changes.
    pub fn update_lookup_option(&self, option: &LookupOption) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE lookup_options SET
                name = ?2,
                description = ?3,
                color = ?4,
                sort_order = ?5,
                is_active = ?6,
                updated_at = ?7
            WHERE id = ?1
            "#,
            params![
                option.id,
                option.name,
                option.description,
                option.color,
                option.sort_order,
                option.is_active,
                now(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a lookup option by ID.
    pub fn get_lookup_option(&self, id: &str) -> DbResult<Option<LookupOption>> {
        self.conn
            .query_row(
                r#"
                SELECT id, kind, name, description, color, sort_order, is_active,
                       created_at, updated_at
                FROM lookup_options
                WHERE id = ?
                "#,
                [id],
                lookup_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Lookup option by name within a kind.
    pub fn find_lookup_option(&self, kind: LookupKind, name: &str) -> DbResult<Option<LookupOption>> {
        self.conn
            .query_row(
                r#"
                SELECT id, kind, name, description, color, sort_order, is_active,
                       created_at, updated_at
                FROM lookup_options
                WHERE kind = ?1 AND name = ?2
                "#,
                params![kind.as_str(), name],
                lookup_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Options of one kind ordered by (sort_order, name).
    pub fn list_lookup_options(
        &self,
        kind: LookupKind,
        active_only: bool,
    ) -> DbResult<Vec<LookupOption>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, kind, name, description, color, sort_order, is_active,
                   created_at, updated_at
            FROM lookup_options
            WHERE kind = ?1 AND (?2 = 0 OR is_active = 1)
            ORDER BY sort_order, name
            "#,
        )?;

        let rows = stmt.query_map(params![kind.as_str(), active_only], lookup_row)?;

        let mut options = Vec::new();
        for row in rows {
            options.push(row?.try_into()?);
        }
        Ok(options)
    }

    /// Delete a lookup option; prescriptions referring to it are cleared.
    pub fn delete_lookup_option(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM lookup_options WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }
}

fn template_from_row(row: &Row<'_>) -> rusqlite::Result<Template> {
    Ok(Template {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        is_active: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn lookup_row(row: &Row<'_>) -> rusqlite::Result<LookupRow> {
    Ok(LookupRow {
        id: row.get(0)?,
        kind: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        color: row.get(4)?,
        sort_order: row.get(5)?,
        is_active: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Internal row representation for lookup options.
struct LookupRow {
    id: String,
    kind: String,
    name: String,
    description: String,
    color: Option<String>,
    sort_order: i64,
    is_active: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<LookupRow> for LookupOption {
    type Error = DbError;

    fn try_from(row: LookupRow) -> Result<Self, Self::Error> {
        let kind = LookupKind::parse(&row.kind)
            .ok_or_else(|| DbError::Constraint(format!("Invalid lookup kind: {}", row.kind)))?;

        Ok(LookupOption {
            id: row.id,
            kind,
            name: row.name,
            description: row.description,
            color: row.color,
            sort_order: row.sort_order,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
