//! Database layer for the orthotics portal.

mod clinics;
mod details;
mod invoices;
mod orders;
mod patients;
mod prescriptions;
mod scans;
mod schema;
mod templates;
mod tokens;

pub use schema::*;
pub use tokens::{StoredToken, TokenKind};

use rusqlite::{params_from_iter, Connection};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::access::{Aggregate, ScopeFilter, TenantScope};

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transaction.
    pub fn transaction(&mut self) -> DbResult<rusqlite::Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    /// Run `f` inside a transaction: committed if `f` succeeds, rolled back
    /// if it fails. Must not be nested.
    pub fn atomic<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Database) -> Result<T, E>,
        E: From<DbError>,
    {
        let tx = self.conn.unchecked_transaction().map_err(DbError::from)?;
        let value = f(self)?;
        tx.commit().map_err(DbError::from)?;
        Ok(value)
    }

    /// Whether the row `id` of `aggregate` is visible within `scope`.
    pub fn is_visible(&self, scope: &TenantScope, aggregate: Aggregate, id: &str) -> DbResult<bool> {
        let Some(mut filter) = WhereClause::scoped(scope, aggregate) else {
            return Ok(false);
        };
        filter.push(format!("{}.id = ?", aggregate.table()), id);

        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {}{})",
            aggregate.table(),
            filter.sql()
        );
        let visible: bool = self
            .conn
            .query_row(&sql, params_from_iter(filter.params()), |row| row.get(0))?;
        Ok(visible)
    }
}

/// Current time as stored in every timestamp column.
pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub(crate) fn parse_decimal(value: &str) -> DbResult<Decimal> {
    Decimal::from_str(value).map_err(|_| DbError::Constraint(format!("Invalid decimal: {}", value)))
}

/// Incrementally built `WHERE` clause with positional parameters.
pub(crate) struct WhereClause {
    clauses: Vec<String>,
    params: Vec<String>,
}

impl WhereClause {
    pub(crate) fn new() -> Self {
        Self {
            clauses: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Clause restricted to `scope`; `None` when the scope sees nothing.
    pub(crate) fn scoped(scope: &TenantScope, aggregate: Aggregate) -> Option<Self> {
        let mut clause = Self::new();
        match scope.filter(aggregate) {
            ScopeFilter::Unrestricted => {}
            ScopeFilter::Clinic { predicate, clinic_id } => clause.push(predicate, clinic_id),
            ScopeFilter::Empty => return None,
        }
        Some(clause)
    }

    /// Add a condition with one `?` placeholder.
    pub(crate) fn push(&mut self, clause: impl Into<String>, param: impl Into<String>) {
        self.clauses.push(clause.into());
        self.params.push(param.into());
    }

    pub(crate) fn sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub(crate) fn params(&self) -> impl Iterator<Item = &String> {
        self.params.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn test_open_on_disk_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orthotics.db");
        {
            let db = Database::open(&path).unwrap();
            db.conn()
                .execute("INSERT INTO clinics (id, name) VALUES ('c1', 'Stride')", [])
                .unwrap();
        }
        let db = Database::open(&path).unwrap();
        let name: String = db
            .conn()
            .query_row("SELECT name FROM clinics WHERE id = 'c1'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "Stride");
    }

    #[test]
    fn test_schema_initialized() {
        let db = Database::open_in_memory().unwrap();

        let tables: Vec<String> = db
            .conn()
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for table in [
            "clinics",
            "users",
            "auth_tokens",
            "patients",
            "templates",
            "lookup_options",
            "prescriptions",
            "prescription_details",
            "scans",
            "attachments",
            "orders",
            "order_prescriptions",
            "invoices",
            "invoice_items",
        ] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }
    }

    #[test]
    fn test_atomic_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();

        let result: DbResult<()> = db.atomic(|db| {
            db.conn()
                .execute("INSERT INTO clinics (id, name) VALUES ('c1', 'Stride')", [])?;
            Err(DbError::Constraint("abort".into()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM clinics", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_atomic_commits_on_success() {
        let db = Database::open_in_memory().unwrap();

        db.atomic(|db| {
            db.conn()
                .execute("INSERT INTO clinics (id, name) VALUES ('c1', 'Stride')", [])?;
            Ok::<_, DbError>(())
        })
        .unwrap();

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM clinics", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_where_clause() {
        let mut clause = WhereClause::new();
        assert_eq!(clause.sql(), "");
        clause.push("a = ?", "1");
        clause.push("b = ?", "2");
        assert_eq!(clause.sql(), " WHERE a = ? AND b = ?");
        assert_eq!(clause.params().count(), 2);
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("12.50").unwrap(), Decimal::new(1250, 2));
        assert!(parse_decimal("twelve").is_err());
    }
}
