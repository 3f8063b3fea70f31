//! Clinic and user database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{now, Database, DbError, DbResult};
use crate::models::{Clinic, Role, User};

const USER_COLUMNS: &str = r#"
    id, email, first_name, last_name, phone, role, clinic_id,
    is_staff, active, password_hash, last_login, created_at, updated_at
"#;

impl Database {
    /// Insert a new clinic.
    pub fn insert_clinic(&self, clinic: &Clinic) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO clinics (
                id, name, address, phone, email, logo_url, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                clinic.id,
                clinic.name,
                clinic.address,
                clinic.phone,
                clinic.email,
                clinic.logo_url,
                clinic.created_at,
                clinic.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update an existing clinic.
    pub fn update_clinic(&self, clinic: &Clinic) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE clinics SET
                name = ?2,
                address = ?3,
                phone = ?4,
                email = ?5,
                logo_url = ?6,
                updated_at = ?7
            WHERE id = ?1
            "#,
            params![
                clinic.id,
                clinic.name,
                clinic.address,
                clinic.phone,
                clinic.email,
                clinic.logo_url,
                now(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a clinic by ID.
    pub fn get_clinic(&self, id: &str) -> DbResult<Option<Clinic>> {
        self.conn
            .query_row(
                r#"
                SELECT id, name, address, phone, email, logo_url, created_at, updated_at
                FROM clinics
                WHERE id = ?
                "#,
                [id],
                clinic_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Oldest clinic with exactly this name.
    pub fn find_clinic_by_name(&self, name: &str) -> DbResult<Option<Clinic>> {
        self.conn
            .query_row(
                r#"
                SELECT id, name, address, phone, email, logo_url, created_at, updated_at
                FROM clinics
                WHERE name = ?
                ORDER BY created_at
                LIMIT 1
                "#,
                [name],
                clinic_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Insert a new user.
    pub fn insert_user(&self, user: &User) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO users (
                id, email, first_name, last_name, phone, role, clinic_id,
                is_staff, active, password_hash, last_login, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                user.id,
                user.email,
                user.first_name,
                user.last_name,
                user.phone,
                user.role.as_str(),
                user.clinic_id,
                user.is_staff,
                user.active,
                user.password_hash,
                user.last_login,
                user.created_at,
                user.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update an existing user, including their password hash.
    pub fn update_user(&self, user: &User) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE users SET
                email = ?2,
                first_name = ?3,
                last_name = ?4,
                phone = ?5,
                role = ?6,
                clinic_id = ?7,
                is_staff = ?8,
                active = ?9,
                password_hash = ?10,
                last_login = ?11,
                updated_at = ?12
            WHERE id = ?1
            "#,
            params![
                user.id,
                user.email,
                user.first_name,
                user.last_name,
                user.phone,
                user.role.as_str(),
                user.clinic_id,
                user.is_staff,
                user.active,
                user.password_hash,
                user.last_login,
                now(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a user by ID.
    pub fn get_user(&self, id: &str) -> DbResult<Option<User>> {
        self.conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"),
                [id],
                user_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Get a user by (lower-cased) email.
    pub fn get_user_by_email(&self, email: &str) -> DbResult<Option<User>> {
        self.conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"),
                [email.to_lowercase()],
                user_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Record a successful login.
    pub fn touch_last_login(&self, user_id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE users SET last_login = ?2 WHERE id = ?1",
            params![user_id, now()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Count users (for sanity checks and tests).
    pub fn count_users(&self) -> DbResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Count clinics.
    pub fn count_clinics(&self) -> DbResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM clinics", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn clinic_from_row(row: &Row<'_>) -> rusqlite::Result<Clinic> {
    Ok(Clinic {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        phone: row.get(3)?,
        email: row.get(4)?,
        logo_url: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        phone: row.get(4)?,
        role: row.get(5)?,
        clinic_id: row.get(6)?,
        is_staff: row.get(7)?,
        active: row.get(8)?,
        password_hash: row.get(9)?,
        last_login: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// Internal row representation for users.
struct UserRow {
    id: String,
    email: String,
    first_name: String,
    last_name: String,
    phone: String,
    role: String,
    clinic_id: Option<String>,
    is_staff: bool,
    active: bool,
    password_hash: String,
    last_login: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<UserRow> for User {
    type Error = DbError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = Role::parse(&row.role)
            .ok_or_else(|| DbError::Constraint(format!("Invalid role: {}", row.role)))?;

        Ok(User {
            id: row.id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
            role,
            clinic_id: row.clinic_id,
            is_staff: row.is_staff,
            active: row.active,
            password_hash: row.password_hash,
            last_login: row.last_login,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_insert_and_get_clinic() {
        let db = setup_db();
        let mut clinic = Clinic::new("Stride".into());
        clinic.phone = "555-0100".into();
        db.insert_clinic(&clinic).unwrap();

        let retrieved = db.get_clinic(&clinic.id).unwrap().unwrap();
        assert_eq!(retrieved.name, "Stride");
        assert_eq!(retrieved.phone, "555-0100");

        let by_name = db.find_clinic_by_name("Stride").unwrap().unwrap();
        assert_eq!(by_name.id, clinic.id);
        assert!(db.find_clinic_by_name("Other").unwrap().is_none());
    }

    #[test]
    fn test_update_clinic() {
        let db = setup_db();
        let mut clinic = Clinic::new("Stride".into());
        db.insert_clinic(&clinic).unwrap();

        clinic.address = "2 High St".into();
        assert!(db.update_clinic(&clinic).unwrap());
        assert_eq!(db.get_clinic(&clinic.id).unwrap().unwrap().address, "2 High St");
    }

    #[test]
    fn test_insert_and_get_user() {
        let db = setup_db();
        let clinic = Clinic::new("Stride".into());
        db.insert_clinic(&clinic).unwrap();

        let mut user = User::new("ada@example.com".into(), "Ada".into(), "L".into());
        user.clinic_id = Some(clinic.id.clone());
        user.role = Role::LabTech;
        user.password_hash = "hash".into();
        db.insert_user(&user).unwrap();

        let retrieved = db.get_user(&user.id).unwrap().unwrap();
        assert_eq!(retrieved.role, Role::LabTech);
        assert_eq!(retrieved.clinic_id, Some(clinic.id));
        assert_eq!(retrieved.password_hash, "hash");

        let by_email = db.get_user_by_email("ADA@example.com").unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let db = setup_db();
        let a = User::new("ada@example.com".into(), "Ada".into(), String::new());
        let b = User::new("ada@example.com".into(), "Other".into(), String::new());
        db.insert_user(&a).unwrap();
        assert!(db.insert_user(&b).is_err());
        assert_eq!(db.count_users().unwrap(), 1);
    }

    #[test]
    fn test_touch_last_login() {
        let db = setup_db();
        let user = User::new("ada@example.com".into(), "Ada".into(), String::new());
        db.insert_user(&user).unwrap();
        assert!(db.get_user(&user.id).unwrap().unwrap().last_login.is_none());

        assert!(db.touch_last_login(&user.id).unwrap());
        assert!(db.get_user(&user.id).unwrap().unwrap().last_login.is_some());
    }
}
