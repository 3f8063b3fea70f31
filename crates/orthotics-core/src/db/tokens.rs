//! Issued auth token storage, keyed by token digest.

use rusqlite::{params, OptionalExtension};

use super::{now, Database, DbError, DbResult};

/// Kind of an issued token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "access" => Some(TokenKind::Access),
            "refresh" => Some(TokenKind::Refresh),
            _ => None,
        }
    }
}

/// A stored token record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredToken {
    pub digest: String,
    pub user_id: String,
    pub kind: TokenKind,
    pub revoked: bool,
}

impl Database {
    /// Record an issued token by digest.
    pub fn insert_token(&self, digest: &str, user_id: &str, kind: TokenKind) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO auth_tokens (digest, user_id, kind, issued_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![digest, user_id, kind.as_str(), now()],
        )?;
        Ok(())
    }

    pub fn get_token(&self, digest: &str) -> DbResult<Option<StoredToken>> {
        let row = self
            .conn
            .query_row(
                "SELECT digest, user_id, kind, revoked_at IS NOT NULL FROM auth_tokens WHERE digest = ?",
                [digest],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(digest, user_id, kind, revoked)| -> DbResult<StoredToken> {
            let kind = TokenKind::parse(&kind)
                .ok_or_else(|| DbError::Constraint(format!("Invalid token kind: {}", kind)))?;
            Ok(StoredToken {
                digest,
                user_id,
                kind,
                revoked,
            })
        })
        .transpose()
    }

    /// Revoke a token. Returns false if unknown or already revoked.
    pub fn revoke_token(&self, digest: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE auth_tokens SET revoked_at = ?2 WHERE digest = ?1 AND revoked_at IS NULL",
            params![digest, now()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Revoke every live token of a user.
    pub fn revoke_user_tokens(&self, user_id: &str) -> DbResult<usize> {
        let rows_affected = self.conn.execute(
            "UPDATE auth_tokens SET revoked_at = ?2 WHERE user_id = ?1 AND revoked_at IS NULL",
            params![user_id, now()],
        )?;
        Ok(rows_affected)
    }
}
