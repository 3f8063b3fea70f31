//! Token issuance and blacklisting.

use sha2::{Digest, Sha256};

use super::{AuthError, AuthResult};
use crate::db::{Database, TokenKind};
use crate::models::User;

/// Access and refresh tokens handed to a client at login or registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Issues and revokes session tokens.
pub trait TokenIssuer {
    fn issue(&self, user: &User) -> AuthResult<TokenPair>;

    /// Invalidate a refresh token.
    fn blacklist(&self, refresh: &str) -> AuthResult<()>;
}

/// Hex SHA-256 of a token, the only form in which tokens are stored.
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Opaque random tokens recorded in the local database.
pub struct LocalTokenIssuer<'a> {
    db: &'a Database,
}

impl<'a> LocalTokenIssuer<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn mint(&self, user: &User, kind: TokenKind) -> AuthResult<String> {
        let token = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
        self.db.insert_token(&token_digest(&token), &user.id, kind)?;
        Ok(token)
    }

    /// The user an access token was issued to.
    pub fn resolve_access(&self, access: &str) -> AuthResult<String> {
        let stored = self
            .db
            .get_token(&token_digest(access))?
            .ok_or(AuthError::InvalidToken)?;

        if stored.kind != TokenKind::Access {
            return Err(AuthError::InvalidToken);
        }
        if stored.revoked {
            return Err(AuthError::Blacklisted);
        }
        Ok(stored.user_id)
    }
}

impl TokenIssuer for LocalTokenIssuer<'_> {
    fn issue(&self, user: &User) -> AuthResult<TokenPair> {
        Ok(TokenPair {
            access: self.mint(user, TokenKind::Access)?,
            refresh: self.mint(user, TokenKind::Refresh)?,
        })
    }

    fn blacklist(&self, refresh: &str) -> AuthResult<()> {
        let digest = token_digest(refresh);
        let stored = self.db.get_token(&digest)?.ok_or(AuthError::InvalidToken)?;

        if stored.kind != TokenKind::Refresh {
            return Err(AuthError::InvalidToken);
        }
        if !self.db.revoke_token(&digest)? {
            return Err(AuthError::Blacklisted);
        }

        // Logging out ends every session of the user.
        self.db.revoke_user_tokens(&stored.user_id)?;
        log::info!("Blacklisted refresh token for user {}", stored.user_id);
        Ok(())
    }
}
