//! Accounts: password hashing and token issuance.
//!
//! The token protocol is a collaborator behind [`TokenIssuer`]. The crate
//! ships [`LocalTokenIssuer`], which hands out opaque random tokens and keeps
//! only their SHA-256 digests, so a leaked database never yields a usable
//! token.

mod password;
mod tokens;

pub use password::{hash_password, verify_password};
pub use tokens::{token_digest, LocalTokenIssuer, TokenIssuer, TokenPair};

use thiserror::Error;

use crate::db::DbError;

/// Authentication errors.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Password hashing failed: {0}")]
    Hash(String),

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Token has been blacklisted")]
    Blacklisted,
}

pub type AuthResult<T> = Result<T, AuthError>;
