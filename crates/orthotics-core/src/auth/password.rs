//! Argon2 password hashing.

use std::sync::LazyLock;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use super::{AuthError, AuthResult};

static DEFAULT_HASHER: LazyLock<Argon2<'static>> = LazyLock::new(Argon2::default);

/// Hash of the empty password, checked when the account does not exist so
/// that unknown emails cost as much as wrong passwords.
static EMPTY_HASH: LazyLock<Option<String>> = LazyLock::new(|| hash_password("").ok());

/// Hash a password with a fresh random salt into a PHC string.
pub fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = DEFAULT_HASHER
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Hash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Check a password against a stored PHC string. A missing hash never
/// verifies but still costs one verification.
pub fn verify_password(password: &str, stored: Option<&str>) -> bool {
    let Some(candidate) = stored.or(EMPTY_HASH.as_deref()) else {
        return false;
    };
    let Ok(parsed) = PasswordHash::new(candidate) else {
        return false;
    };

    let matches = DEFAULT_HASHER
        .verify_password(password.as_bytes(), &parsed)
        .is_ok();
    matches && stored.is_some()
}
