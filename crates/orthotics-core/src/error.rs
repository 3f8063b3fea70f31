//! Typed service outcomes.
//!
//! Every service operation fails with a [`ServiceError`]. Storage and other
//! internal failures are logged here and reach the caller only as a generic
//! [`ServiceError::Internal`].

use thiserror::Error;

use crate::auth::AuthError;
use crate::db::DbError;
use crate::export::RenderError;
use crate::media::MediaError;
use crate::validation::FieldErrors;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected state transition.
    #[error("{0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("An internal error occurred")]
    Internal,
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// HTTP status an outer surface should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Validation(_) | ServiceError::Conflict(_) => 400,
            ServiceError::Unauthorized(_) => 401,
            ServiceError::Forbidden(_) => 403,
            ServiceError::NotFound(_) => 404,
            ServiceError::Internal => 500,
            ServiceError::Unavailable(_) => 501,
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::Validation(FieldErrors::single(field, message))
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        ServiceError::NotFound(what.to_string())
    }
}

impl From<FieldErrors> for ServiceError {
    fn from(errors: FieldErrors) -> Self {
        ServiceError::Validation(errors)
    }
}

impl From<DbError> for ServiceError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(what) => ServiceError::NotFound(what),
            other => {
                log::error!("Storage failure: {}", other);
                ServiceError::Internal
            }
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Database(db) => db.into(),
            other @ (AuthError::InvalidToken | AuthError::Blacklisted) => {
                ServiceError::Unauthorized(other.to_string())
            }
            AuthError::Hash(reason) => {
                log::error!("Password hashing failure: {}", reason);
                ServiceError::Internal
            }
        }
    }
}

impl From<MediaError> for ServiceError {
    fn from(e: MediaError) -> Self {
        log::error!("Media storage failure: {}", e);
        ServiceError::Internal
    }
}

impl From<RenderError> for ServiceError {
    fn from(e: RenderError) -> Self {
        log::error!("Error generating PDF: {}", e);
        ServiceError::Internal
    }
}
