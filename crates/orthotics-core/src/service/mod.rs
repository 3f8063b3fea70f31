//! Workflow services.
//!
//! Each service borrows the database (and whatever collaborators it needs)
//! and runs its operations on behalf of an actor. Tenant scope is derived
//! from the actor on every call; an aggregate outside the scope is reported
//! as not found.

mod accounts;
mod catalog;
mod invoices;
mod orders;
mod patients;
mod prescriptions;
mod uploads;

pub use accounts::{AccountService, PasswordChange, Profile, Session};
pub use catalog::{CatalogService, LookupInput, TemplateInput};
pub use invoices::{InvoiceService, NewInvoiceItem};
pub use orders::{NewOrder, OrderService};
pub use patients::PatientService;
pub use prescriptions::{DetailResponse, NewPrescription, PrescriptionService};
pub use uploads::UploadService;

use crate::access::{Aggregate, TenantScope};
use crate::db::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::models::User;

/// Fail with not found unless `id` is visible to `actor`.
pub(crate) fn ensure_visible(
    db: &Database,
    actor: &User,
    aggregate: Aggregate,
    id: &str,
) -> ServiceResult<()> {
    let scope = TenantScope::for_actor(actor);
    if db.is_visible(&scope, aggregate, id)? {
        Ok(())
    } else {
        Err(ServiceError::NotFound(format!("{} {}", aggregate.label(), id)))
    }
}

/// The clinic an actor creates records in.
pub(crate) fn actor_clinic(actor: &User) -> ServiceResult<&str> {
    actor
        .clinic_id
        .as_deref()
        .ok_or_else(|| ServiceError::validation("clinic", "User does not have an associated clinic"))
}

/// Trimmed value, or a required-field error.
pub(crate) fn required(field: &str, value: &str) -> ServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::validation(field, "This field is required."));
    }
    Ok(trimmed.to_string())
}
