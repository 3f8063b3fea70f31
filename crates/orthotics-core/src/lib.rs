//! Orthotics Core Library
//!
//! Administrative back office for an orthotics clinic: clinics register,
//! create patients, fill out multi-section orthotic prescriptions, bundle
//! them into orders and bill those orders through invoices.
//!
//! # Architecture
//!
//! ```text
//!   Registration ──► Clinic + User ──► Patient ──► Prescription (auto-created)
//!                                                      │
//!                              ┌───────────────────────┼───────────────────────┐
//!                              │                       │                       │
//!                              ▼                       ▼                       ▼
//!                      Detail records           Scans/attachments        Administration
//!                   (get-or-create, edit)        (MediaStore)           (lookups, notes)
//!                              │
//!                              ▼
//!                            Order ──► Invoice ──► JSON / CSV / PDF export
//! ```
//!
//! Every read and write runs on behalf of an actor and is limited to the
//! actor's clinic through [`access::TenantScope`].
//!
//! # Modules
//!
//! - [`db`]: SQLite persistence
//! - [`models`]: Domain types (Patient, Prescription, Order, Invoice, etc.)
//! - [`access`]: Tenant scoping
//! - [`validation`]: Payload coercion, upload and account checks
//! - [`service`]: Workflow services
//! - [`auth`]: Password hashing and session tokens
//! - [`export`]: Invoice export
//! - [`media`]: Scan and attachment storage

pub mod access;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod media;
pub mod models;
pub mod service;
pub mod validation;

// Re-export commonly used types
pub use config::CoreConfig;
pub use db::Database;
pub use error::{ServiceError, ServiceResult};
pub use export::{DocumentRenderer, RenderError};
pub use media::{FsMediaStore, MediaStore};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;

use auth::LocalTokenIssuer;
use models::{
    Attachment, Clinic, DetailKind, Gender, LookupKind, LookupOption, NewPatient, OrderView,
    Patient, PrescriptionFilter, PrescriptionSummary, Scan, Template, User,
    InvoiceView,
};
use service::{
    AccountService, CatalogService, DetailResponse, InvoiceService, NewInvoiceItem, NewOrder,
    NewPrescription, OrderService, PasswordChange, PatientService, PrescriptionService, Session,
    UploadService,
};
use validation::{FieldErrors, RegistrationRequest, UpdateMode, UploadedFile, NON_FIELD_ERRORS};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum OrthoticsError {
    /// Field errors as a JSON object of field name to messages.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("An internal error occurred")]
    Internal,
}

impl OrthoticsError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        OrthoticsError::Validation(FieldErrors::single(field, message).to_json())
    }
}

impl From<ServiceError> for OrthoticsError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Validation(errors) => OrthoticsError::Validation(errors.to_json()),
            ServiceError::Forbidden(m) => OrthoticsError::Forbidden(m),
            ServiceError::NotFound(m) => OrthoticsError::NotFound(m),
            ServiceError::Conflict(m) => OrthoticsError::Conflict(m),
            ServiceError::Unauthorized(m) => OrthoticsError::Unauthorized(m),
            ServiceError::Unavailable(m) => OrthoticsError::Unavailable(m),
            ServiceError::Internal => OrthoticsError::Internal,
        }
    }
}

impl From<db::DbError> for OrthoticsError {
    fn from(e: db::DbError) -> Self {
        ServiceError::from(e).into()
    }
}

impl<T> From<std::sync::PoisonError<T>> for OrthoticsError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        log::error!("Lock poisoned: {}", e);
        OrthoticsError::Internal
    }
}

impl OrthoticsError {
    /// HTTP status an outer surface should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            OrthoticsError::Validation(_) | OrthoticsError::Conflict(_) => 400,
            OrthoticsError::Unauthorized(_) => 401,
            OrthoticsError::Forbidden(_) => 403,
            OrthoticsError::NotFound(_) => 404,
            OrthoticsError::Config(_) | OrthoticsError::Internal => 500,
            OrthoticsError::Unavailable(_) => 501,
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, OrthoticsError> {
    serde_json::to_string(value).map_err(|e| {
        log::error!("Serialization failed: {}", e);
        OrthoticsError::Internal
    })
}

fn from_json<T: DeserializeOwned>(json: &str) -> Result<T, OrthoticsError> {
    serde_json::from_str(json).map_err(|e| OrthoticsError::invalid(NON_FIELD_ERRORS, e.to_string()))
}

fn payload_map(json: &str) -> Result<serde_json::Map<String, serde_json::Value>, OrthoticsError> {
    match from_json::<serde_json::Value>(json)? {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(OrthoticsError::invalid(NON_FIELD_ERRORS, "Expected a JSON object")),
    }
}

fn parse_kind<T>(field: &str, value: &str, parse: fn(&str) -> Option<T>) -> Result<T, OrthoticsError> {
    parse(value).ok_or_else(|| OrthoticsError::invalid(field, format!("\"{}\" is not a valid choice.", value)))
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path, with default settings.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<OrthoticsCore>, OrthoticsError> {
    let config = CoreConfig {
        database_path: path.into(),
        ..CoreConfig::default()
    };
    OrthoticsCore::open(config)
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory(media_root: String) -> Result<Arc<OrthoticsCore>, OrthoticsError> {
    let config = CoreConfig {
        media_root: media_root.into(),
        ..CoreConfig::default()
    };
    let db = Database::open_in_memory()?;
    Ok(Arc::new(OrthoticsCore::with_database(db, config)))
}

/// Open with settings read from a JSON config file.
#[uniffi::export]
pub fn open_with_config(config_path: String) -> Result<Arc<OrthoticsCore>, OrthoticsError> {
    let config =
        CoreConfig::load(&config_path).map_err(|e| OrthoticsError::Config(format!("{:#}", e)))?;
    OrthoticsCore::open(config)
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe entry point for outer surfaces. Every call that acts on
/// clinic data takes the caller's access token.
#[derive(uniffi::Object)]
pub struct OrthoticsCore {
    db: Arc<Mutex<Database>>,
    config: CoreConfig,
    media: Arc<dyn MediaStore>,
    renderer: Mutex<Option<Arc<dyn DocumentRenderer>>>,
}

impl OrthoticsCore {
    fn open(config: CoreConfig) -> Result<Arc<Self>, OrthoticsError> {
        let db = Database::open(&config.database_path)?;
        log::info!("Opened database {}", config.database_path.display());
        Ok(Arc::new(Self::with_database(db, config)))
    }

    /// Wrap an open database.
    pub fn with_database(db: Database, config: CoreConfig) -> Self {
        let media = Arc::new(FsMediaStore::new(config.media_root.clone()));
        Self {
            db: Arc::new(Mutex::new(db)),
            config,
            media,
            renderer: Mutex::new(None),
        }
    }

    /// The active user an access token was issued to.
    fn actor(&self, db: &Database, access_token: &str) -> Result<User, OrthoticsError> {
        let user_id = LocalTokenIssuer::new(db)
            .resolve_access(access_token)
            .map_err(ServiceError::from)?;
        match db.get_user(&user_id)? {
            Some(user) if user.active => Ok(user),
            _ => Err(OrthoticsError::Unauthorized("User is inactive or deleted".to_string())),
        }
    }
}

#[uniffi::export]
impl OrthoticsCore {
    /// Register the collaborator that turns print contexts into PDFs.
    pub fn set_renderer(&self, renderer: Arc<dyn DocumentRenderer>) -> Result<(), OrthoticsError> {
        *self.renderer.lock()? = Some(renderer);
        Ok(())
    }

    // =========================================================================
    // Account Operations
    // =========================================================================

    pub fn register(&self, request: FfiRegistration) -> Result<FfiSession, OrthoticsError> {
        let db = self.db.lock()?;
        let issuer = LocalTokenIssuer::new(&db);
        let session = AccountService::new(&db, &issuer).register(&request.into())?;
        Ok(session.into())
    }

    pub fn login(&self, email: String, password: String) -> Result<FfiSession, OrthoticsError> {
        let db = self.db.lock()?;
        let issuer = LocalTokenIssuer::new(&db);
        let session = AccountService::new(&db, &issuer).login(&email, &password)?;
        Ok(session.into())
    }

    pub fn logout(&self, refresh_token: String) -> Result<(), OrthoticsError> {
        let db = self.db.lock()?;
        let issuer = LocalTokenIssuer::new(&db);
        AccountService::new(&db, &issuer).logout(&refresh_token)?;
        Ok(())
    }

    /// The caller's profile as JSON (`user`, `clinic`).
    pub fn profile(&self, token: String) -> Result<String, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        let issuer = LocalTokenIssuer::new(&db);
        to_json(&AccountService::new(&db, &issuer).profile(&actor)?)
    }

    /// Apply a JSON object of `first_name`, `last_name`, `phone`.
    pub fn update_profile(&self, token: String, update_json: String) -> Result<String, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        let issuer = LocalTokenIssuer::new(&db);
        let profile = AccountService::new(&db, &issuer).update_profile(&actor, from_json(&update_json)?)?;
        to_json(&profile)
    }

    pub fn change_password(
        &self,
        token: String,
        old_password: String,
        new_password: String,
        new_password_confirm: String,
    ) -> Result<(), OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        let issuer = LocalTokenIssuer::new(&db);
        AccountService::new(&db, &issuer).change_password(
            &actor,
            &PasswordChange {
                old_password,
                new_password,
                new_password_confirm,
            },
        )?;
        Ok(())
    }

    /// Apply a JSON object of clinic contact fields to the caller's clinic.
    pub fn update_clinic(&self, token: String, update_json: String) -> Result<FfiClinic, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        let issuer = LocalTokenIssuer::new(&db);
        let clinic = AccountService::new(&db, &issuer).update_clinic(&actor, from_json(&update_json)?)?;
        Ok(clinic.into())
    }

    // =========================================================================
    // Template and Lookup Operations
    // =========================================================================

    pub fn list_templates(&self, token: String, is_active: Option<bool>) -> Result<Vec<FfiTemplate>, OrthoticsError> {
        let db = self.db.lock()?;
        self.actor(&db, &token)?;
        let templates = CatalogService::new(&db).list_templates(is_active)?;
        Ok(templates.into_iter().map(|t| t.into()).collect())
    }

    /// Create from a JSON object of `name`, `description`, `is_active`.
    pub fn create_template(&self, token: String, input_json: String) -> Result<FfiTemplate, OrthoticsError> {
        let db = self.db.lock()?;
        self.actor(&db, &token)?;
        let template = CatalogService::new(&db).create_template(from_json(&input_json)?)?;
        Ok(template.into())
    }

    pub fn update_template(
        &self,
        token: String,
        template_id: String,
        input_json: String,
    ) -> Result<FfiTemplate, OrthoticsError> {
        let db = self.db.lock()?;
        self.actor(&db, &token)?;
        let template = CatalogService::new(&db).update_template(&template_id, from_json(&input_json)?)?;
        Ok(template.into())
    }

    pub fn delete_template(&self, token: String, template_id: String) -> Result<(), OrthoticsError> {
        let db = self.db.lock()?;
        self.actor(&db, &token)?;
        CatalogService::new(&db).delete_template(&template_id)?;
        Ok(())
    }

    /// Options of one list (`status`, `foot_type`, `wear_time`, `activity`).
    pub fn list_lookups(
        &self,
        token: String,
        kind: String,
        active_only: bool,
    ) -> Result<Vec<FfiLookupOption>, OrthoticsError> {
        let db = self.db.lock()?;
        self.actor(&db, &token)?;
        let kind = parse_kind("kind", &kind, LookupKind::parse)?;
        let options = CatalogService::new(&db).list_lookups(kind, active_only)?;
        Ok(options.into_iter().map(|o| o.into()).collect())
    }

    pub fn create_lookup(
        &self,
        token: String,
        kind: String,
        input_json: String,
    ) -> Result<FfiLookupOption, OrthoticsError> {
        let db = self.db.lock()?;
        self.actor(&db, &token)?;
        let kind = parse_kind("kind", &kind, LookupKind::parse)?;
        let option = CatalogService::new(&db).create_lookup(kind, from_json(&input_json)?)?;
        Ok(option.into())
    }

    pub fn update_lookup(
        &self,
        token: String,
        option_id: String,
        input_json: String,
    ) -> Result<FfiLookupOption, OrthoticsError> {
        let db = self.db.lock()?;
        self.actor(&db, &token)?;
        let option = CatalogService::new(&db).update_lookup(&option_id, from_json(&input_json)?)?;
        Ok(option.into())
    }

    pub fn delete_lookup(&self, token: String, option_id: String) -> Result<(), OrthoticsError> {
        let db = self.db.lock()?;
        self.actor(&db, &token)?;
        CatalogService::new(&db).delete_lookup(&option_id)?;
        Ok(())
    }

    // =========================================================================
    // Patient Operations
    // =========================================================================

    pub fn list_patients(&self, token: String) -> Result<Vec<FfiPatient>, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        let patients = PatientService::new(&db, &self.config, self.media.as_ref()).list(&actor)?;
        Ok(patients.into_iter().map(|p| p.into()).collect())
    }

    pub fn get_patient(&self, token: String, patient_id: String) -> Result<FfiPatient, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        let patient = PatientService::new(&db, &self.config, self.media.as_ref()).get(&actor, &patient_id)?;
        Ok(patient.into())
    }

    /// Create a patient and their first prescription.
    pub fn create_patient(&self, token: String, input: FfiNewPatient) -> Result<FfiCreatedPatient, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        let input = input.try_into()?;
        let (patient, rx) = PatientService::new(&db, &self.config, self.media.as_ref()).create(&actor, input)?;
        Ok(FfiCreatedPatient {
            patient: patient.into(),
            prescription_id: rx.id,
        })
    }

    /// Apply a JSON object of patient fields.
    pub fn update_patient(
        &self,
        token: String,
        patient_id: String,
        update_json: String,
    ) -> Result<FfiPatient, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        let patient = PatientService::new(&db, &self.config, self.media.as_ref()).update(
            &actor,
            &patient_id,
            from_json(&update_json)?,
        )?;
        Ok(patient.into())
    }

    pub fn delete_patient(&self, token: String, patient_id: String) -> Result<(), OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        PatientService::new(&db, &self.config, self.media.as_ref()).delete(&actor, &patient_id)?;
        Ok(())
    }

    // =========================================================================
    // Prescription Operations
    // =========================================================================

    pub fn list_prescriptions(
        &self,
        token: String,
        patient_id: Option<String>,
    ) -> Result<Vec<FfiPrescriptionSummary>, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        let filter = PrescriptionFilter {
            patient_id,
            ..Default::default()
        };
        let rows = PrescriptionService::new(&db, &self.config, self.media.as_ref()).list(&actor, &filter)?;
        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    pub fn create_prescription(
        &self,
        token: String,
        patient_id: String,
        template_id: Option<String>,
    ) -> Result<String, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        let rx = PrescriptionService::new(&db, &self.config, self.media.as_ref()).create(
            &actor,
            NewPrescription {
                patient_id,
                template_id,
            },
        )?;
        Ok(rx.id)
    }

    /// The full prescription with patient, lookups, details, scans and
    /// attachments, as JSON.
    pub fn get_prescription(&self, token: String, prescription_id: String) -> Result<String, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        let view = PrescriptionService::new(&db, &self.config, self.media.as_ref()).view(&actor, &prescription_id)?;
        to_json(&view)
    }

    pub fn delete_prescription(&self, token: String, prescription_id: String) -> Result<(), OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        PrescriptionService::new(&db, &self.config, self.media.as_ref()).delete(&actor, &prescription_id)?;
        Ok(())
    }

    /// Get-or-create one detail record (`postings`, `shoe_fitting`, ...).
    pub fn get_detail(&self, token: String, prescription_id: String, kind: String) -> Result<FfiDetail, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        let kind = parse_kind("kind", &kind, DetailKind::parse)?;
        let detail = PrescriptionService::new(&db, &self.config, self.media.as_ref())
            .detail_by_kind(&actor, &prescription_id, kind)?;
        detail.try_into()
    }

    /// Apply a JSON payload to a detail record. A partial update keeps the
    /// fields the payload leaves out; a full update resets them.
    pub fn update_detail(
        &self,
        token: String,
        prescription_id: String,
        kind: String,
        payload_json: String,
        partial: bool,
    ) -> Result<FfiDetail, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        let kind = parse_kind("kind", &kind, DetailKind::parse)?;
        let payload = payload_map(&payload_json)?;
        let mode = if partial { UpdateMode::Partial } else { UpdateMode::Full };
        let detail = PrescriptionService::new(&db, &self.config, self.media.as_ref())
            .update_detail_by_kind(&actor, &prescription_id, kind, &payload, mode)?;
        detail.try_into()
    }

    // =========================================================================
    // Scan and Attachment Operations
    // =========================================================================

    pub fn list_scans(&self, token: String, prescription_id: String) -> Result<Vec<FfiScan>, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        let scans = UploadService::new(&db, &self.config, self.media.as_ref()).list_scans(&actor, &prescription_id)?;
        Ok(scans.into_iter().map(|s| s.into()).collect())
    }

    /// Replace the scans of a prescription.
    pub fn upload_scans(
        &self,
        token: String,
        prescription_id: String,
        left_foot: Option<FfiFile>,
        right_foot: Option<FfiFile>,
    ) -> Result<FfiScan, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        let scan = UploadService::new(&db, &self.config, self.media.as_ref()).upload_scans(
            &actor,
            &prescription_id,
            left_foot.map(Into::into),
            right_foot.map(Into::into),
        )?;
        Ok(scan.into())
    }

    pub fn list_attachments(
        &self,
        token: String,
        prescription_id: String,
    ) -> Result<Vec<FfiAttachment>, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        let attachments =
            UploadService::new(&db, &self.config, self.media.as_ref()).list_attachments(&actor, &prescription_id)?;
        Ok(attachments.into_iter().map(|a| a.into()).collect())
    }

    pub fn add_attachment(
        &self,
        token: String,
        prescription_id: String,
        file: FfiFile,
        display_name: Option<String>,
    ) -> Result<FfiAttachment, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        let attachment = UploadService::new(&db, &self.config, self.media.as_ref()).add_attachment(
            &actor,
            &prescription_id,
            file.into(),
            display_name,
        )?;
        Ok(attachment.into())
    }

    pub fn delete_attachment(
        &self,
        token: String,
        prescription_id: String,
        attachment_id: String,
    ) -> Result<(), OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        UploadService::new(&db, &self.config, self.media.as_ref()).delete_attachment(
            &actor,
            &prescription_id,
            &attachment_id,
        )?;
        Ok(())
    }

    // =========================================================================
    // Order Operations
    // =========================================================================

    pub fn create_order(
        &self,
        token: String,
        prescription_ids: Vec<String>,
        notes: String,
    ) -> Result<FfiOrder, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        let view = OrderService::new(&db, &self.config).create(
            &actor,
            NewOrder {
                prescription_ids,
                notes,
            },
        )?;
        view.try_into()
    }

    pub fn list_orders(&self, token: String) -> Result<Vec<FfiOrder>, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        OrderService::new(&db, &self.config)
            .list(&actor)?
            .into_iter()
            .map(FfiOrder::try_from)
            .collect()
    }

    pub fn get_order(&self, token: String, order_id: String) -> Result<FfiOrder, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        OrderService::new(&db, &self.config).get(&actor, &order_id)?.try_into()
    }

    pub fn cancel_order(&self, token: String, order_id: String) -> Result<FfiOrder, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        OrderService::new(&db, &self.config).cancel(&actor, &order_id)?.try_into()
    }

    /// Staff only: move an order to its next fulfilment status.
    pub fn advance_order(&self, token: String, order_id: String) -> Result<FfiOrder, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        OrderService::new(&db, &self.config).advance(&actor, &order_id)?.try_into()
    }

    // =========================================================================
    // Invoice Operations
    // =========================================================================

    pub fn generate_invoice(&self, token: String, order_id: String) -> Result<FfiInvoice, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        InvoiceService::new(&db, &self.config).generate(&actor, &order_id)?.try_into()
    }

    pub fn list_invoices(&self, token: String) -> Result<Vec<FfiInvoice>, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        InvoiceService::new(&db, &self.config)
            .list(&actor)?
            .into_iter()
            .map(FfiInvoice::try_from)
            .collect()
    }

    pub fn get_invoice(&self, token: String, invoice_id: String) -> Result<FfiInvoice, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        InvoiceService::new(&db, &self.config).get(&actor, &invoice_id)?.try_into()
    }

    /// Add a line; `price` is a decimal string such as `"12.50"`.
    pub fn add_invoice_item(
        &self,
        token: String,
        invoice_id: String,
        description: String,
        price: String,
        quantity: i64,
    ) -> Result<FfiInvoice, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        let price: Decimal = price
            .trim()
            .parse()
            .map_err(|_| OrthoticsError::invalid("price", "A valid number is required."))?;
        InvoiceService::new(&db, &self.config)
            .add_item(
                &actor,
                &invoice_id,
                NewInvoiceItem {
                    description,
                    price,
                    quantity,
                },
            )?
            .try_into()
    }

    pub fn mark_invoice_paid(&self, token: String, invoice_id: String) -> Result<FfiInvoice, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        InvoiceService::new(&db, &self.config).mark_paid(&actor, &invoice_id)?.try_into()
    }

    pub fn cancel_invoice(&self, token: String, invoice_id: String) -> Result<FfiInvoice, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        InvoiceService::new(&db, &self.config).cancel(&actor, &invoice_id)?.try_into()
    }

    /// Export invoice data as JSON.
    pub fn export_invoice_json(&self, token: String, invoice_id: String) -> Result<String, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        Ok(InvoiceService::new(&db, &self.config).export_json(&actor, &invoice_id)?)
    }

    /// Export invoice data as CSV.
    pub fn export_invoice_csv(&self, token: String, invoice_id: String) -> Result<String, OrthoticsError> {
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        Ok(InvoiceService::new(&db, &self.config).export_csv(&actor, &invoice_id)?)
    }

    /// Render the printable invoice through the registered renderer.
    pub fn export_invoice_pdf(&self, token: String, invoice_id: String) -> Result<FfiFile, OrthoticsError> {
        let renderer = self.renderer.lock()?.clone();
        let db = self.db.lock()?;
        let actor = self.actor(&db, &token)?;
        let (content, filename) =
            InvoiceService::new(&db, &self.config).export_pdf(&actor, &invoice_id, renderer.as_deref())?;
        Ok(FfiFile { filename, content })
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe user.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiUser {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub role: String,
    pub clinic_id: Option<String>,
    pub is_staff: bool,
}

impl From<User> for FfiUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            phone: user.phone,
            role: user.role.to_string(),
            clinic_id: user.clinic_id,
            is_staff: user.is_staff,
        }
    }
}

/// FFI-safe clinic.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiClinic {
    pub id: String,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub logo_url: Option<String>,
}

impl From<Clinic> for FfiClinic {
    fn from(clinic: Clinic) -> Self {
        Self {
            id: clinic.id,
            name: clinic.name,
            address: clinic.address,
            phone: clinic.phone,
            email: clinic.email,
            logo_url: clinic.logo_url,
        }
    }
}

/// FFI-safe session: the signed-in user and their token pair.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSession {
    pub user: FfiUser,
    pub clinic: Option<FfiClinic>,
    pub access_token: String,
    pub refresh_token: String,
}

impl From<Session> for FfiSession {
    fn from(session: Session) -> Self {
        Self {
            user: session.user.into(),
            clinic: session.clinic.map(Into::into),
            access_token: session.tokens.access,
            refresh_token: session.tokens.refresh,
        }
    }
}

/// FFI-safe registration form.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiRegistration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub phone: String,
    pub clinic_name: String,
    pub clinic_address: String,
    pub clinic_phone: String,
    pub clinic_email: String,
}

impl From<FfiRegistration> for RegistrationRequest {
    fn from(form: FfiRegistration) -> Self {
        RegistrationRequest {
            name: form.name,
            email: form.email,
            password: form.password,
            password_confirm: form.password_confirm,
            phone: form.phone,
            clinic_name: form.clinic_name,
            clinic_address: form.clinic_address,
            clinic_phone: form.clinic_phone,
            clinic_email: form.clinic_email,
        }
    }
}

/// FFI-safe template.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub is_active: bool,
}

impl From<Template> for FfiTemplate {
    fn from(template: Template) -> Self {
        Self {
            id: template.id,
            name: template.name,
            description: template.description,
            is_active: template.is_active,
        }
    }
}

/// FFI-safe lookup option.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLookupOption {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub description: String,
    pub color: Option<String>,
    pub sort_order: i64,
    pub is_active: bool,
}

impl From<LookupOption> for FfiLookupOption {
    fn from(option: LookupOption) -> Self {
        Self {
            id: option.id,
            kind: option.kind.to_string(),
            name: option.name,
            description: option.description,
            color: option.color,
            sort_order: option.sort_order,
            is_active: option.is_active,
        }
    }
}

/// FFI-safe patient.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub id: String,
    pub external_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub gender: String,
    pub weight: Option<f64>,
    pub clinic_id: String,
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        Self {
            id: patient.id,
            external_id: patient.external_id,
            first_name: patient.first_name,
            last_name: patient.last_name,
            date_of_birth: patient.date_of_birth,
            gender: patient.gender.to_string(),
            weight: patient.weight,
            clinic_id: patient.clinic_id,
        }
    }
}

/// FFI-safe new patient form.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewPatient {
    pub external_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub gender: String,
    pub weight: Option<f64>,
    pub template_id: Option<String>,
}

impl TryFrom<FfiNewPatient> for NewPatient {
    type Error = OrthoticsError;

    fn try_from(form: FfiNewPatient) -> Result<Self, Self::Error> {
        Ok(NewPatient {
            external_id: form.external_id,
            first_name: form.first_name,
            last_name: form.last_name,
            date_of_birth: form.date_of_birth,
            gender: parse_kind("gender", &form.gender, Gender::parse)?,
            weight: form.weight,
            template_id: form.template_id,
        })
    }
}

/// A new patient and the prescription opened for them.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCreatedPatient {
    pub patient: FfiPatient,
    pub prescription_id: String,
}

/// FFI-safe prescription list row.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrescriptionSummary {
    pub id: String,
    pub patient_id: String,
    pub patient_name: String,
    pub clinician_name: String,
    pub template_name: String,
    pub status_name: Option<String>,
    pub turnaround: String,
    pub created_at: String,
}

impl From<PrescriptionSummary> for FfiPrescriptionSummary {
    fn from(row: PrescriptionSummary) -> Self {
        Self {
            id: row.id,
            patient_id: row.patient_id,
            patient_name: row.patient_name,
            clinician_name: row.clinician_name,
            template_name: row.template_name,
            status_name: row.status_name,
            turnaround: row.turnaround.to_string(),
            created_at: row.created_at,
        }
    }
}

/// FFI-safe detail record; the record itself travels as JSON.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDetail {
    pub kind: String,
    pub created: bool,
    pub payload_json: String,
}

impl TryFrom<DetailResponse> for FfiDetail {
    type Error = OrthoticsError;

    fn try_from(detail: DetailResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: detail.kind.to_string(),
            created: detail.created,
            payload_json: to_json(&detail.record)?,
        })
    }
}

/// FFI-safe uploaded file, or a generated document.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiFile {
    pub filename: String,
    pub content: Vec<u8>,
}

impl From<FfiFile> for UploadedFile {
    fn from(file: FfiFile) -> Self {
        UploadedFile::new(file.filename, file.content)
    }
}

/// FFI-safe scan.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiScan {
    pub id: String,
    pub prescription_id: String,
    pub left_foot: Option<String>,
    pub right_foot: Option<String>,
    pub left_foot_size: Option<i64>,
    pub right_foot_size: Option<i64>,
    pub created_at: String,
}

impl From<Scan> for FfiScan {
    fn from(scan: Scan) -> Self {
        Self {
            id: scan.id,
            prescription_id: scan.prescription_id,
            left_foot: scan.left_foot,
            right_foot: scan.right_foot,
            left_foot_size: scan.left_foot_size,
            right_foot_size: scan.right_foot_size,
            created_at: scan.created_at,
        }
    }
}

/// FFI-safe attachment.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAttachment {
    pub id: String,
    pub prescription_id: String,
    pub file_path: String,
    pub filename: String,
    pub size_bytes: i64,
    pub uploaded_at: String,
}

impl From<Attachment> for FfiAttachment {
    fn from(attachment: Attachment) -> Self {
        Self {
            id: attachment.id,
            prescription_id: attachment.prescription_id,
            file_path: attachment.file_path,
            filename: attachment.filename,
            size_bytes: attachment.size_bytes,
            uploaded_at: attachment.uploaded_at,
        }
    }
}

/// FFI-safe order. Amounts are decimal strings; `payload_json` carries the
/// order with its lines.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiOrder {
    pub id: String,
    pub status: String,
    pub notes: String,
    pub prescriptions_count: u32,
    pub total_amount: String,
    pub created_at: String,
    pub payload_json: String,
}

impl TryFrom<OrderView> for FfiOrder {
    type Error = OrthoticsError;

    fn try_from(view: OrderView) -> Result<Self, Self::Error> {
        Ok(Self {
            payload_json: to_json(&view)?,
            id: view.order.id,
            status: view.order.status.to_string(),
            notes: view.order.notes,
            prescriptions_count: view.prescriptions_count as u32,
            total_amount: view.total_amount.to_string(),
            created_at: view.order.created_at,
        })
    }
}

/// FFI-safe invoice with its computed totals. `payload_json` carries the
/// invoice with its items.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiInvoice {
    pub id: String,
    pub order_id: String,
    pub invoice_number: String,
    pub status: String,
    pub due_date: String,
    pub subtotal: String,
    pub shipping: String,
    pub tax: String,
    pub total: String,
    pub payload_json: String,
}

impl TryFrom<InvoiceView> for FfiInvoice {
    type Error = OrthoticsError;

    fn try_from(view: InvoiceView) -> Result<Self, Self::Error> {
        Ok(Self {
            payload_json: to_json(&view)?,
            subtotal: view.totals.subtotal.to_string(),
            shipping: view.totals.shipping.to_string(),
            tax: view.totals.tax.to_string(),
            total: view.totals.total.to_string(),
            id: view.invoice.id,
            order_id: view.invoice.order_id,
            invoice_number: view.invoice.invoice_number,
            status: view.invoice.status.to_string(),
            due_date: view.invoice.due_date,
        })
    }
}
