//! Document rendering collaborator.
//!
//! PDF generation lives outside the crate. A host registers a
//! [`DocumentRenderer`] (implemented in Rust or through the foreign bindings)
//! and the crate hands it a template name plus a JSON print context.

/// Template used for printable invoices.
pub const INVOICE_TEMPLATE: &str = "invoice_print.html";

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum RenderError {
    #[error("Rendering failed: {0}")]
    Failed(String),

    #[error("Renderer callback failed: {0}")]
    Callback(String),
}

impl From<uniffi::UnexpectedUniFFICallbackError> for RenderError {
    fn from(e: uniffi::UnexpectedUniFFICallbackError) -> Self {
        RenderError::Callback(e.reason)
    }
}

/// Turns a named template and its context into document bytes.
#[uniffi::export(with_foreign)]
pub trait DocumentRenderer: Send + Sync {
    fn render(&self, template: String, context_json: String) -> Result<Vec<u8>, RenderError>;
}
