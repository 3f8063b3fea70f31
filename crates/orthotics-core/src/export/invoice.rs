//! Invoice export: JSON, CSV and the print context for PDF rendering.

use serde::{Deserialize, Serialize};

use super::render::{DocumentRenderer, RenderError, INVOICE_TEMPLATE};
use crate::models::{Clinic, InvoiceView, User};

/// Who an invoice is billed to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BilledTo {
    pub name: String,
    pub email: String,
    pub clinic_name: Option<String>,
    pub clinic_address: Option<String>,
    pub clinic_phone: Option<String>,
}

impl BilledTo {
    pub fn new(user: &User, clinic: Option<&Clinic>) -> Self {
        Self {
            name: user.full_name(),
            email: user.email.clone(),
            clinic_name: clinic.map(|c| c.name.clone()),
            clinic_address: clinic.map(|c| c.address.clone()),
            clinic_phone: clinic.map(|c| c.phone.clone()),
        }
    }
}

/// Everything printed on an invoice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceDocument {
    pub invoice: InvoiceView,
    pub billed_to: BilledTo,
    /// Long-form print date, e.g. `March 04, 2025`
    pub date: String,
    pub exported_at: String,
}

impl InvoiceDocument {
    pub fn new(invoice: InvoiceView, billed_to: BilledTo) -> Self {
        let now = chrono::Utc::now();
        Self {
            invoice,
            billed_to,
            date: now.format("%B %d, %Y").to_string(),
            exported_at: now.to_rfc3339(),
        }
    }

    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export line items to CSV, followed by the total rows.
    pub fn to_csv(&self) -> String {
        let invoice = &self.invoice.invoice;
        let totals = &self.invoice.totals;
        let mut csv = String::new();

        csv.push_str("invoice_number,status,due_date,description,price,quantity,line_total\n");

        for item in &self.invoice.items {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                escape_csv(&invoice.invoice_number),
                invoice.status,
                invoice.due_date,
                escape_csv(&item.description),
                item.price,
                item.quantity,
                item.line_total().map(crate::models::cents).unwrap_or_default(),
            ));
        }

        for (label, amount) in [
            ("Subtotal", totals.subtotal),
            ("Shipping", totals.shipping),
            ("Tax", totals.tax),
            ("Total", totals.total),
        ] {
            csv.push_str(&format!(
                "{},{},{},{},,,{}\n",
                escape_csv(&invoice.invoice_number),
                invoice.status,
                invoice.due_date,
                label,
                amount,
            ));
        }

        csv
    }

    /// Context handed to the renderer: the document plus `is_pdf`.
    pub fn print_context(&self) -> Result<String, serde_json::Error> {
        let mut context = serde_json::to_value(self)?;
        if let Some(object) = context.as_object_mut() {
            object.insert("is_pdf".to_string(), serde_json::Value::Bool(true));
        }
        serde_json::to_string(&context)
    }

    /// Render the printable invoice through `renderer`.
    pub fn render_pdf(&self, renderer: &dyn DocumentRenderer) -> Result<Vec<u8>, RenderError> {
        let context = self
            .print_context()
            .map_err(|e| RenderError::Failed(e.to_string()))?;
        renderer.render(INVOICE_TEMPLATE.to_string(), context)
    }

    /// Suggested download file name.
    pub fn pdf_filename(&self) -> String {
        format!("invoice_{}.pdf", self.invoice.invoice.id)
    }
}

/// Escape a string for CSV output.
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Invoice, InvoiceItem, InvoiceTotals};
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    fn make_document() -> InvoiceDocument {
        let invoice = Invoice::new("user-1".into(), "order-1".into(), 30);
        let items = vec![
            InvoiceItem::new(invoice.id.clone(), "Custom orthotic, pair".into(), Decimal::new(1250, 2), 2),
            InvoiceItem::new(invoice.id.clone(), "Top cover".into(), Decimal::new(500, 2), 1),
        ];
        let totals = InvoiceTotals::compute(&items, Decimal::new(1000, 2), Decimal::new(9, 2)).unwrap();

        let mut user = User::new("ada@example.com".into(), "Ada".into(), "Lovelace".into());
        let clinic = Clinic::new("Stride".into());
        user.clinic_id = Some(clinic.id.clone());

        InvoiceDocument::new(
            InvoiceView { invoice, items, totals },
            BilledTo::new(&user, Some(&clinic)),
        )
    }

    struct RecordingRenderer {
        calls: Mutex<Vec<(String, String)>>,
    }

    impl DocumentRenderer for RecordingRenderer {
        fn render(&self, template: String, context_json: String) -> Result<Vec<u8>, RenderError> {
            self.calls.lock().unwrap().push((template, context_json));
            Ok(b"%PDF-1.7".to_vec())
        }
    }

    #[test]
    fn test_json_export() {
        let json = make_document().to_json().unwrap();
        assert!(json.contains("\"total\": \"42.70\""));
        assert!(json.contains("Stride"));
    }

    #[test]
    fn test_csv_export() {
        let csv = make_document().to_csv();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 7); // Header + 2 items + 4 totals
        assert!(lines[0].starts_with("invoice_number"));
        assert!(lines[1].contains("\"Custom orthotic, pair\",12.50,2,25.00"));
        assert!(lines[6].contains("Total,,,42.70"));
    }

    #[test]
    fn test_csv_escaping() {
        assert_eq!(escape_csv("simple"), "simple");
        assert_eq!(escape_csv("with,comma"), "\"with,comma\"");
        assert_eq!(escape_csv("with\"quote"), "\"with\"\"quote\"");
    }

    #[test]
    fn test_render_pdf_passes_context() {
        let document = make_document();
        let renderer = RecordingRenderer {
            calls: Mutex::new(Vec::new()),
        };

        let bytes = document.render_pdf(&renderer).unwrap();
        assert_eq!(bytes, b"%PDF-1.7");

        let calls = renderer.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, INVOICE_TEMPLATE);
        let context: serde_json::Value = serde_json::from_str(&calls[0].1).unwrap();
        assert_eq!(context["is_pdf"], true);
        assert_eq!(context["billed_to"]["clinic_name"], "Stride");
    }
}
