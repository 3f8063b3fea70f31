//! Invoices generated from orders, and their exports.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{ensure_visible, required};
use crate::access::{Aggregate, TenantScope};
use crate::config::CoreConfig;
use crate::db::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::export::{BilledTo, DocumentRenderer, InvoiceDocument};
use crate::models::{
    Invoice, InvoiceItem, InvoiceStatus, InvoiceTotals, InvoiceView, OrderStatus, User,
    MAX_ITEM_PRICE, MAX_ITEM_QUANTITY,
};
use crate::validation::FieldErrors;

/// A line added to an invoice by hand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewInvoiceItem {
    pub description: String,
    pub price: Decimal,
    pub quantity: i64,
}

pub struct InvoiceService<'a> {
    db: &'a Database,
    config: &'a CoreConfig,
}

impl<'a> InvoiceService<'a> {
    pub fn new(db: &'a Database, config: &'a CoreConfig) -> Self {
        Self { db, config }
    }

    fn totals(&self, invoice_id: &str, items: &[InvoiceItem]) -> ServiceResult<InvoiceTotals> {
        InvoiceTotals::compute(items, self.config.shipping_fee, self.config.tax_rate).ok_or_else(|| {
            log::error!("Totals of invoice {} overflowed", invoice_id);
            ServiceError::Internal
        })
    }

    fn view(&self, invoice: Invoice) -> ServiceResult<InvoiceView> {
        let items = self.db.list_invoice_items(&invoice.id)?;
        let totals = self.totals(&invoice.id, &items)?;
        Ok(InvoiceView {
            invoice,
            items,
            totals,
        })
    }

    fn find(&self, actor: &User, id: &str) -> ServiceResult<Invoice> {
        ensure_visible(self.db, actor, Aggregate::Invoice, id)?;
        self.db
            .get_invoice(id)?
            .ok_or_else(|| ServiceError::not_found(format!("Invoice {}", id)))
    }

    /// Invoice an order: one line per prescription at the configured price.
    pub fn generate(&self, actor: &User, order_id: &str) -> ServiceResult<InvoiceView> {
        ensure_visible(self.db, actor, Aggregate::Order, order_id)?;
        let order = self
            .db
            .get_order(order_id)?
            .ok_or_else(|| ServiceError::not_found(format!("Order {}", order_id)))?;
        if order.status == OrderStatus::Cancelled {
            return Err(ServiceError::Conflict(
                "Cannot invoice a cancelled order.".to_string(),
            ));
        }

        let invoice = self.db.atomic(|db| -> ServiceResult<Invoice> {
            let mut invoice = Invoice::new(order.user_id.clone(), order.id.clone(), self.config.invoice_due_days);
            while db.invoice_number_exists(&invoice.invoice_number)? {
                invoice.invoice_number = next_number(&invoice.invoice_number);
            }
            db.insert_invoice(&invoice)?;

            for (_, patient_name) in db.order_lines(&order.id)? {
                let item = InvoiceItem::new(
                    invoice.id.clone(),
                    format!("Orthotic prescription for {}", patient_name),
                    self.config.prescription_price,
                    1,
                );
                db.insert_invoice_item(&item)?;
            }
            Ok(invoice)
        })?;

        log::info!(
            "Generated invoice {} ({}) for order {}",
            invoice.invoice_number,
            invoice.id,
            order.id
        );
        self.view(invoice)
    }

    pub fn list(&self, actor: &User) -> ServiceResult<Vec<InvoiceView>> {
        self.db
            .list_invoices(&TenantScope::for_actor(actor))?
            .into_iter()
            .map(|invoice| self.view(invoice))
            .collect()
    }

    pub fn get(&self, actor: &User, id: &str) -> ServiceResult<InvoiceView> {
        let invoice = self.find(actor, id)?;
        self.view(invoice)
    }

    pub fn items(&self, actor: &User, id: &str) -> ServiceResult<Vec<InvoiceItem>> {
        ensure_visible(self.db, actor, Aggregate::Invoice, id)?;
        Ok(self.db.list_invoice_items(id)?)
    }

    /// Add a line to a pending invoice.
    pub fn add_item(&self, actor: &User, id: &str, input: NewInvoiceItem) -> ServiceResult<InvoiceView> {
        let invoice = self.find(actor, id)?;

        let mut errors = FieldErrors::new();
        let description = match required("description", &input.description) {
            Ok(description) => description,
            Err(_) => {
                errors.add("description", "This field is required.");
                String::new()
            }
        };
        if input.price.is_sign_negative() {
            errors.add("price", "Ensure this value is greater than or equal to 0.");
        }
        if input.price.normalize().scale() > 2 {
            errors.add("price", "Ensure that there are no more than 2 decimal places.");
        }
        if input.price > MAX_ITEM_PRICE {
            errors.add("price", "Ensure that there are no more than 10 digits in total.");
        }
        if input.quantity < 1 {
            errors.add("quantity", "Ensure this value is greater than or equal to 1.");
        }
        if input.quantity > MAX_ITEM_QUANTITY {
            errors.add(
                "quantity",
                format!("Ensure this value is less than or equal to {}.", MAX_ITEM_QUANTITY),
            );
        }
        errors.into_result()?;

        if invoice.status != InvoiceStatus::Pending {
            return Err(ServiceError::Conflict(
                "Only pending invoices can be changed.".to_string(),
            ));
        }

        let item = InvoiceItem::new(invoice.id.clone(), description, input.price, input.quantity);
        let mut items = self.db.list_invoice_items(&invoice.id)?;
        items.push(item);
        self.totals(&invoice.id, &items)?;

        if let Some(item) = items.last() {
            self.db.insert_invoice_item(item)?;
        }
        self.view(invoice)
    }

    pub fn mark_paid(&self, actor: &User, id: &str) -> ServiceResult<InvoiceView> {
        self.transition(actor, id, InvoiceStatus::Paid)
    }

    pub fn cancel(&self, actor: &User, id: &str) -> ServiceResult<InvoiceView> {
        self.transition(actor, id, InvoiceStatus::Cancelled)
    }

    /// Pending is the only status an invoice leaves.
    fn transition(&self, actor: &User, id: &str, to: InvoiceStatus) -> ServiceResult<InvoiceView> {
        let invoice = self.find(actor, id)?;
        if invoice.status != InvoiceStatus::Pending {
            log::warn!("Refused to move invoice {} from {} to {}", invoice.id, invoice.status, to);
            return Err(ServiceError::Conflict(format!(
                "Invoice is already {}.",
                invoice.status
            )));
        }

        self.db.update_invoice_status(&invoice.id, to)?;
        log::info!("Invoice {} is now {}", invoice.invoice_number, to);
        self.get(actor, id)
    }

    /// Everything an exported invoice shows.
    pub fn document(&self, actor: &User, id: &str) -> ServiceResult<InvoiceDocument> {
        let view = self.get(actor, id)?;
        let billed_user = self
            .db
            .get_user(&view.invoice.user_id)?
            .ok_or_else(|| ServiceError::not_found(format!("User {}", view.invoice.user_id)))?;
        let clinic = match &billed_user.clinic_id {
            Some(clinic_id) => self.db.get_clinic(clinic_id)?,
            None => None,
        };
        Ok(InvoiceDocument::new(view, BilledTo::new(&billed_user, clinic.as_ref())))
    }

    pub fn export_json(&self, actor: &User, id: &str) -> ServiceResult<String> {
        self.document(actor, id)?.to_json().map_err(|e| {
            log::error!("Failed to serialize invoice {}: {}", id, e);
            ServiceError::Internal
        })
    }

    pub fn export_csv(&self, actor: &User, id: &str) -> ServiceResult<String> {
        Ok(self.document(actor, id)?.to_csv())
    }

    /// PDF bytes and file name.
    pub fn export_pdf(
        &self,
        actor: &User,
        id: &str,
        renderer: Option<&dyn DocumentRenderer>,
    ) -> ServiceResult<(Vec<u8>, String)> {
        let document = self.document(actor, id)?;
        let Some(renderer) = renderer else {
            return Err(ServiceError::Unavailable(
                "PDF generation is not available.".to_string(),
            ));
        };
        let bytes = document.render_pdf(renderer)?;
        Ok((bytes, document.pdf_filename()))
    }
}

/// `INV-<millis>` with the millisecond part bumped by one.
fn next_number(number: &str) -> String {
    match number.strip_prefix("INV-").and_then(|n| n.parse::<i64>().ok()) {
        Some(millis) => format!("INV-{}", millis + 1),
        None => format!("{}-1", number),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::RenderError;
    use crate::models::{Clinic, Order, Patient, Prescription, Template};
    use std::str::FromStr;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn setup_order(db: &Database, patients: usize) -> (User, Order) {
        let clinic = Clinic::new("North".into());
        db.insert_clinic(&clinic).unwrap();
        let mut user = User::new("doc@example.com".into(), "Doc".into(), "Tor".into());
        user.clinic_id = Some(clinic.id.clone());
        db.insert_user(&user).unwrap();
        let template = Template::new("Default".into(), String::new());
        db.insert_template(&template).unwrap();

        let order = Order::new(user.id.clone(), String::new());
        db.insert_order(&order).unwrap();
        for i in 0..patients {
            let patient = Patient::new(format!("Pat{i}"), "Ient".into(), "1990-01-01".into(), clinic.id.clone());
            db.insert_patient(&patient).unwrap();
            let rx = Prescription::new(patient.id, user.id.clone(), template.id.clone());
            db.insert_prescription(&rx).unwrap();
            db.link_prescription(&order.id, &rx.id).unwrap();
        }
        (user, order)
    }

    struct FailingRenderer;

    impl DocumentRenderer for FailingRenderer {
        fn render(&self, _template: String, _context_json: String) -> Result<Vec<u8>, RenderError> {
            Err(RenderError::Failed("no fonts".into()))
        }
    }

    #[test]
    fn test_generate_from_order() {
        let db = setup_db();
        let config = CoreConfig::default();
        let invoices = InvoiceService::new(&db, &config);
        let (user, order) = setup_order(&db, 2);

        let view = invoices.generate(&user, &order.id).unwrap();
        assert!(view.invoice.invoice_number.starts_with("INV-"));
        assert_eq!(view.invoice.user_id, user.id);
        assert_eq!(view.items.len(), 2);
        assert!(view.items[0].description.starts_with("Orthotic prescription for Pat"));
        assert_eq!(view.totals.subtotal, Decimal::from_str("200.00").unwrap());
        assert_eq!(view.totals.tax, Decimal::from_str("18.00").unwrap());
        assert_eq!(view.totals.total, Decimal::from_str("228.00").unwrap());

        // A second invoice in the same millisecond still gets its own number
        let again = invoices.generate(&user, &order.id).unwrap();
        assert_ne!(again.invoice.invoice_number, view.invoice.invoice_number);
    }

    #[test]
    fn test_add_item_validation_and_status() {
        let db = setup_db();
        let config = CoreConfig::default();
        let invoices = InvoiceService::new(&db, &config);
        let (user, order) = setup_order(&db, 1);
        let id = invoices.generate(&user, &order.id).unwrap().invoice.id;

        let err = invoices
            .add_item(
                &user,
                &id,
                NewInvoiceItem {
                    description: String::new(),
                    price: Decimal::from_str("-1.005").unwrap(),
                    quantity: 0,
                },
            )
            .unwrap_err();
        match err {
            ServiceError::Validation(errors) => {
                assert!(errors.get("description").is_some());
                assert_eq!(errors.get("price").unwrap().len(), 2);
                assert!(errors.get("quantity").is_some());
            }
            other => panic!("unexpected {other:?}"),
        }

        let item = NewInvoiceItem {
            description: "Orthotic pair".into(),
            price: Decimal::from_str("19.99").unwrap(),
            quantity: 2,
        };
        let view = invoices.add_item(&user, &id, item.clone()).unwrap();
        assert_eq!(view.items.len(), 2);
        assert_eq!(view.totals.subtotal, Decimal::from_str("139.98").unwrap());
        assert_eq!(view.totals.tax, Decimal::from_str("12.60").unwrap());
        assert_eq!(view.totals.total, Decimal::from_str("162.58").unwrap());

        invoices.mark_paid(&user, &id).unwrap();
        assert!(matches!(invoices.add_item(&user, &id, item), Err(ServiceError::Conflict(_))));
        assert!(matches!(invoices.cancel(&user, &id), Err(ServiceError::Conflict(_))));
    }

    #[test]
    fn test_add_item_rejects_oversized_values() {
        let db = setup_db();
        let config = CoreConfig::default();
        let invoices = InvoiceService::new(&db, &config);
        let (user, order) = setup_order(&db, 1);
        let id = invoices.generate(&user, &order.id).unwrap().invoice.id;

        let err = invoices
            .add_item(
                &user,
                &id,
                NewInvoiceItem {
                    description: "Bulk".into(),
                    price: Decimal::from_str("99999999999.99").unwrap(),
                    quantity: i64::MAX,
                },
            )
            .unwrap_err();
        match err {
            ServiceError::Validation(errors) => {
                assert!(errors.get("price").is_some());
                assert!(errors.get("quantity").is_some());
            }
            other => panic!("unexpected {other:?}"),
        }

        // Largest accepted line still totals
        let view = invoices
            .add_item(
                &user,
                &id,
                NewInvoiceItem {
                    description: "Bulk".into(),
                    price: MAX_ITEM_PRICE,
                    quantity: MAX_ITEM_QUANTITY,
                },
            )
            .unwrap();
        assert_eq!(view.items.len(), 2);
        assert!(invoices.get(&user, &id).is_ok());
    }

    #[test]
    fn test_overflowing_totals_are_not_stored() {
        let db = setup_db();
        let config = CoreConfig::default();
        let invoices = InvoiceService::new(&db, &config);
        let (user, order) = setup_order(&db, 1);
        let id = invoices.generate(&user, &order.id).unwrap().invoice.id;
        db.insert_invoice_item(&InvoiceItem::new(id.clone(), "Legacy".into(), Decimal::MAX, 1))
            .unwrap();

        let item = NewInvoiceItem {
            description: "Extra".into(),
            price: MAX_ITEM_PRICE,
            quantity: MAX_ITEM_QUANTITY,
        };
        assert!(matches!(invoices.add_item(&user, &id, item), Err(ServiceError::Internal)));
        assert_eq!(db.list_invoice_items(&id).unwrap().len(), 2);
    }

    #[test]
    fn test_cancelled_order_not_invoiced() {
        let db = setup_db();
        let config = CoreConfig::default();
        let invoices = InvoiceService::new(&db, &config);
        let (user, order) = setup_order(&db, 1);
        db.update_order_status(&order.id, OrderStatus::Cancelled).unwrap();

        assert!(matches!(invoices.generate(&user, &order.id), Err(ServiceError::Conflict(_))));
    }

    #[test]
    fn test_exports() {
        let db = setup_db();
        let config = CoreConfig::default();
        let invoices = InvoiceService::new(&db, &config);
        let (user, order) = setup_order(&db, 1);
        let view = invoices.generate(&user, &order.id).unwrap();

        let csv = invoices.export_csv(&user, &view.invoice.id).unwrap();
        assert!(csv.contains(&view.invoice.invoice_number));
        assert!(csv.contains("Total,,,119.00"));

        let json: serde_json::Value =
            serde_json::from_str(&invoices.export_json(&user, &view.invoice.id).unwrap()).unwrap();
        assert_eq!(json["billed_to"]["clinic_name"], "North");

        assert!(matches!(
            invoices.export_pdf(&user, &view.invoice.id, None),
            Err(ServiceError::Unavailable(_))
        ));
        assert!(matches!(
            invoices.export_pdf(&user, &view.invoice.id, Some(&FailingRenderer)),
            Err(ServiceError::Internal)
        ));
    }

    #[test]
    fn test_next_number() {
        assert_eq!(next_number("INV-1700000000000"), "INV-1700000000001");
        assert_eq!(next_number("custom"), "custom-1");
    }
}
