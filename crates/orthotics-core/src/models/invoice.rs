//! Invoices and their computed totals.
//!
//! No monetary total is ever stored: totals are recomputed from the line
//! items on every read with exact decimal arithmetic. Rounding happens only
//! at the tax and total steps, half-to-even to cents.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::choices::choice_enum;

/// Largest unit price an invoice line may carry (10 digits, 2 decimals).
pub const MAX_ITEM_PRICE: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, 2);
/// Largest quantity an invoice line may carry.
pub const MAX_ITEM_QUANTITY: i64 = i32::MAX as i64;
/// Longest payment term, in days.
pub const MAX_DUE_DAYS: i64 = 3650;

choice_enum! {
    InvoiceStatus {
        Pending => "pending",
        Paid => "paid",
        Cancelled => "cancelled",
    }
    default Pending
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invoice {
    pub id: String,
    pub user_id: String,
    pub order_id: String,
    /// `INV-<unix millis>`, unique
    pub invoice_number: String,
    pub status: InvoiceStatus,
    /// ISO 8601 date
    pub due_date: String,
    pub notes: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Invoice {
    pub fn new(user_id: String, order_id: String, due_in_days: i64) -> Self {
        let now = chrono::Utc::now();
        let due = now + chrono::Duration::days(due_in_days.clamp(0, MAX_DUE_DAYS));
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            order_id,
            invoice_number: format!("INV-{}", now.timestamp_millis()),
            status: InvoiceStatus::Pending,
            due_date: due.date_naive().to_string(),
            notes: String::new(),
            created_at: now.to_rfc3339(),
            updated_at: now.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceItem {
    pub id: String,
    pub invoice_id: String,
    pub description: String,
    /// Unit price, never negative
    pub price: Decimal,
    /// At least 1
    pub quantity: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl InvoiceItem {
    pub fn new(invoice_id: String, description: String, price: Decimal, quantity: i64) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            invoice_id,
            description,
            price,
            quantity,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Price times quantity, or `None` on overflow.
    pub fn line_total(&self) -> Option<Decimal> {
        self.price.checked_mul(Decimal::from(self.quantity))
    }
}

/// Computed invoice amounts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl InvoiceTotals {
    /// Totals of `items`, or `None` if any step overflows.
    pub fn compute(items: &[InvoiceItem], shipping: Decimal, tax_rate: Decimal) -> Option<Self> {
        let mut subtotal = Decimal::ZERO;
        for item in items {
            subtotal = subtotal.checked_add(item.line_total()?)?;
        }
        let subtotal = at_least_cents(subtotal);
        let tax = cents(subtotal.checked_mul(tax_rate)?);
        let total = cents(subtotal.checked_add(shipping)?.checked_add(tax)?);
        Some(Self {
            subtotal,
            shipping: at_least_cents(shipping),
            tax,
            total,
        })
    }
}

/// Round half-to-even to cents and always carry two decimal places.
pub fn cents(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp(2);
    rounded.rescale(2);
    rounded
}

/// Pad to two decimal places without dropping any finer digits.
fn at_least_cents(mut value: Decimal) -> Decimal {
    if value.scale() < 2 {
        value.rescale(2);
    }
    value
}

/// An invoice with its items and computed totals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceView {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
    #[serde(flatten)]
    pub totals: InvoiceTotals,
}
