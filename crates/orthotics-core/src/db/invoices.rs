//! Invoice and invoice item database operations.

use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::{now, parse_decimal, Database, DbError, DbResult, WhereClause};
use crate::access::{Aggregate, TenantScope};
use crate::models::{Invoice, InvoiceItem, InvoiceStatus};

const INVOICE_COLUMNS: &str = r#"
    invoices.id, invoices.user_id, invoices.order_id, invoices.invoice_number,
    invoices.status, invoices.due_date, invoices.notes,
    invoices.created_at, invoices.updated_at
"#;

impl Database {
    /// Insert a new invoice.
    pub fn insert_invoice(&self, invoice: &Invoice) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO invoices (
                id, user_id, order_id, invoice_number, status, due_date, notes,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                invoice.id,
                invoice.user_id,
                invoice.order_id,
                invoice.invoice_number,
                invoice.status.as_str(),
                invoice.due_date,
                invoice.notes,
                invoice.created_at,
                invoice.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get an invoice by ID, regardless of scope.
    pub fn get_invoice(&self, id: &str) -> DbResult<Option<Invoice>> {
        self.conn
            .query_row(
                &format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE invoices.id = ?"),
                [id],
                invoice_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Whether an invoice number is already taken.
    pub fn invoice_number_exists(&self, invoice_number: &str) -> DbResult<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM invoices WHERE invoice_number = ?)",
            [invoice_number],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Invoices visible within `scope`, newest first.
    pub fn list_invoices(&self, scope: &TenantScope) -> DbResult<Vec<Invoice>> {
        let Some(filter) = WhereClause::scoped(scope, Aggregate::Invoice) else {
            return Ok(Vec::new());
        };

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices{} \
             ORDER BY invoices.created_at DESC, invoices.invoice_number DESC",
            filter.sql()
        ))?;

        let rows = stmt.query_map(params_from_iter(filter.params()), invoice_row)?;

        let mut invoices = Vec::new();
        for row in rows {
            invoices.push(row?.try_into()?);
        }
        Ok(invoices)
    }

    /// Set an invoice's status.
    pub fn update_invoice_status(&self, id: &str, status: InvoiceStatus) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE invoices SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), now()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Insert a line item. Prices are stored as decimal text.
    pub fn insert_invoice_item(&self, item: &InvoiceItem) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO invoice_items (
                id, invoice_id, description, price, quantity, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                item.id,
                item.invoice_id,
                item.description,
                item.price.to_string(),
                item.quantity,
                item.created_at,
                item.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Line items of an invoice in insertion order.
    pub fn list_invoice_items(&self, invoice_id: &str) -> DbResult<Vec<InvoiceItem>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, invoice_id, description, price, quantity, created_at, updated_at
            FROM invoice_items
            WHERE invoice_id = ?
            ORDER BY created_at, rowid
            "#,
        )?;

        let rows = stmt.query_map([invoice_id], |row| {
            Ok(ItemRow {
                id: row.get(0)?,
                invoice_id: row.get(1)?,
                description: row.get(2)?,
                price: row.get(3)?,
                quantity: row.get(4)?,
                created_at: row.get(5)?,
                updated_at: row.get(6)?,
            })
        })?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?.try_into()?);
        }
        Ok(items)
    }
}

fn invoice_row(row: &Row<'_>) -> rusqlite::Result<InvoiceRow> {
    Ok(InvoiceRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        order_id: row.get(2)?,
        invoice_number: row.get(3)?,
        status: row.get(4)?,
        due_date: row.get(5)?,
        notes: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Internal row representation for invoices.
struct InvoiceRow {
    id: String,
    user_id: String,
    order_id: String,
    invoice_number: String,
    status: String,
    due_date: String,
    notes: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = DbError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        let status = InvoiceStatus::parse(&row.status).ok_or_else(|| {
            DbError::Constraint(format!("Invalid invoice status: {}", row.status))
        })?;

        Ok(Invoice {
            id: row.id,
            user_id: row.user_id,
            order_id: row.order_id,
            invoice_number: row.invoice_number,
            status,
            due_date: row.due_date,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Internal row representation for invoice items.
struct ItemRow {
    id: String,
    invoice_id: String,
    description: String,
    price: String,
    quantity: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ItemRow> for InvoiceItem {
    type Error = DbError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        Ok(InvoiceItem {
            id: row.id,
            invoice_id: row.invoice_id,
            description: row.description,
            price: parse_decimal(&row.price)?,
            quantity: row.quantity,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Clinic, InvoiceTotals, Order, Patient, Prescription, Template, User};
    use rust_decimal::Decimal;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    /// An order in a fresh clinic holding one prescription.
    fn order_in_clinic(db: &Database, name: &str) -> (Clinic, User, Order) {
        let clinic = Clinic::new(name.into());
        db.insert_clinic(&clinic).unwrap();
        let mut user = User::new(format!("{name}@example.com"), name.into(), String::new());
        user.clinic_id = Some(clinic.id.clone());
        db.insert_user(&user).unwrap();
        let template = Template::new("T".into(), String::new());
        db.insert_template(&template).unwrap();
        let patient = Patient::new("P".into(), "Q".into(), "1970-01-01".into(), clinic.id.clone());
        db.insert_patient(&patient).unwrap();
        let rx = Prescription::new(patient.id, user.id.clone(), template.id);
        db.insert_prescription(&rx).unwrap();

        let order = Order::new(user.id.clone(), String::new());
        db.insert_order(&order).unwrap();
        db.link_prescription(&order.id, &rx.id).unwrap();
        (clinic, user, order)
    }

    #[test]
    fn test_insert_and_get_invoice() {
        let db = setup_db();
        let (_, user, order) = order_in_clinic(&db, "a");

        let invoice = Invoice::new(user.id.clone(), order.id.clone(), 30);
        db.insert_invoice(&invoice).unwrap();

        assert_eq!(db.get_invoice(&invoice.id).unwrap().unwrap(), invoice);
        assert!(db.invoice_number_exists(&invoice.invoice_number).unwrap());
        assert!(!db.invoice_number_exists("INV-0").unwrap());
    }

    #[test]
    fn test_items_keep_exact_prices() {
        let db = setup_db();
        let (_, user, order) = order_in_clinic(&db, "a");
        let invoice = Invoice::new(user.id, order.id, 30);
        db.insert_invoice(&invoice).unwrap();

        for (price, qty) in [(Decimal::new(1250, 2), 2), (Decimal::new(500, 2), 1)] {
            let item = InvoiceItem::new(invoice.id.clone(), "Orthotic".into(), price, qty);
            db.insert_invoice_item(&item).unwrap();
        }

        let items = db.list_invoice_items(&invoice.id).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].price.to_string(), "12.50");

        let totals = InvoiceTotals::compute(&items, Decimal::new(1000, 2), Decimal::new(9, 2)).unwrap();
        assert_eq!(totals.total.to_string(), "42.70");
    }

    #[test]
    fn test_list_invoices_is_scoped() {
        let db = setup_db();
        let (clinic_a, user_a, order_a) = order_in_clinic(&db, "a");
        let (_, user_b, order_b) = order_in_clinic(&db, "b");

        let invoice_a = Invoice::new(user_a.id, order_a.id, 30);
        db.insert_invoice(&invoice_a).unwrap();
        let mut invoice_b = Invoice::new(user_b.id, order_b.id, 30);
        invoice_b.invoice_number = format!("{}-b", invoice_b.invoice_number);
        db.insert_invoice(&invoice_b).unwrap();

        let in_a = db.list_invoices(&TenantScope::Clinic(clinic_a.id)).unwrap();
        assert_eq!(in_a.len(), 1);
        assert_eq!(in_a[0].id, invoice_a.id);
        assert_eq!(db.list_invoices(&TenantScope::All).unwrap().len(), 2);
        assert!(db.list_invoices(&TenantScope::Nothing).unwrap().is_empty());
    }

    #[test]
    fn test_update_invoice_status() {
        let db = setup_db();
        let (_, user, order) = order_in_clinic(&db, "a");
        let invoice = Invoice::new(user.id, order.id, 30);
        db.insert_invoice(&invoice).unwrap();

        assert!(db.update_invoice_status(&invoice.id, InvoiceStatus::Paid).unwrap());
        assert_eq!(
            db.get_invoice(&invoice.id).unwrap().unwrap().status,
            InvoiceStatus::Paid
        );
    }
}
