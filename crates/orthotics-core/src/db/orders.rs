//! Order database operations.

use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::{now, Database, DbError, DbResult, WhereClause};
use crate::access::{Aggregate, TenantScope};
use crate::models::{Order, OrderStatus};

const ORDER_COLUMNS: &str =
    "orders.id, orders.user_id, orders.status, orders.notes, orders.created_at, orders.updated_at";

impl Database {
    /// Insert a new order. Prescriptions are linked separately.
    pub fn insert_order(&self, order: &Order) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO orders (id, user_id, status, notes, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                order.id,
                order.user_id,
                order.status.as_str(),
                order.notes,
                order.created_at,
                order.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Put a prescription on an order. Linking twice is a no-op.
    pub fn link_prescription(&self, order_id: &str, prescription_id: &str) -> DbResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO order_prescriptions (order_id, prescription_id) VALUES (?1, ?2)",
            params![order_id, prescription_id],
        )?;
        Ok(())
    }

    /// Get an order by ID, regardless of scope.
    pub fn get_order(&self, id: &str) -> DbResult<Option<Order>> {
        self.conn
            .query_row(
                &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE orders.id = ?"),
                [id],
                order_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Orders visible within `scope`, newest first.
    pub fn list_orders(&self, scope: &TenantScope) -> DbResult<Vec<Order>> {
        let Some(filter) = WhereClause::scoped(scope, Aggregate::Order) else {
            return Ok(Vec::new());
        };

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders{} ORDER BY orders.created_at DESC, orders.id",
            filter.sql()
        ))?;

        let rows = stmt.query_map(params_from_iter(filter.params()), order_row)?;

        let mut orders = Vec::new();
        for row in rows {
            orders.push(row?.try_into()?);
        }
        Ok(orders)
    }

    /// `(prescription id, patient name)` for every prescription on an order.
    pub fn order_lines(&self, order_id: &str) -> DbResult<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT rx.id, pa.first_name || ' ' || pa.last_name
            FROM order_prescriptions op
            JOIN prescriptions rx ON rx.id = op.prescription_id
            JOIN patients pa ON pa.id = rx.patient_id
            WHERE op.order_id = ?
            ORDER BY rx.created_at, rx.id
            "#,
        )?;

        let lines = stmt
            .query_map([order_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lines)
    }

    /// Set an order's status.
    pub fn update_order_status(&self, id: &str, status: OrderStatus) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE orders SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), now()],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn delete_order(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM orders WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    pub fn count_orders(&self) -> DbResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn order_row(row: &Row<'_>) -> rusqlite::Result<OrderRow> {
    Ok(OrderRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        status: row.get(2)?,
        notes: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// Internal row representation for orders.
struct OrderRow {
    id: String,
    user_id: String,
    status: String,
    notes: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<OrderRow> for Order {
    type Error = DbError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = OrderStatus::parse(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("Invalid order status: {}", row.status)))?;

        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            status,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
