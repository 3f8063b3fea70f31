//! Orders: prescriptions submitted together for manufacture.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::choices::choice_enum;

choice_enum! {
    OrderStatus {
        Pending => "pending",
        Processing => "processing",
        Shipped => "shipped",
        Delivered => "delivered",
        Cancelled => "cancelled",
    }
    default Pending
}

impl OrderStatus {
    /// Next step in the fulfilment pipeline, if any.
    pub fn next(&self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Pending => Some(OrderStatus::Processing),
            OrderStatus::Processing => Some(OrderStatus::Shipped),
            OrderStatus::Shipped => Some(OrderStatus::Delivered),
            OrderStatus::Delivered | OrderStatus::Cancelled => None,
        }
    }

    pub fn can_cancel(&self) -> bool {
        *self == OrderStatus::Pending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    /// Submitting user
    pub user_id: String,
    pub status: OrderStatus,
    pub notes: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Order {
    pub fn new(user_id: String, notes: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            status: OrderStatus::Pending,
            notes,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// One prescription on an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderLine {
    pub prescription_id: String,
    pub patient_name: String,
    pub price: Decimal,
}

/// An order with its lines and computed amount.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderLine>,
    pub prescriptions_count: usize,
    pub total_amount: Decimal,
}

impl OrderView {
    /// Price every line at `unit_price`; the total is never stored.
    pub fn new(order: Order, lines: Vec<(String, String)>, unit_price: Decimal) -> Self {
        let items: Vec<OrderLine> = lines
            .into_iter()
            .map(|(prescription_id, patient_name)| OrderLine {
                prescription_id,
                patient_name,
                price: unit_price,
            })
            .collect();
        let total_amount = items.iter().map(|line| line.price).sum::<Decimal>().round_dp(2);
        Self {
            order,
            prescriptions_count: items.len(),
            items,
            total_amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_pipeline() {
        assert_eq!(OrderStatus::Pending.next(), Some(OrderStatus::Processing));
        assert_eq!(OrderStatus::Shipped.next(), Some(OrderStatus::Delivered));
        assert_eq!(OrderStatus::Delivered.next(), None);
        assert_eq!(OrderStatus::Cancelled.next(), None);
    }

    #[test]
    fn test_only_pending_can_cancel() {
        assert!(OrderStatus::Pending.can_cancel());
        for status in [
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert!(!status.can_cancel());
        }
    }

    #[test]
    fn test_view_total() {
        let order = Order::new("u".into(), String::new());
        let view = OrderView::new(
            order,
            vec![("rx1".into(), "A B".into()), ("rx2".into(), "C D".into())],
            Decimal::new(10000, 2),
        );
        assert_eq!(view.prescriptions_count, 2);
        assert_eq!(view.total_amount, Decimal::new(20000, 2));
        assert_eq!(view.total_amount.to_string(), "200.00");
    }
}
