//! Orders of prescriptions for manufacture.

use serde::{Deserialize, Serialize};

use super::ensure_visible;
use crate::access::{Aggregate, TenantScope};
use crate::config::CoreConfig;
use crate::db::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{Order, OrderStatus, OrderView, User};

/// Input for submitting an order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewOrder {
    pub prescription_ids: Vec<String>,
    pub notes: String,
}

pub struct OrderService<'a> {
    db: &'a Database,
    config: &'a CoreConfig,
}

impl<'a> OrderService<'a> {
    pub fn new(db: &'a Database, config: &'a CoreConfig) -> Self {
        Self { db, config }
    }

    fn view(&self, order: Order) -> ServiceResult<OrderView> {
        let lines = self.db.order_lines(&order.id)?;
        Ok(OrderView::new(order, lines, self.config.prescription_price))
    }

    /// Submit visible prescriptions as one pending order.
    pub fn create(&self, actor: &User, input: NewOrder) -> ServiceResult<OrderView> {
        let mut ids: Vec<String> = Vec::new();
        for id in input.prescription_ids {
            let id = id.trim().to_string();
            if !id.is_empty() && !ids.contains(&id) {
                ids.push(id);
            }
        }
        if ids.is_empty() {
            return Err(ServiceError::validation(
                "prescription_ids",
                "No prescriptions provided for the order.",
            ));
        }

        let scope = TenantScope::for_actor(actor);
        let mut invalid = Vec::new();
        for id in &ids {
            if !self.db.is_visible(&scope, Aggregate::Prescription, id)? {
                invalid.push(id.as_str());
            }
        }
        if !invalid.is_empty() {
            log::warn!("User {} ordered unknown prescriptions {:?}", actor.id, invalid);
            return Err(ServiceError::validation(
                "prescription_ids",
                format!("Invalid prescription ids: {}", invalid.join(", ")),
            ));
        }

        let order = Order::new(actor.id.clone(), input.notes.trim().to_string());
        self.db.atomic(|db| -> ServiceResult<()> {
            db.insert_order(&order)?;
            for id in &ids {
                db.link_prescription(&order.id, id)?;
            }
            Ok(())
        })?;

        log::info!("Created order {} with {} prescriptions", order.id, ids.len());
        self.view(order)
    }

    pub fn list(&self, actor: &User) -> ServiceResult<Vec<OrderView>> {
        self.db
            .list_orders(&TenantScope::for_actor(actor))?
            .into_iter()
            .map(|order| self.view(order))
            .collect()
    }

    pub fn get(&self, actor: &User, id: &str) -> ServiceResult<OrderView> {
        let order = self.find(actor, id)?;
        self.view(order)
    }

    fn find(&self, actor: &User, id: &str) -> ServiceResult<Order> {
        ensure_visible(self.db, actor, Aggregate::Order, id)?;
        self.db
            .get_order(id)?
            .ok_or_else(|| ServiceError::not_found(format!("Order {}", id)))
    }

    /// Cancel a pending order.
    pub fn cancel(&self, actor: &User, id: &str) -> ServiceResult<OrderView> {
        let order = self.find(actor, id)?;
        if !order.status.can_cancel() {
            log::warn!("Refused to cancel order {} in status {}", order.id, order.status);
            return Err(ServiceError::Conflict(
                "Only pending orders can be cancelled.".to_string(),
            ));
        }

        self.db.update_order_status(&order.id, OrderStatus::Cancelled)?;
        log::info!("Cancelled order {}", order.id);
        self.get(actor, id)
    }

    /// Move an order one step along the fulfilment pipeline. Staff only.
    pub fn advance(&self, actor: &User, id: &str) -> ServiceResult<OrderView> {
        if !actor.is_privileged() {
            return Err(ServiceError::Forbidden(
                "Only staff can update order status".to_string(),
            ));
        }

        let order = self.find(actor, id)?;
        let next = order.status.next().ok_or_else(|| {
            ServiceError::Conflict(format!("Order in status {} cannot advance.", order.status))
        })?;

        self.db.update_order_status(&order.id, next)?;
        log::info!("Order {} moved from {} to {}", order.id, order.status, next);
        self.get(actor, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Clinic, Patient, Prescription, Template};
    use rust_decimal::Decimal;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn setup_clinic(db: &Database, name: &str) -> (User, Prescription) {
        let clinic = Clinic::new(name.into());
        db.insert_clinic(&clinic).unwrap();
        let mut user = User::new(format!("{name}@example.com"), "Doc".into(), name.into());
        user.clinic_id = Some(clinic.id.clone());
        db.insert_user(&user).unwrap();
        let patient = Patient::new("Pat".into(), name.into(), "1990-01-01".into(), clinic.id);
        db.insert_patient(&patient).unwrap();
        let template = Template::new(format!("{name} template"), String::new());
        db.insert_template(&template).unwrap();
        let rx = Prescription::new(patient.id, user.id.clone(), template.id);
        db.insert_prescription(&rx).unwrap();
        (user, rx)
    }

    #[test]
    fn test_create_order() {
        let db = setup_db();
        let config = CoreConfig::default();
        let orders = OrderService::new(&db, &config);
        let (user, rx) = setup_clinic(&db, "north");

        let view = orders
            .create(
                &user,
                NewOrder {
                    prescription_ids: vec![rx.id.clone(), rx.id.clone()],
                    notes: "  rush  ".into(),
                },
            )
            .unwrap();
        assert_eq!(view.order.status, OrderStatus::Pending);
        assert_eq!(view.order.notes, "rush");
        assert_eq!(view.prescriptions_count, 1);
        assert_eq!(view.items[0].patient_name, "Pat north");
        assert_eq!(view.total_amount, Decimal::new(10000, 2));
        assert_eq!(orders.list(&user).unwrap().len(), 1);
    }

    #[test]
    fn test_create_rejects_empty_and_foreign() {
        let db = setup_db();
        let config = CoreConfig::default();
        let orders = OrderService::new(&db, &config);
        let (north, _) = setup_clinic(&db, "north");
        let (_, south_rx) = setup_clinic(&db, "south");

        assert!(matches!(
            orders.create(&north, NewOrder::default()),
            Err(ServiceError::Validation(_))
        ));
        let err = orders
            .create(
                &north,
                NewOrder {
                    prescription_ids: vec![south_rx.id.clone()],
                    ..Default::default()
                },
            )
            .unwrap_err();
        match err {
            ServiceError::Validation(errors) => {
                let messages = errors.get("prescription_ids").unwrap();
                assert!(messages[0].contains(&south_rx.id));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(db.count_orders().unwrap(), 0);
    }

    #[test]
    fn test_cancel_only_pending() {
        let db = setup_db();
        let config = CoreConfig::default();
        let orders = OrderService::new(&db, &config);
        let (user, rx) = setup_clinic(&db, "north");
        let mut staff = User::new("staff@example.com".into(), "Lab".into(), "Staff".into());
        staff.is_staff = true;

        let order = orders
            .create(
                &user,
                NewOrder {
                    prescription_ids: vec![rx.id.clone()],
                    ..Default::default()
                },
            )
            .unwrap()
            .order;

        assert!(matches!(orders.advance(&user, &order.id), Err(ServiceError::Forbidden(_))));
        let advanced = orders.advance(&staff, &order.id).unwrap();
        assert_eq!(advanced.order.status, OrderStatus::Processing);

        match orders.cancel(&user, &order.id).unwrap_err() {
            ServiceError::Conflict(message) => {
                assert_eq!(message, "Only pending orders can be cancelled.")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cancel_and_scope() {
        let db = setup_db();
        let config = CoreConfig::default();
        let orders = OrderService::new(&db, &config);
        let (north, rx) = setup_clinic(&db, "north");
        let (south, _) = setup_clinic(&db, "south");

        let order = orders
            .create(
                &north,
                NewOrder {
                    prescription_ids: vec![rx.id],
                    ..Default::default()
                },
            )
            .unwrap()
            .order;

        assert!(orders.list(&south).unwrap().is_empty());
        assert!(matches!(orders.cancel(&south, &order.id), Err(ServiceError::NotFound(_))));

        let cancelled = orders.cancel(&north, &order.id).unwrap();
        assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
        assert!(matches!(orders.cancel(&north, &order.id), Err(ServiceError::Conflict(_))));
    }
}
