//! Tenant-scoped access policy.
//!
//! Every list and retrieve on patients, prescriptions, orders and invoices
//! goes through a [`TenantScope`]. Staff and admins see every clinic; other
//! users see their own clinic only, and users without a clinic see nothing.
//!
//! Membership rules:
//!
//! - a patient is in clinic C when its clinic is C
//! - a prescription is in C when its patient is in C
//! - an order is in C when any of its prescriptions is in C
//! - an invoice is in C when its order is in C

use crate::models::User;

/// What an actor may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantScope {
    /// Every clinic.
    All,
    /// A single clinic.
    Clinic(String),
    /// No rows at all.
    Nothing,
}

/// The scoped aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Patient,
    Prescription,
    Order,
    Invoice,
}

impl Aggregate {
    pub fn table(&self) -> &'static str {
        match self {
            Aggregate::Patient => "patients",
            Aggregate::Prescription => "prescriptions",
            Aggregate::Order => "orders",
            Aggregate::Invoice => "invoices",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Aggregate::Patient => "Patient",
            Aggregate::Prescription => "Prescription",
            Aggregate::Order => "Order",
            Aggregate::Invoice => "Invoice",
        }
    }

    /// SQL condition on the unaliased aggregate table, with one `?` for the
    /// clinic id.
    fn clinic_predicate(&self) -> &'static str {
        match self {
            Aggregate::Patient => "patients.clinic_id = ?",
            Aggregate::Prescription => {
                "EXISTS (SELECT 1 FROM patients scope_pa \
                 WHERE scope_pa.id = prescriptions.patient_id AND scope_pa.clinic_id = ?)"
            }
            Aggregate::Order => {
                "EXISTS (SELECT 1 FROM order_prescriptions scope_op \
                 JOIN prescriptions scope_rx ON scope_rx.id = scope_op.prescription_id \
                 JOIN patients scope_pa ON scope_pa.id = scope_rx.patient_id \
                 WHERE scope_op.order_id = orders.id AND scope_pa.clinic_id = ?)"
            }
            Aggregate::Invoice => {
                "EXISTS (SELECT 1 FROM order_prescriptions scope_op \
                 JOIN prescriptions scope_rx ON scope_rx.id = scope_op.prescription_id \
                 JOIN patients scope_pa ON scope_pa.id = scope_rx.patient_id \
                 WHERE scope_op.order_id = invoices.order_id AND scope_pa.clinic_id = ?)"
            }
        }
    }
}

/// How a scope restricts a query on one aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeFilter<'a> {
    Unrestricted,
    Clinic {
        predicate: &'static str,
        clinic_id: &'a str,
    },
    /// The query must return no rows.
    Empty,
}

impl TenantScope {
    pub fn for_actor(actor: &User) -> Self {
        if actor.is_privileged() {
            return TenantScope::All;
        }
        match &actor.clinic_id {
            Some(clinic_id) => TenantScope::Clinic(clinic_id.clone()),
            None => TenantScope::Nothing,
        }
    }

    pub fn filter(&self, aggregate: Aggregate) -> ScopeFilter<'_> {
        match self {
            TenantScope::All => ScopeFilter::Unrestricted,
            TenantScope::Clinic(clinic_id) => ScopeFilter::Clinic {
                predicate: aggregate.clinic_predicate(),
                clinic_id,
            },
            TenantScope::Nothing => ScopeFilter::Empty,
        }
    }

    /// Whether records owned by `clinic_id` are within this scope.
    pub fn allows_clinic(&self, clinic_id: &str) -> bool {
        match self {
            TenantScope::All => true,
            TenantScope::Clinic(own) => own == clinic_id,
            TenantScope::Nothing => false,
        }
    }
}
