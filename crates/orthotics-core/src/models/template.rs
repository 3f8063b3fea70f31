//! Prescription templates and the lookup option lists a prescription
//! refers to (status, foot type, wear time, activity level).

use serde::{Deserialize, Serialize};

use super::choices::choice_enum;

/// A reusable prescription skeleton.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Template {
    pub fn new(name: String, description: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            description,
            is_active: true,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

choice_enum! {
    /// Which option list a [`LookupOption`] belongs to.
    LookupKind {
        Status => "status",
        FootType => "foot_type",
        WearTime => "wear_time",
        Activity => "activity",
    }
    default Status
}

/// One entry of a named, ordered option list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LookupOption {
    pub id: String,
    pub kind: LookupKind,
    /// Unique within its kind
    pub name: String,
    pub description: String,
    /// Display color; statuses only
    pub color: Option<String>,
    pub sort_order: i64,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl LookupOption {
    pub fn new(kind: LookupKind, name: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            name,
            description: String::new(),
            color: match kind {
                LookupKind::Status => Some("primary".to_string()),
                _ => None,
            },
            sort_order: 0,
            is_active: true,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}
