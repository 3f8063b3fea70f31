//! Lenient, field-by-field coercion of form payloads.
//!
//! Detail records are edited from loosely typed forms. Instead of rejecting
//! a malformed value, each declared field is coerced to its type: numbers
//! fall back to zero, booleans follow truthiness, choices fall back to the
//! field default and text accepts any scalar. Keys that are not declared
//! fields are ignored.

use log::debug;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use super::{FieldErrors, NON_FIELD_ERRORS};

/// How a field's raw value is coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Number; anything non-numeric becomes `0`.
    Number,
    /// Number or null; blank becomes null, anything else non-numeric `0`.
    OptionalNumber,
    Bool,
    /// Text; null becomes the empty string.
    Text,
    OptionalText,
    /// One of `choices`; anything else becomes `default`.
    Choice {
        choices: &'static [&'static str],
        default: &'static str,
    },
    /// One of `choices` or null; anything else becomes null.
    OptionalChoice { choices: &'static [&'static str] },
}

/// A named, typed form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn number(name: &'static str) -> Self {
        Self { name, kind: FieldKind::Number }
    }

    pub const fn optional_number(name: &'static str) -> Self {
        Self { name, kind: FieldKind::OptionalNumber }
    }

    pub const fn boolean(name: &'static str) -> Self {
        Self { name, kind: FieldKind::Bool }
    }

    pub const fn text(name: &'static str) -> Self {
        Self { name, kind: FieldKind::Text }
    }

    pub const fn optional_text(name: &'static str) -> Self {
        Self { name, kind: FieldKind::OptionalText }
    }

    pub const fn choice(
        name: &'static str,
        choices: &'static [&'static str],
        default: &'static str,
    ) -> Self {
        Self {
            name,
            kind: FieldKind::Choice { choices, default },
        }
    }

    pub const fn optional_choice(name: &'static str, choices: &'static [&'static str]) -> Self {
        Self {
            name,
            kind: FieldKind::OptionalChoice { choices },
        }
    }
}

/// A record editable through coerced form payloads.
pub trait FieldSchema: Serialize + DeserializeOwned + Default {
    /// Every field a payload may set.
    fn fields() -> &'static [FieldSpec];

    /// Domain checks run after coercion.
    fn validate(&self) -> Result<(), FieldErrors> {
        Ok(())
    }
}

/// Whether absent fields keep their value or reset to the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Only supplied fields change (POST/PATCH).
    Partial,
    /// Absent fields reset to their defaults (PUT).
    Full,
}

/// Coerce a single raw value according to `kind`.
pub fn coerce_value(name: &str, kind: FieldKind, raw: &Value) -> Value {
    match kind {
        FieldKind::Number => Value::from(number_or_zero(name, raw)),
        FieldKind::OptionalNumber => {
            if is_blank(raw) {
                Value::Null
            } else {
                Value::from(number_or_zero(name, raw))
            }
        }
        FieldKind::Bool => Value::Bool(truthy(raw)),
        FieldKind::Text => Value::String(text(raw).unwrap_or_default()),
        FieldKind::OptionalText => text(raw).map(Value::String).unwrap_or(Value::Null),
        FieldKind::Choice { choices, default } => match raw.as_str() {
            Some(value) if choices.contains(&value) => Value::String(value.to_string()),
            _ => {
                debug!("Field {} got invalid choice {}, using {}", name, raw, default);
                Value::String(default.to_string())
            }
        },
        FieldKind::OptionalChoice { choices } => match raw.as_str() {
            Some(value) if choices.contains(&value) => Value::String(value.to_string()),
            _ if is_blank(raw) => Value::Null,
            _ => {
                debug!("Field {} got invalid choice {}, clearing", name, raw);
                Value::Null
            }
        },
    }
}

/// Apply a payload to `current`, returning the updated record.
///
/// In [`UpdateMode::Full`] the update starts from `T::default()` so that
/// every field the payload omits is reset. The record's own `validate` runs
/// on the result.
pub fn apply_update<T: FieldSchema>(
    current: &T,
    payload: &Map<String, Value>,
    mode: UpdateMode,
) -> Result<T, FieldErrors> {
    let base = match mode {
        UpdateMode::Partial => serde_json::to_value(current),
        UpdateMode::Full => serde_json::to_value(T::default()),
    };

    let mut object = match base {
        Ok(Value::Object(object)) => object,
        Ok(_) => return Err(FieldErrors::single(NON_FIELD_ERRORS, "Record is not an object")),
        Err(e) => return Err(FieldErrors::single(NON_FIELD_ERRORS, e.to_string())),
    };

    for spec in T::fields() {
        if let Some(raw) = payload.get(spec.name) {
            object.insert(spec.name.to_string(), coerce_value(spec.name, spec.kind, raw));
        }
    }

    let updated: T = serde_json::from_value(Value::Object(object))
        .map_err(|e| FieldErrors::single(NON_FIELD_ERRORS, e.to_string()))?;
    updated.validate()?;
    Ok(updated)
}

fn number_or_zero(name: &str, raw: &Value) -> f64 {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };

    match parsed {
        Some(value) if value.is_finite() => value,
        _ => {
            debug!("Field {} got non-numeric value {}, using 0", name, raw);
            0.0
        }
    }
}

fn truthy(raw: &Value) -> bool {
    match raw {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        ),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Null => false,
    }
}

fn text(raw: &Value) -> Option<String> {
    match raw {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn is_blank(raw: &Value) -> bool {
    match raw {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}
