//! Incident field value and checklist bookkeeping (§3, §4.1).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A scalar value extracted into `incident`. Kept loosely typed (string,
/// number, bool) because scenario-declared fields vary in shape and new
/// scenarios are added by shipping descriptors, not code (§4.5, §9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.parse().ok(),
            FieldValue::Bool(_) => None,
        }
    }

    pub fn is_present(&self) -> bool {
        match self {
            FieldValue::Text(s) => !s.trim().is_empty(),
            FieldValue::Number(_) | FieldValue::Bool(_) => true,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{s}"),
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// The incident field map, keyed by scenario-declared field name.
pub type IncidentFields = BTreeMap<String, FieldValue>;

/// The checklist: required-field-name -> collected flag (§4.1 step 6).
pub type Checklist = BTreeMap<String, bool>;

/// Common fields accepted regardless of the active scenario's declared set
/// (§3 field-filter invariant).
pub const COMMON_FIELDS: &[&str] = &[
    "flight_no",
    "flight_no_display",
    "position",
    "position_display",
];

/// Check whether a key may be written to `incident` for the given scenario's
/// declared field order (§3 field-filter invariant).
pub fn is_field_allowed(key: &str, field_order: &[String]) -> bool {
    field_order.iter().any(|f| f == key) || COMMON_FIELDS.contains(&key)
}
