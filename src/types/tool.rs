//! Tool descriptor types shared between the registry, the reasoning node's
//! prompt builder, and the executor (§3, §9).

use serde::{Deserialize, Serialize};

/// The four tool categories named in §2 and §9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Information,
    Spatial,
    Assessment,
    Action,
}

/// Whether a tool demands an FSM validation pass immediately after running
/// (§4.4: `assess_risk`, `calculate_impact_zone`, `notify_department`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolClass {
    Critical,
    Ordinary,
}

/// A JSON-schema-ish input description, just enough to validate types,
/// required fields, enum constraints, and bounded string lengths (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputFieldSchema {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub enum_values: Vec<String>,
    #[serde(default)]
    pub max_len: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Number,
    Bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolInputSchema {
    pub fields: Vec<InputFieldSchema>,
}
