//! Risk rule engine (§4.5): a priority-ordered condition/result matcher,
//! available in two forms that a scenario descriptor picks between.
//!
//! - [`oil_spill`]: the simple priority-rule evaluator (first equal-match
//!   wins, priorities unique by construction).
//! - [`weighted`]: the generic weighted-JSON evaluator used for
//!   bird-strike/FOD (dimension scoring + floor/boost rules + level map).
//!
//! Shaped after the ensemble voting in `agents/orchestrator.rs` (priority
//! override, weighted sum, level mapping) generalised from four
//! hardcoded specialists into data-driven rule tables ("YAML/JSON-driven
//! rule engine... a library, not code generation").

mod oil_spill;
mod weighted;
mod operators;

pub use oil_spill::{evaluate_oil_spill, OilSpillRule};
pub use operators::{evaluate_clause, Clause, Operator};
pub use weighted::{
    evaluate_weighted, Dimension, LevelGuardrails, RiskMapping, RiskMappingRange, WeightedRule,
    WeightedRuleSet,
};
