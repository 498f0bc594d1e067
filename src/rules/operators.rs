//! Clause operators and combinators for the weighted-JSON rule evaluator
//! (§4.5 "Operators supported by conditions").

use serde::{Deserialize, Serialize};

use crate::types::IncidentFields;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
    NotIn,
    Contains,
    MissingOrEmpty,
    NotMissingOrEmpty,
}

/// A single leaf condition: `field <op> value` (value unused for the two
/// `*missing_or_empty` operators).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: Operator,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// A boolean combinator tree over leaf conditions (§4.5 "combinators").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Clause {
    Cond(Condition),
    All(Vec<Clause>),
    Any(Vec<Clause>),
    Not(Box<Clause>),
}

fn field_as_text(incident: &IncidentFields, field: &str) -> Option<String> {
    incident.get(field).map(|v| v.to_string())
}

fn field_as_f64(incident: &IncidentFields, field: &str) -> Option<f64> {
    incident.get(field).and_then(|v| v.as_f64())
}

fn is_missing_or_empty(incident: &IncidentFields, field: &str) -> bool {
    match incident.get(field) {
        None => true,
        Some(v) => !v.is_present(),
    }
}

fn evaluate_condition(cond: &Condition, incident: &IncidentFields) -> bool {
    match cond.op {
        Operator::MissingOrEmpty => is_missing_or_empty(incident, &cond.field),
        Operator::NotMissingOrEmpty => !is_missing_or_empty(incident, &cond.field),
        Operator::Eq => field_as_text(incident, &cond.field)
            .is_some_and(|actual| Some(actual.as_str()) == cond.value.as_str()),
        Operator::Ne => field_as_text(incident, &cond.field)
            .map_or(true, |actual| Some(actual.as_str()) != cond.value.as_str()),
        Operator::Gt => field_as_f64(incident, &cond.field)
            .zip(cond.value.as_f64())
            .is_some_and(|(a, b)| a > b),
        Operator::Lt => field_as_f64(incident, &cond.field)
            .zip(cond.value.as_f64())
            .is_some_and(|(a, b)| a < b),
        Operator::Gte => field_as_f64(incident, &cond.field)
            .zip(cond.value.as_f64())
            .is_some_and(|(a, b)| a >= b),
        Operator::Lte => field_as_f64(incident, &cond.field)
            .zip(cond.value.as_f64())
            .is_some_and(|(a, b)| a <= b),
        Operator::In => {
            let Some(actual) = field_as_text(incident, &cond.field) else {
                return false;
            };
            cond.value
                .as_array()
                .map(|arr| arr.iter().filter_map(|v| v.as_str()).any(|s| s == actual))
                .unwrap_or(false)
        }
        Operator::NotIn => {
            let Some(actual) = field_as_text(incident, &cond.field) else {
                return true;
            };
            cond.value
                .as_array()
                .map(|arr| !arr.iter().filter_map(|v| v.as_str()).any(|s| s == actual))
                .unwrap_or(true)
        }
        Operator::Contains => field_as_text(incident, &cond.field)
            .zip(cond.value.as_str())
            .is_some_and(|(actual, needle)| actual.contains(needle)),
    }
}

/// Evaluate a clause tree against the incident map.
pub fn evaluate_clause(clause: &Clause, incident: &IncidentFields) -> bool {
    match clause {
        Clause::Cond(cond) => evaluate_condition(cond, incident),
        Clause::All(clauses) => clauses.iter().all(|c| evaluate_clause(c, incident)),
        Clause::Any(clauses) => clauses.iter().any(|c| evaluate_clause(c, incident)),
        Clause::Not(inner) => !evaluate_clause(inner, incident),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldValue;

    fn incident_with(field: &str, value: FieldValue) -> IncidentFields {
        let mut m = IncidentFields::new();
        m.insert(field.to_string(), value);
        m
    }

    #[test]
    fn eq_and_not_combinator() {
        let incident = incident_with("fod_type", FieldValue::Text("METAL".to_string()));
        let clause = Clause::Not(Box::new(Clause::Cond(Condition {
            field: "fod_type".to_string(),
            op: Operator::Eq,
            value: serde_json::json!("RUBBER"),
        })));
        assert!(evaluate_clause(&clause, &incident));
    }

    #[test]
    fn gte_numeric() {
        let incident = incident_with("fod_size_cm", FieldValue::Number(5.0));
        let clause = Clause::Cond(Condition {
            field: "fod_size_cm".to_string(),
            op: Operator::Gte,
            value: serde_json::json!(3.0),
        });
        assert!(evaluate_clause(&clause, &incident));
    }

    #[test]
    fn missing_or_empty() {
        let incident = IncidentFields::new();
        let clause = Clause::Cond(Condition {
            field: "fod_size_cm".to_string(),
            op: Operator::MissingOrEmpty,
            value: serde_json::Value::Null,
        });
        assert!(evaluate_clause(&clause, &incident));
    }

    #[test]
    fn any_combinator() {
        let incident = incident_with("phase", FieldValue::Text("TAKEOFF_ROLL".to_string()));
        let clause = Clause::Any(vec![
            Clause::Cond(Condition {
                field: "phase".to_string(),
                op: Operator::Eq,
                value: serde_json::json!("LANDING_ROLL"),
            }),
            Clause::Cond(Condition {
                field: "phase".to_string(),
                op: Operator::Eq,
                value: serde_json::json!("TAKEOFF_ROLL"),
            }),
        ]);
        assert!(evaluate_clause(&clause, &incident));
    }
}
