//! Priority-rule evaluator for oil-spill-form risk rules (§4.5).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{FieldValue, Guardrails, IncidentFields, RiskAssessment, RiskLevel};

/// `{priority, conditions, level, score, immediate_actions}` (§3, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OilSpillRule {
    pub id: String,
    pub priority: i64,
    pub conditions: BTreeMap<String, FieldValue>,
    pub level: RiskLevel,
    pub score: u8,
    #[serde(default)]
    pub immediate_actions: Vec<String>,
    #[serde(default)]
    pub guardrails: Guardrails,
}

/// Scan rules ascending by priority; the first whose conditions all
/// equal-match the incident wins (§4.5, §8 rule-first-match stability).
///
/// Priorities are assumed unique (scenario load-time validation rejects
/// duplicates), so sort order ties never arise; this function additionally
/// sorts defensively so caller-supplied order never affects the result.
pub fn evaluate_oil_spill(rules: &[OilSpillRule], incident: &IncidentFields) -> RiskAssessment {
    let mut sorted: Vec<&OilSpillRule> = rules.iter().collect();
    sorted.sort_by_key(|r| r.priority);

    for rule in sorted {
        if rule
            .conditions
            .iter()
            .all(|(k, v)| incident.get(k).is_some_and(|actual| actual == v))
        {
            let factors: Vec<String> = rule
                .conditions
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();

            return RiskAssessment {
                level: rule.level,
                score: rule.score,
                factors,
                rationale: format!("matched rule {} (priority {})", rule.id, rule.priority),
                rules_triggered: vec![rule.id.clone()],
                immediate_actions: rule.immediate_actions.clone(),
                guardrails: rule.guardrails.clone(),
                risk_floor_applied: None,
            };
        }
    }

    RiskAssessment {
        level: RiskLevel::Low,
        score: 10,
        factors: Vec::new(),
        rationale: "no high-risk rule matched".to_string(),
        rules_triggered: Vec::new(),
        immediate_actions: Vec::new(),
        guardrails: Guardrails::default(),
        risk_floor_applied: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str, priority: i64, key: &str, val: &str, level: RiskLevel, score: u8) -> OilSpillRule {
        let mut conditions = BTreeMap::new();
        conditions.insert(key.to_string(), FieldValue::Text(val.to_string()));
        OilSpillRule {
            id: id.to_string(),
            priority,
            conditions,
            level,
            score,
            immediate_actions: Vec::new(),
            guardrails: Guardrails::default(),
        }
    }

    #[test]
    fn first_match_wins_and_is_stable_under_reshuffling() {
        let rules = vec![
            rule("r1", 1, "engine_status", "RUNNING", RiskLevel::High, 95),
            rule("r2", 2, "fluid_type", "FUEL", RiskLevel::Medium, 50),
        ];
        let mut incident = IncidentFields::new();
        incident.insert("engine_status".to_string(), FieldValue::Text("RUNNING".to_string()));
        incident.insert("fluid_type".to_string(), FieldValue::Text("FUEL".to_string()));

        let result = evaluate_oil_spill(&rules, &incident);
        assert_eq!(result.level, RiskLevel::High);
        assert_eq!(result.rules_triggered, vec!["r1".to_string()]);

        // Reshuffle — result must be identical (priority dictates order, not input order).
        let reshuffled = vec![rules[1].clone(), rules[0].clone()];
        let result2 = evaluate_oil_spill(&reshuffled, &incident);
        assert_eq!(result2.level, result.level);
        assert_eq!(result2.rules_triggered, result.rules_triggered);
    }

    #[test]
    fn no_match_falls_back_to_low() {
        let rules = vec![rule("r1", 1, "engine_status", "RUNNING", RiskLevel::High, 95)];
        let incident = IncidentFields::new();
        let result = evaluate_oil_spill(&rules, &incident);
        assert_eq!(result.level, RiskLevel::Low);
        assert_eq!(result.score, 10);
    }
}
