//! Weighted-JSON evaluator for bird-strike/FOD risk rules (§4.5).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::operators::{evaluate_clause, Clause};
use crate::types::{Guardrails, IncidentFields, RiskAssessment, RiskLevel};

/// One scored dimension, e.g. `fod_type` or `bird_info` (§3, §4.5 step 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub weight: f64,
    /// Row value -> points. An explicit `UNKNOWN` row is required so a
    /// missing dimension contributes a deliberate score rather than zero
    /// (§4.5 step 1).
    pub points_table: BTreeMap<String, f64>,
}

impl Dimension {
    fn points_for(&self, incident: &IncidentFields) -> f64 {
        let key = incident
            .get(&self.name)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "UNKNOWN".to_string());

        self.points_table
            .get(&key)
            .or_else(|| self.points_table.get("UNKNOWN"))
            .copied()
            .unwrap_or(0.0)
    }
}

/// `then` clause of a rule: may promote the floor, boost the score, or
/// just tag an action (§3, §4.5 step 3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleEffect {
    #[serde(default)]
    pub risk_floor: Option<RiskLevel>,
    #[serde(default)]
    pub risk_boost: Option<f64>,
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedRule {
    pub id: String,
    pub priority: i64,
    pub when: Clause,
    pub then: RuleEffect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskMappingRange {
    pub min_score: f64,
    pub max_score: f64,
    pub level: RiskLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskMapping {
    pub by_score: Vec<RiskMappingRange>,
}

impl RiskMapping {
    fn level_for(&self, score: f64) -> RiskLevel {
        self.by_score
            .iter()
            .find(|r| score >= r.min_score && score <= r.max_score)
            .map(|r| r.level)
            .unwrap_or(RiskLevel::Low)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LevelGuardrails {
    pub by_level: BTreeMap<String, Guardrails>,
}

impl LevelGuardrails {
    fn for_level(&self, level: RiskLevel) -> Guardrails {
        self.by_level
            .get(&level.to_string())
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedRuleSet {
    pub rule_set_id: String,
    pub dimensions: Vec<Dimension>,
    pub rules: Vec<WeightedRule>,
    pub risk_mapping: RiskMapping,
    #[serde(default)]
    pub guardrails: LevelGuardrails,
    #[serde(default = "default_max_score")]
    pub max_score: f64,
}

fn default_max_score() -> f64 {
    100.0
}

/// Evaluate the full weighted pipeline (§4.5 steps 1-5).
pub fn evaluate_weighted(rule_set: &WeightedRuleSet, incident: &IncidentFields) -> RiskAssessment {
    // Step 1-2: weighted sum of dimension points, capped to max_score.
    let raw_score: f64 = rule_set
        .dimensions
        .iter()
        .map(|d| d.points_for(incident) * d.weight)
        .sum();
    let mut score = raw_score.min(rule_set.max_score).max(0.0);

    // Step 3: evaluate rules in priority order, accumulating floor/boost.
    let mut sorted: Vec<&WeightedRule> = rule_set.rules.iter().collect();
    sorted.sort_by_key(|r| r.priority);

    let mut floor: Option<RiskLevel> = None;
    let mut actions = Vec::new();
    let mut triggered = Vec::new();

    for rule in &sorted {
        if evaluate_clause(&rule.when, incident) {
            triggered.push(rule.id.clone());
            if let Some(boost) = rule.then.risk_boost {
                score = (score + boost).min(rule_set.max_score).max(0.0);
            }
            if let Some(rule_floor) = rule.then.risk_floor {
                floor = Some(match floor {
                    Some(existing) if existing >= rule_floor => existing,
                    _ => rule_floor,
                });
            }
            if let Some(action) = &rule.then.action {
                actions.push(action.clone());
            }
        }
    }

    // Step 4: map score to level; a rule-set floor wins over a lower mapped level.
    let mapped_level = rule_set.risk_mapping.level_for(score);
    let level = match floor {
        Some(floor_level) if floor_level > mapped_level => floor_level,
        _ => mapped_level,
    };

    // Step 5: attach guardrails for the final level.
    let guardrails = rule_set.guardrails.for_level(level);

    let factors: Vec<String> = rule_set
        .dimensions
        .iter()
        .map(|d| {
            format!(
                "{}={} ({:+.1})",
                d.name,
                incident
                    .get(&d.name)
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "UNKNOWN".to_string()),
                d.points_for(incident) * d.weight
            )
        })
        .collect();

    RiskAssessment {
        level,
        score: score.round().clamp(0.0, 100.0) as u8,
        factors,
        rationale: format!("weighted score {score:.1} mapped via {}", rule_set.rule_set_id),
        rules_triggered: triggered,
        immediate_actions: actions,
        guardrails,
        risk_floor_applied: floor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::operators::{Condition, Operator};
    use crate::types::FieldValue;

    fn make_rule_set() -> WeightedRuleSet {
        let mut metal_points = BTreeMap::new();
        metal_points.insert("METAL".to_string(), 40.0);
        metal_points.insert("UNKNOWN".to_string(), 10.0);

        let mut presence_points = BTreeMap::new();
        presence_points.insert("ON_SURFACE".to_string(), 30.0);
        presence_points.insert("UNKNOWN".to_string(), 5.0);

        WeightedRuleSet {
            rule_set_id: "fod_rule".to_string(),
            dimensions: vec![
                Dimension {
                    name: "fod_type".to_string(),
                    weight: 1.0,
                    points_table: metal_points,
                },
                Dimension {
                    name: "presence".to_string(),
                    weight: 1.0,
                    points_table: presence_points,
                },
            ],
            rules: vec![WeightedRule {
                id: "runway_metal_floor".to_string(),
                priority: 1,
                when: Clause::Cond(Condition {
                    field: "location_area".to_string(),
                    op: Operator::Eq,
                    value: serde_json::json!("RUNWAY"),
                }),
                then: RuleEffect {
                    risk_floor: Some(RiskLevel::High),
                    risk_boost: Some(15.0),
                    action: Some("notify_department(atc, immediate)".to_string()),
                },
            }],
            risk_mapping: RiskMapping {
                by_score: vec![
                    RiskMappingRange { min_score: 0.0, max_score: 39.9, level: RiskLevel::Low },
                    RiskMappingRange { min_score: 40.0, max_score: 69.9, level: RiskLevel::Medium },
                    RiskMappingRange { min_score: 70.0, max_score: 100.0, level: RiskLevel::High },
                ],
            },
            guardrails: LevelGuardrails::default(),
            max_score: 100.0,
        }
    }

    #[test]
    fn runway_metal_on_surface_scores_high_with_floor() {
        let rule_set = make_rule_set();
        let mut incident = IncidentFields::new();
        incident.insert("fod_type".to_string(), FieldValue::Text("METAL".to_string()));
        incident.insert("presence".to_string(), FieldValue::Text("ON_SURFACE".to_string()));
        incident.insert("location_area".to_string(), FieldValue::Text("RUNWAY".to_string()));

        let result = evaluate_weighted(&rule_set, &incident);
        assert!(result.score >= 85, "expected score >= 85, got {}", result.score);
        assert_eq!(result.level, RiskLevel::High);
        assert!(result.rules_triggered.contains(&"runway_metal_floor".to_string()));
    }

    #[test]
    fn missing_dimension_uses_unknown_row_not_zero() {
        let rule_set = make_rule_set();
        let incident = IncidentFields::new();
        let result = evaluate_weighted(&rule_set, &incident);
        assert_eq!(result.score, 15); // 10 (UNKNOWN fod_type) + 5 (UNKNOWN presence)
        assert_eq!(result.level, RiskLevel::Low);
    }

    #[test]
    fn floor_wins_over_lower_mapped_level() {
        let mut rule_set = make_rule_set();
        // Force a low raw score but keep the floor-triggering condition.
        rule_set.dimensions.clear();
        let mut incident = IncidentFields::new();
        incident.insert("location_area".to_string(), FieldValue::Text("RUNWAY".to_string()));

        let result = evaluate_weighted(&rule_set, &incident);
        // raw score 0 + boost 15 = 15 -> maps to Low, but floor is High.
        assert_eq!(result.level, RiskLevel::High);
        assert_eq!(result.risk_floor_applied, Some(RiskLevel::High));
    }
}
