use crate::types::ScenarioDescriptor;

use super::DEFAULT_SCENARIO_ID;

/// Keyword match over the incoming message across all scenario manifests
/// (§4.1 step 1): on tie, the scenario matching the most *distinct* keywords
/// wins; on further tie, the lexicographically lower `id` wins; if nothing
/// matches, the default scenario is used.
pub fn identify_scenario<'a>(message: &str, scenarios: &'a [ScenarioDescriptor]) -> &'a str {
    let lower = message.to_lowercase();

    let mut best: Option<(&str, usize)> = None;
    for scenario in scenarios {
        let distinct_matches = scenario
            .keywords
            .iter()
            .filter(|kw| lower.contains(&kw.to_lowercase()))
            .count();
        if distinct_matches == 0 {
            continue;
        }
        best = Some(match best {
            None => (scenario.id.as_str(), distinct_matches),
            Some((best_id, best_count)) => {
                if distinct_matches > best_count
                    || (distinct_matches == best_count && scenario.id.as_str() < best_id)
                {
                    (scenario.id.as_str(), distinct_matches)
                } else {
                    (best_id, best_count)
                }
            }
        });
    }

    best.map(|(id, _)| id).unwrap_or(DEFAULT_SCENARIO_ID)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldDeclaration, FsmStateDescriptor, RiskRuleSet, ScenarioDescriptor};

    fn scenario(id: &str, keywords: &[&str]) -> ScenarioDescriptor {
        ScenarioDescriptor {
            id: id.to_string(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            field_order: Vec::new(),
            field_names: Default::default(),
            ask_prompts: Default::default(),
            p1_fields: vec![FieldDeclaration::default()],
            p2_fields: Vec::new(),
            fsm_states: vec![
                FsmStateDescriptor {
                    id: "INIT".into(),
                    order: 0,
                    name: "init".into(),
                    preconditions: Vec::new(),
                    next_states: Vec::new(),
                },
                FsmStateDescriptor {
                    id: "COMPLETED".into(),
                    order: 1,
                    name: "completed".into(),
                    preconditions: Vec::new(),
                    next_states: Vec::new(),
                },
            ],
            mandatory_triggers: Vec::new(),
            risk_rules: RiskRuleSet::Priority(Vec::new()),
            system_prompt: String::new(),
        }
    }

    #[test]
    fn most_distinct_keywords_wins() {
        let scenarios = vec![
            scenario("oil_spill", &["spill", "fuel"]),
            scenario("bird_strike", &["bird", "strike", "fod"]),
        ];
        let id = identify_scenario("bird strike on fod near the runway", &scenarios);
        assert_eq!(id, "bird_strike");
    }

    #[test]
    fn tie_breaks_on_lexicographically_lower_id() {
        let scenarios = vec![scenario("fod", &["debris"]), scenario("bird_strike", &["debris"])];
        let id = identify_scenario("debris on runway", &scenarios);
        assert_eq!(id, "bird_strike");
    }

    #[test]
    fn no_match_falls_back_to_default() {
        let scenarios = vec![scenario("bird_strike", &["bird"])];
        let id = identify_scenario("unrelated text", &scenarios);
        assert_eq!(id, DEFAULT_SCENARIO_ID);
    }
}
