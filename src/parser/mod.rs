//! Input parser (§4.1): turns one turn of free-form controller text into a
//! set of incident-field writes, a recomputed checklist, and any
//! system-message warnings (e.g. rejected out-of-scope fields).
//!
//! Shaped after a WITS-packet ingestion pipeline (raw sensor frames
//! normalised into typed fields before anything downstream sees them),
//! generalised here from a fixed binary frame format to free-form
//! radiotelephony text, in two normalisation passes instead of one.

pub mod checklist;
pub mod extract;
pub mod filter;
pub mod normalise;

use std::collections::BTreeMap;

use crate::llm::LlmClient;
use crate::types::{Checklist, FieldValue, IncidentFields, ScenarioDescriptor};

/// The result of running the full parser pipeline over one turn (§4.1).
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    /// Newly accepted incident fields this turn only (the caller merges
    /// these into session state; already-present fields are left alone
    /// unless this turn's text re-supplies them).
    pub incident: BTreeMap<String, FieldValue>,
    /// The full recomputed checklist against the merged incident view.
    pub checklist: Checklist,
    /// `"[warning] ..."`-style notes: rejected fields, degraded steps.
    pub system_messages: Vec<String>,
}

/// Run stage-1/stage-2 normalisation, entity extraction, field filtering,
/// and the checklist update for one turn (§4.1 steps 2-6).
pub async fn parse_turn(
    llm: &dyn LlmClient,
    scenario: &ScenarioDescriptor,
    current_incident: &IncidentFields,
    message: &str,
) -> ParseOutcome {
    let stage1 = normalise::stage1_normalise(message);
    let stage2 = normalise::stage2_normalise(llm, message, &stage1).await;

    let entities = extract::extract_regex_entities(&stage2);
    let (accepted, rejected) = filter::filter_fields(entities, &scenario.field_order);

    let mut system_messages = Vec::new();
    for key in &rejected {
        system_messages.push(format!(
            "[warning] field_filter: rejected key '{key}' not declared by scenario '{}'",
            scenario.id
        ));
    }

    let mut merged_incident = current_incident.clone();
    for (key, value) in &accepted {
        merged_incident.insert(key.clone(), value.clone());
    }
    let checklist = checklist::update_checklist(scenario, &merged_incident);

    ParseOutcome { incident: accepted, checklist, system_messages }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::TemplateBackend;
    use crate::types::{FieldDeclaration, RiskRuleSet};

    fn scenario() -> ScenarioDescriptor {
        ScenarioDescriptor {
            id: "oil_spill".to_string(),
            keywords: vec![],
            field_order: vec!["fluid_type".to_string(), "leak_size".to_string(), "engine_status".to_string()],
            field_names: Default::default(),
            ask_prompts: Default::default(),
            p1_fields: vec![
                FieldDeclaration { key: "fluid_type".to_string(), required: true, ..Default::default() },
                FieldDeclaration { key: "leak_size".to_string(), required: true, ..Default::default() },
            ],
            p2_fields: vec![FieldDeclaration { key: "engine_status".to_string(), ..Default::default() }],
            fsm_states: vec![],
            mandatory_triggers: vec![],
            risk_rules: RiskRuleSet::Priority(vec![]),
            system_prompt: String::new(),
        }
    }

    #[tokio::test]
    async fn parses_flight_number_position_and_fluid_from_radio_text() {
        let llm = TemplateBackend;
        let outcome = parse_turn(
            &llm,
            &scenario(),
            &IncidentFields::new(),
            "CCA1234 跑道两拐左大量燃油泄漏，发动机停车",
        )
        .await;

        assert_eq!(outcome.incident.get("flight_no").unwrap().as_text(), Some("CCA1234"));
        assert_eq!(outcome.incident.get("fluid_type").unwrap().as_text(), Some("FUEL"));
        assert_eq!(outcome.checklist.get("fluid_type"), Some(&true));
        assert_eq!(outcome.checklist.get("leak_size"), Some(&true));
    }

    #[tokio::test]
    async fn rejects_fields_outside_declared_scope() {
        let llm = TemplateBackend;
        // bird_strike_phase is not in this (oil-spill) scenario's field_order
        // and is not one of the common fields, so it must be rejected.
        let outcome = parse_turn(&llm, &scenario(), &IncidentFields::new(), "起飞阶段发生燃油泄漏").await;
        assert!(outcome.system_messages.iter().any(|m| m.contains("rejected key 'bird_strike_phase'")));
        assert!(outcome.incident.get("bird_strike_phase").is_none());
    }
}
