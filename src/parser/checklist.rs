//! Checklist update (§4.1 step 6).

use crate::types::{Checklist, IncidentFields, ScenarioDescriptor};

/// Recompute the checklist from the current incident fields. A field
/// counts as collected if either the bare key or its `_display` companion
/// is present (§4.1 step 6; the `flight_no`/`flight_no_display` pairing is
/// the common case this generalises).
pub fn update_checklist(scenario: &ScenarioDescriptor, incident: &IncidentFields) -> Checklist {
    let mut fields = scenario.all_declared_fields();
    if !fields.iter().any(|f| f == "flight_no") {
        fields.push("flight_no".to_string());
    }

    let mut checklist = Checklist::new();
    for field in &fields {
        let display_key = format!("{field}_display");
        let collected = incident
            .get(field)
            .or_else(|| incident.get(&display_key))
            .map(|v| v.is_present())
            .unwrap_or(false);
        checklist.insert(field.clone(), collected);
    }

    // §4.4 step 1 names `checklist.p1_complete` as an FSM precondition
    // path; derive it from the P1 fields' own checklist entries rather
    // than leaving it unset.
    let p1_complete = scenario
        .p1_field_keys()
        .iter()
        .all(|key| checklist.get(*key).copied().unwrap_or(false));
    checklist.insert("p1_complete".to_string(), p1_complete);

    checklist
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldDeclaration, FieldValue, RiskRuleSet};

    fn scenario() -> ScenarioDescriptor {
        ScenarioDescriptor {
            id: "oil_spill".to_string(),
            keywords: vec![],
            field_order: vec!["fluid_type".to_string(), "position".to_string()],
            field_names: Default::default(),
            ask_prompts: Default::default(),
            p1_fields: vec![
                FieldDeclaration { key: "fluid_type".to_string(), required: true, ..Default::default() },
                FieldDeclaration { key: "position".to_string(), required: true, ..Default::default() },
            ],
            p2_fields: vec![],
            fsm_states: vec![],
            mandatory_triggers: vec![],
            risk_rules: RiskRuleSet::Priority(vec![]),
            system_prompt: String::new(),
        }
    }

    #[test]
    fn flight_no_collected_via_display_variant() {
        let mut incident = IncidentFields::new();
        incident.insert("flight_no_display".to_string(), FieldValue::Text("CCA1234".to_string()));
        incident.insert("fluid_type".to_string(), FieldValue::Text("FUEL".to_string()));

        let checklist = update_checklist(&scenario(), &incident);
        assert_eq!(checklist.get("flight_no"), Some(&true));
        assert_eq!(checklist.get("fluid_type"), Some(&true));
        assert_eq!(checklist.get("position"), Some(&false));
        assert_eq!(checklist.get("p1_complete"), Some(&false));
    }

    #[test]
    fn p1_complete_true_once_all_p1_fields_present() {
        let mut incident = IncidentFields::new();
        incident.insert("fluid_type".to_string(), FieldValue::Text("FUEL".to_string()));
        incident.insert("position".to_string(), FieldValue::Text("217".to_string()));

        let checklist = update_checklist(&scenario(), &incident);
        assert_eq!(checklist.get("p1_complete"), Some(&true));
    }
}
