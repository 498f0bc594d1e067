//! FSM compliance validator (§4.4): infers the furthest reachable phase,
//! checks its preconditions, and evaluates mandatory triggers, running only
//! after a critical tool has executed.
//!
//! Shaped after a `director` phase inference step (walks a fixed phase
//! sequence forward while each phase's entry condition holds) —
//! generalised here from a hardcoded phase list to a scenario-declared
//! DAG of preconditioned states plus a priority-ordered
//! mandatory-trigger table.

use std::collections::BTreeSet;

use crate::types::{MandatoryTrigger, ScenarioDescriptor, SessionState};

/// One declarative obligation still outstanding (§4.4 step 3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub action: String,
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// The result of one validation pass (§4.4 step 4).
#[derive(Debug, Clone, Default)]
pub struct FsmValidation {
    pub is_valid: bool,
    pub current_state: String,
    pub inferred_state: String,
    pub errors: Vec<String>,
    pub pending_actions: Vec<PendingAction>,
}

/// Parse one precondition string, either `<path> == <value>` or
/// `<path> in <set>` where `<set>` is a comma-separated, bracketed list
/// (§4.4 step 2).
enum Precondition<'a> {
    Equals { path: &'a str, value: &'a str },
    In { path: &'a str, values: Vec<&'a str> },
}

fn parse_precondition(raw: &str) -> Option<Precondition<'_>> {
    if let Some((path, rest)) = raw.split_once("==") {
        return Some(Precondition::Equals { path: path.trim(), value: rest.trim() });
    }
    if let Some((path, rest)) = raw.split_once(" in ") {
        let values = rest
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .split(',')
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .collect();
        return Some(Precondition::In { path: path.trim(), values });
    }
    if !raw.trim().is_empty() {
        // A bare path (e.g. `checklist.p1_complete`) is shorthand for
        // `<path> == true` (§4.4 step 1 examples).
        return Some(Precondition::Equals { path: raw.trim(), value: "true" });
    }
    None
}

fn precondition_satisfied(state: &SessionState, raw: &str) -> bool {
    let Some(parsed) = parse_precondition(raw) else { return false };
    let path = match &parsed {
        Precondition::Equals { path, .. } | Precondition::In { path, .. } => *path,
    };
    let Some(actual) = state.read_path(path) else { return false };
    let actual_text = match &actual {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    };
    match parsed {
        Precondition::Equals { value, .. } => actual_text == value.trim_matches('"'),
        Precondition::In { values, .. } => values.iter().any(|v| v.trim_matches('"') == actual_text),
    }
}

/// Walk forward from `state.fsm_state` while every precondition of the next
/// state on the declared path is already satisfied, returning the furthest
/// reachable state id (§4.4 step 1).
fn infer_state(scenario: &ScenarioDescriptor, state: &SessionState) -> String {
    let mut current = state.fsm_state.clone();
    let mut visited = BTreeSet::new();
    loop {
        if !visited.insert(current.clone()) {
            break; // defend against a cyclic descriptor; stay put.
        }
        let Some(descriptor) = scenario.state_by_id(&current) else { break };
        let next_reachable = descriptor.next_states.iter().find(|next_id| {
            scenario
                .state_by_id(next_id)
                .map(|next| next.preconditions.iter().all(|p| precondition_satisfied(state, p)))
                .unwrap_or(false)
        });
        match next_reachable {
            Some(next_id) => current = next_id.clone(),
            None => break,
        }
    }
    current
}

/// Check every precondition of `state_id`, producing one error string per
/// unsatisfied precondition (§4.4 step 2).
fn check_preconditions(scenario: &ScenarioDescriptor, state: &SessionState, state_id: &str) -> Vec<String> {
    let Some(descriptor) = scenario.state_by_id(state_id) else {
        return vec![format!("unknown FSM state: {state_id}")];
    };
    descriptor
        .preconditions
        .iter()
        .filter(|p| !precondition_satisfied(state, p))
        .map(|p| format!("entering {state_id} requires {p}"))
        .collect()
}

/// Evaluate a single mandatory-trigger condition. Conditions reuse the
/// precondition grammar (`<path> == <value>` / `<path> in <set>`); an
/// empty condition is always true (unconditional trigger).
fn condition_holds(state: &SessionState, condition: &str) -> bool {
    if condition.trim().is_empty() {
        return true;
    }
    precondition_satisfied(state, condition)
}

/// Evaluate every trigger in priority order, contributing a pending action
/// for each whose condition holds and whose `check_field` is not yet true,
/// deduplicated by `(action, params)` (§4.4 step 3).
fn pending_actions(triggers: &[MandatoryTrigger], state: &SessionState) -> Vec<PendingAction> {
    let mut ordered: Vec<&MandatoryTrigger> = triggers.iter().collect();
    ordered.sort_by_key(|t| t.priority);

    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for trigger in ordered {
        if !condition_holds(state, &trigger.condition) {
            continue;
        }
        let check_done = state.read_path(&trigger.check_field).and_then(|v| v.as_bool()).unwrap_or(false);
        if check_done {
            continue;
        }
        let key = (trigger.action.clone(), serde_json::to_string(&trigger.params).unwrap_or_default());
        if seen.insert(key) {
            out.push(PendingAction { action: trigger.action.clone(), params: trigger.params.clone() });
        }
    }
    out
}

/// Run the full validation pass, updating `state.fsm_state` to the
/// inferred state as a side effect (§4.4 step 1 "update `fsm_state`").
pub fn validate(scenario: &ScenarioDescriptor, state: &mut SessionState) -> FsmValidation {
    let current_state = state.fsm_state.clone();
    let inferred_state = infer_state(scenario, state);
    state.fsm_state = inferred_state.clone();

    let errors = check_preconditions(scenario, state, &inferred_state);
    let pending = pending_actions(&scenario.mandatory_triggers, state);

    FsmValidation {
        is_valid: errors.is_empty(),
        current_state,
        inferred_state,
        errors,
        pending_actions: pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldDeclaration, FsmStateDescriptor, RiskRuleSet};

    fn scenario() -> ScenarioDescriptor {
        ScenarioDescriptor {
            id: "oil_spill".to_string(),
            keywords: vec![],
            field_order: vec!["fluid_type".to_string()],
            field_names: Default::default(),
            ask_prompts: Default::default(),
            p1_fields: vec![FieldDeclaration { key: "fluid_type".to_string(), required: true, ..Default::default() }],
            p2_fields: vec![],
            fsm_states: vec![
                FsmStateDescriptor { id: "INIT".to_string(), order: 0, name: "init".to_string(), preconditions: vec![], next_states: vec!["ASSESSED".to_string()] },
                FsmStateDescriptor {
                    id: "ASSESSED".to_string(),
                    order: 1,
                    name: "assessed".to_string(),
                    preconditions: vec!["mandatory_actions_done.risk_assessed == true".to_string()],
                    next_states: vec!["COMPLETED".to_string()],
                },
                FsmStateDescriptor {
                    id: "COMPLETED".to_string(),
                    order: 2,
                    name: "completed".to_string(),
                    preconditions: vec!["mandatory_actions_done.fire_dept_notified == true".to_string()],
                    next_states: vec![],
                },
            ],
            mandatory_triggers: vec![MandatoryTrigger {
                id: "t1".to_string(),
                condition: "risk_assessment.level == HIGH".to_string(),
                action: "notify_department".to_string(),
                params: serde_json::json!({"department": "fire", "priority": "immediate"}).as_object().cloned().unwrap(),
                check_field: "mandatory_actions_done.fire_dept_notified".to_string(),
                priority: 1,
            }],
            risk_rules: RiskRuleSet::Priority(vec![]),
            system_prompt: String::new(),
        }
    }

    #[test]
    fn infers_and_advances_state_when_precondition_met() {
        let mut state = SessionState::new("s1", "oil_spill");
        state.mandatory_actions_done.insert("risk_assessed".to_string(), true);
        let validation = validate(&scenario(), &mut state);
        assert_eq!(validation.inferred_state, "ASSESSED");
        assert!(!validation.errors.is_empty() || validation.is_valid);
    }

    #[test]
    fn reports_pending_action_for_unsatisfied_trigger() {
        use crate::types::{Guardrails, RiskAssessment, RiskLevel};
        let mut state = SessionState::new("s1", "oil_spill");
        state.mandatory_actions_done.insert("risk_assessed".to_string(), true);
        state.risk_assessment = Some(RiskAssessment {
            level: RiskLevel::High,
            score: 90,
            factors: vec![],
            rationale: String::new(),
            rules_triggered: vec![],
            immediate_actions: vec![],
            guardrails: Guardrails::default(),
            risk_floor_applied: None,
        });
        let validation = validate(&scenario(), &mut state);
        assert_eq!(validation.pending_actions.len(), 1);
        assert_eq!(validation.pending_actions[0].action, "notify_department");
    }

    #[test]
    fn errors_when_inferred_state_precondition_unmet() {
        let mut state = SessionState::new("s1", "oil_spill");
        // fsm_state stays INIT (risk_assessed not set); no error expected at INIT.
        let validation = validate(&scenario(), &mut state);
        assert_eq!(validation.inferred_state, "INIT");
        assert!(validation.is_valid);
    }
}
