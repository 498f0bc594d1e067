//! The ReAct reasoning node (§4.2): one LLM call that either selects a tool
//! to run next or produces a final answer, with a deterministic fallback
//! when the LLM is unavailable or its output cannot be parsed.
//!
//! Shaped after a `strategic_llm.rs` response parser (labelled sections
//! pulled out with per-field regexes, tolerant of surrounding prose) —
//! generalised here from a fixed five-field advisory format to the
//! open-ended `Thought`/`Action`/`Action Input`/`Final Answer` shape,
//! plus a retry-then-fallback policy that call didn't need (it had no
//! deterministic substitute; this one does).

use std::sync::Arc;

use regex::Regex;

use crate::llm::{CompletionOptions, LlmClient};
use crate::tools::information::next_pending_p1_field;
use crate::tools::{Tool, ToolRegistry};
use crate::types::{ReasoningStep, ScenarioDescriptor, SessionState};

/// One parsed LLM turn (§4.2).
#[derive(Debug, Clone, Default)]
pub struct ReactResponse {
    pub thought: String,
    pub action: Option<String>,
    pub action_input: Option<serde_json::Value>,
    pub final_answer: Option<String>,
}

/// Strip fenced code blocks and leading/trailing whitespace before parsing
/// (§4.2 "tolerant to whitespace and fenced code blocks").
fn strip_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// Parse one LLM response into a [`ReactResponse`]. Returns `None` when
/// neither an `Action`/`Action Input` pair nor a `Final Answer` could be
/// found (§4.2 "on parse failure...").
pub fn parse_react_response(raw: &str) -> Option<ReactResponse> {
    let text = strip_fences(raw);

    let thought_re = Regex::new(r"(?is)Thought:\s*(.+?)(?:\n\s*(?:Action|Final Answer)|\z)").expect("valid regex");
    let action_re = Regex::new(r"(?is)Action:\s*(.+?)\s*(?:\n|$)").expect("valid regex");
    let action_input_re = Regex::new(r"(?is)Action Input:\s*(.+?)\s*(?:\n\s*\n|\z)").expect("valid regex");
    let final_answer_re = Regex::new(r"(?is)Final Answer:\s*(.+)").expect("valid regex");

    let thought = thought_re.captures(&text).map(|c| c[1].trim().to_string()).unwrap_or_default();

    if let Some(answer) = final_answer_re.captures(&text) {
        return Some(ReactResponse { thought, final_answer: Some(answer[1].trim().to_string()), ..Default::default() });
    }

    let action = action_re.captures(&text).map(|c| c[1].trim().to_string())?;
    let input_text = action_input_re.captures(&text).map(|c| c[1].trim().to_string());
    let action_input = input_text.map(|raw_input| parse_action_input(&raw_input));

    Some(ReactResponse { thought, action: Some(action), action_input, final_answer: None })
}

/// `Action Input` may be a JSON object or a trivial string, interpreted as
/// `{value: <string>}` (§4.2).
fn parse_action_input(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!({ "value": raw }))
}

/// Build the reasoning prompt: system prompt, tool catalogue, condensed
/// state summary, checklist status, and recent history (§4.2).
pub fn build_prompt(scenario: &ScenarioDescriptor, tools: &[Arc<dyn Tool>], state: &SessionState) -> String {
    let mut prompt = String::new();
    prompt.push_str(&scenario.system_prompt);
    prompt.push_str("\n\nAvailable tools:\n");
    for tool in tools {
        prompt.push_str(&format!(
            "- {} ({:?}/{:?}): {}\n",
            tool.name(),
            tool.category(),
            tool.class(),
            tool.description()
        ));
    }

    prompt.push_str(&format!("\nScenario: {}\nFSM state: {}\n", scenario.id, state.fsm_state));
    prompt.push_str(&format!("Incident fields: {:?}\n", state.incident));
    if let Some(risk) = &state.risk_assessment {
        prompt.push_str(&format!("Risk: {} (score {})\n", risk.level, risk.score));
    }
    if let Some(spatial) = &state.spatial_analysis {
        prompt.push_str(&format!(
            "Impact zone: {} stands, {} taxiways, {} runways\n",
            spatial.affected_stands.len(),
            spatial.affected_taxiways.len(),
            spatial.affected_runways.len()
        ));
    }
    if let Some(prediction) = &state.flight_impact_prediction {
        prompt.push_str(&format!(
            "Flight impact: {} flights, {} min total delay\n",
            prediction.statistics.total, prediction.statistics.total_delay_minutes
        ));
    }

    let pending_p1 = next_pending_p1_field(scenario, &state.checklist);
    prompt.push_str(&format!(
        "Checklist: {:?}\nPending P1 field: {}\n",
        state.checklist,
        pending_p1.unwrap_or("none")
    ));

    prompt.push_str("\nRecent messages:\n");
    for message in state.messages.iter().rev().take(6).collect::<Vec<_>>().into_iter().rev() {
        prompt.push_str(&format!("{:?}: {}\n", message.role, message.content));
    }

    prompt.push_str(
        "\nRespond with:\nThought: <reasoning>\nAction: <tool name>\nAction Input: <JSON or plain string>\nOR\nThought: <reasoning>\nFinal Answer: <text>\n",
    );
    prompt
}

/// Shortened prompt used for the single retry after a parse failure
/// (§4.2 "one retry is performed with a shortened prompt").
fn build_shortened_prompt(scenario: &ScenarioDescriptor, state: &SessionState) -> String {
    format!(
        "{}\n\nRespond strictly as:\nThought: <one sentence>\nAction: <tool name>\nAction Input: <JSON>\nOR\nThought: <one sentence>\nFinal Answer: <text>\n\nFSM state: {}\nChecklist: {:?}\n",
        scenario.system_prompt, state.fsm_state, state.checklist
    )
}

/// Deterministic fallback when the LLM is unavailable or its output could
/// not be parsed twice (§4.2): the highest-priority pending P1 field wins;
/// otherwise `generate_report` once risk is assessed and every mandatory
/// action is done; otherwise ask a generic clarifying question.
pub fn fallback_response(scenario: &ScenarioDescriptor, state: &SessionState) -> ReactResponse {
    if let Some(field) = next_pending_p1_field(scenario, &state.checklist) {
        let prompt = scenario.ask_prompts.get(field).cloned().unwrap_or_else(|| format!("请提供 {field}"));
        return ReactResponse {
            thought: format!("pending mandatory field '{field}' is still missing"),
            action: Some("smart_ask".to_string()),
            action_input: Some(serde_json::json!({ "value": prompt })),
            final_answer: None,
        };
    }

    let mandatory_satisfied = !state.mandatory_actions_done.is_empty() && state.mandatory_actions_done.values().all(|v| *v);
    if state.risk_assessment.is_some() && mandatory_satisfied {
        return ReactResponse {
            thought: "risk assessed and all mandatory actions complete".to_string(),
            action: Some("generate_report".to_string()),
            action_input: Some(serde_json::Value::Null),
            final_answer: None,
        };
    }

    ReactResponse {
        thought: "no clear next step; asking for more detail".to_string(),
        action: Some("ask".to_string()),
        action_input: Some(serde_json::json!({ "value": "请提供更多事件细节" })),
        final_answer: None,
    }
}

/// Run the reasoning node: build the prompt, call the LLM, parse the
/// response (one retry on parse failure), and fall back deterministically
/// on persistent failure. Mutates `state` directly, per §4.2's state-delta
/// description (appended reasoning step, `current_*` fields, or
/// `final_answer`/`is_complete`).
///
/// Guardrail: a no-op when `state.is_complete` is already true (§4.2).
pub async fn run_reasoning_node(
    llm: &dyn LlmClient,
    registry: &ToolRegistry,
    scenario: &ScenarioDescriptor,
    state: &mut SessionState,
) {
    if state.is_complete {
        return;
    }

    let tools = registry.visible_to(&scenario.id);
    let prompt = build_prompt(scenario, &tools, state);
    let options = CompletionOptions { temperature: 0.1, ..CompletionOptions::default() };

    let response = match llm.complete(&prompt, options).await {
        Ok(text) => parse_react_response(&text),
        Err(_) => None,
    };

    let response = match response {
        Some(parsed) => parsed,
        None => {
            let shortened = build_shortened_prompt(scenario, state);
            match llm.complete(&shortened, options).await.ok().and_then(|text| parse_react_response(&text)) {
                Some(parsed) => parsed,
                None => fallback_response(scenario, state),
            }
        }
    };

    state.reasoning_steps.push(ReasoningStep {
        thought: response.thought.clone(),
        action: response.action.clone(),
        action_input: response.action_input.clone(),
        observation: None,
    });

    match response.final_answer {
        Some(answer) => {
            state.final_answer = Some(answer);
            state.is_complete = true;
        }
        None => {
            state.current_thought = Some(response.thought);
            state.current_action = response.action;
            state.current_action_input = response.action_input;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_action_and_json_input() {
        let raw = "Thought: need the position\nAction: stand_location\nAction Input: {\"value\": \"42\"}\n";
        let parsed = parse_react_response(raw).unwrap();
        assert_eq!(parsed.action.as_deref(), Some("stand_location"));
        assert_eq!(parsed.action_input.unwrap()["value"], "42");
    }

    #[test]
    fn parses_trivial_string_input_as_value_object() {
        let raw = "Thought: asking\nAction: ask\nAction Input: what is the position?\n";
        let parsed = parse_react_response(raw).unwrap();
        assert_eq!(parsed.action_input.unwrap()["value"], "what is the position?");
    }

    #[test]
    fn parses_final_answer() {
        let raw = "```\nThought: done\nFinal Answer: incident resolved\n```";
        let parsed = parse_react_response(raw).unwrap();
        assert_eq!(parsed.final_answer.as_deref(), Some("incident resolved"));
    }

    #[test]
    fn unparseable_text_returns_none() {
        assert!(parse_react_response("I am not sure what to do").is_none());
    }

    #[test]
    fn fallback_prefers_pending_p1_field() {
        use crate::types::{FieldDeclaration, RiskRuleSet};
        let scenario = ScenarioDescriptor {
            id: "oil_spill".to_string(),
            keywords: vec![],
            field_order: vec!["fluid_type".to_string()],
            field_names: Default::default(),
            ask_prompts: Default::default(),
            p1_fields: vec![FieldDeclaration { key: "fluid_type".to_string(), required: true, ..Default::default() }],
            p2_fields: vec![],
            fsm_states: vec![],
            mandatory_triggers: vec![],
            risk_rules: RiskRuleSet::Priority(vec![]),
            system_prompt: String::new(),
        };
        let state = SessionState::new("s1", "oil_spill");
        let response = fallback_response(&scenario, &state);
        assert_eq!(response.action.as_deref(), Some("smart_ask"));
    }
}
