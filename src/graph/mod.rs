//! The agent graph (§4.10): wires input parsing, enrichment, ReAct
//! reasoning, tool execution, and FSM validation into the per-turn loop,
//! under a recursion bound, yielding one streamable event per node.
//!
//! Shaped after a `director` orchestration loop (`director/` drives
//! sense -> assess -> act -> log each tick, bounded by a max-tick guard)
//! — generalised here from a fixed four-stage tick to the conditional
//! routing between reasoning, the tool executor, and the FSM validator.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::executor;
use crate::fsm;
use crate::llm::LlmClient;
use crate::parser;
use crate::reasoning;
use crate::tools::{ToolContext, ToolRegistry};
use crate::types::{ChatMessage, Checklist, FlightImpactPrediction, RiskAssessment, ScenarioDescriptor, SessionState, SpatialAnalysis, FSM_COMPLETED};

/// One streamable progress frame (§6 SSE frame shape). Only fields that
/// changed in the last node execution are populated; consumers merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEvent {
    pub node: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fsm_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checklist: Option<Checklist>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_thought: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_action_input: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_observation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_assessment: Option<RiskAssessment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spatial_analysis: Option<SpatialAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flight_impact_prediction: Option<FlightImpactPrediction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_complete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
}

impl NodeEvent {
    fn new(node: impl Into<String>, state: &SessionState) -> Self {
        Self {
            node: node.into(),
            timestamp: Utc::now(),
            session_id: state.session_id.clone(),
            fsm_state: None,
            checklist: None,
            current_thought: None,
            current_action: None,
            current_action_input: None,
            current_observation: None,
            risk_assessment: None,
            spatial_analysis: None,
            flight_impact_prediction: None,
            next_question: None,
            is_complete: None,
            final_answer: None,
        }
    }

    fn with_fsm_snapshot(mut self, state: &SessionState) -> Self {
        self.fsm_state = Some(state.fsm_state.clone());
        self.checklist = Some(state.checklist.clone());
        self.risk_assessment = state.risk_assessment.clone();
        self.spatial_analysis = state.spatial_analysis.clone();
        self.flight_impact_prediction = state.flight_impact_prediction.clone();
        self.is_complete = Some(state.is_complete);
        self
    }
}

/// Shared, read-only resources a turn needs (§3 "Ownership and lifecycle").
pub struct GraphDeps {
    pub llm: Arc<dyn LlmClient>,
    pub registry: Arc<ToolRegistry>,
    pub scenario: Arc<ScenarioDescriptor>,
    pub ctx: Arc<ToolContext>,
    pub recursion_limit: u32,
}

const RECURSION_ABORT_MESSAGE: &str = "处置流程中断，请人工介入";

/// Run one full turn: parse the incoming message, enrich, then loop
/// reasoning -> tool executor -> (fsm validator) until the session
/// completes, awaits the next user turn, or the recursion bound trips
/// (§4.10).
pub async fn run_turn(deps: &GraphDeps, state: &mut SessionState, message: &str) -> Vec<NodeEvent> {
    let mut events = Vec::new();
    state.messages.push(ChatMessage::user(message));

    run_input_parser(deps, state, message, &mut events).await;

    let mut node_count = 0u32;
    loop {
        if state.is_complete {
            run_output_generator(state, &mut events);
            break;
        }

        node_count += 1;
        if node_count > deps.recursion_limit {
            abort_on_recursion_limit(state, &mut events);
            break;
        }

        reasoning::run_reasoning_node(deps.llm.as_ref(), &deps.registry, &deps.scenario, state).await;
        events.push(
            NodeEvent::new("reasoning", state)
                .with_fsm_snapshot(state)
                .tap(|e| {
                    e.current_thought = state.current_thought.clone();
                    e.current_action = state.current_action.clone();
                    e.current_action_input = state.current_action_input.clone();
                    e.final_answer = state.final_answer.clone();
                    e.next_question = state
                        .current_action
                        .as_deref()
                        .filter(|a| *a == "ask" || *a == "smart_ask")
                        .and_then(|_| state.current_action_input.as_ref())
                        .and_then(|v| v.get("value"))
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                }),
        );

        if state.is_complete {
            continue;
        }

        let Some(action) = state.current_action.clone() else {
            // No action, no final answer: await the next user turn (§4.10).
            break;
        };
        let input = state.current_action_input.clone().unwrap_or(serde_json::Value::Null);

        node_count += 1;
        if node_count > deps.recursion_limit {
            abort_on_recursion_limit(state, &mut events);
            break;
        }

        let outcome = executor::execute_tool(&deps.registry, &deps.ctx, state, &action, input).await;
        let observation = state.actions_taken.last().map(|a| a.observation.clone());
        events.push(NodeEvent::new("tool_executor", state).with_fsm_snapshot(state).tap(|e| {
            e.current_action = Some(action.clone());
            e.current_observation = observation.clone();
        }));

        if outcome.is_err() {
            // Unknown tool name: surface as an observation the LLM can
            // recover from next turn rather than aborting (§4.3, §7).
            continue;
        }

        if !executor::is_critical(&deps.registry, &action) {
            continue;
        }

        node_count += 1;
        if node_count > deps.recursion_limit {
            abort_on_recursion_limit(state, &mut events);
            break;
        }

        let validation = fsm::validate(&deps.scenario, state);
        events.push(NodeEvent::new("fsm_validator", state).with_fsm_snapshot(state));

        if !validation.errors.is_empty() {
            for error in &validation.errors {
                state.messages.push(ChatMessage::system(error.clone()));
            }
            continue;
        }
        if validation.inferred_state == FSM_COMPLETED {
            run_output_generator(state, &mut events);
            break;
        }
        if !validation.pending_actions.is_empty() {
            let summary = validation
                .pending_actions
                .iter()
                .map(|p| p.action.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            state.messages.push(ChatMessage::system(format!("pending mandatory actions: {summary}")));
        }
    }

    events
}

async fn run_input_parser(deps: &GraphDeps, state: &mut SessionState, message: &str, events: &mut Vec<NodeEvent>) {
    let outcome = parser::parse_turn(deps.llm.as_ref(), &deps.scenario, &state.incident, message).await;
    for (key, value) in outcome.incident {
        state.incident.insert(key, value);
    }
    for (key, value) in outcome.checklist {
        let current = state.checklist.entry(key).or_insert(false);
        *current = *current || value;
    }
    for warning in &outcome.system_messages {
        state.messages.push(ChatMessage::system(warning.clone()));
    }

    let enrichment = crate::enrichment::enrich(state, &deps.ctx).await;
    enrichment.delta.apply(state, &deps.scenario.field_order);

    events.push(NodeEvent::new("input_parser", state).with_fsm_snapshot(state).tap(|e| {
        e.current_observation = Some(enrichment.observation);
    }));
}

fn run_output_generator(state: &mut SessionState, events: &mut Vec<NodeEvent>) {
    if state.final_report.is_none() {
        let report = crate::output::generate_report(state);
        if state.final_answer.is_none() {
            state.final_answer = Some(report.event_summary.clone());
        }
        state.final_report = Some(report);
    }
    state.awaiting_user = true;
    state.is_complete = true;
    events.push(NodeEvent::new("output_generator", state).with_fsm_snapshot(state).tap(|e| {
        e.final_answer = state.final_answer.clone();
    }));
}

fn abort_on_recursion_limit(state: &mut SessionState, events: &mut Vec<NodeEvent>) {
    state.awaiting_user = true;
    state.final_answer = Some(RECURSION_ABORT_MESSAGE.to_string());
    events.push(NodeEvent::new("recursion_limit", state).with_fsm_snapshot(state).tap(|e| {
        e.final_answer = state.final_answer.clone();
    }));
}

impl NodeEvent {
    fn tap(mut self, f: impl FnOnce(&mut Self)) -> Self {
        f(&mut self);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::TemplateBackend;
    use crate::scenario::ScenarioRegistry;
    use crate::tools::context::{CleanupTimeTable, DelayTable, NullProviders};
    use crate::tools::ToolRegistry;
    use crate::topology::{PropagationTable, Topology};
    use crate::types::{FieldDeclaration, FsmStateDescriptor, NodeType, RiskRuleSet, TopologyFile, TopologyNode};

    fn ensure_config() {
        if !crate::config::is_initialized() {
            crate::config::init(crate::config::EngineConfig::load());
        }
    }

    fn test_scenario() -> ScenarioDescriptor {
        ScenarioDescriptor {
            id: "oil_spill".to_string(),
            keywords: vec![],
            field_order: vec!["fluid_type".to_string()],
            field_names: Default::default(),
            ask_prompts: Default::default(),
            p1_fields: vec![FieldDeclaration { key: "fluid_type".to_string(), required: true, ..Default::default() }],
            p2_fields: vec![],
            fsm_states: vec![FsmStateDescriptor { id: "INIT".to_string(), order: 0, name: "init".to_string(), preconditions: vec![], next_states: vec![] }],
            mandatory_triggers: vec![],
            risk_rules: RiskRuleSet::Priority(vec![]),
            system_prompt: "You coordinate an oil-spill response.".to_string(),
        }
    }

    fn test_deps() -> GraphDeps {
        ensure_config();
        let topo = Topology::from_file(TopologyFile {
            nodes: vec![TopologyNode { id: "STAND_1".into(), node_type: NodeType::Stand, lat: 0.0, lon: 0.0 }],
            edges: vec![],
        })
        .unwrap();
        GraphDeps {
            llm: Arc::new(TemplateBackend),
            registry: Arc::new(ToolRegistry::with_default_tools()),
            scenario: Arc::new(test_scenario()),
            ctx: Arc::new(ToolContext {
                topology: Arc::new(topo),
                propagation_table: Arc::new(PropagationTable::default()),
                cleanup_time_table: Arc::new(CleanupTimeTable::default()),
                delay_table: Arc::new(DelayTable::default()),
                flight_data: Arc::new(NullProviders),
                weather: Arc::new(NullProviders),
                aircraft_info: Arc::new(NullProviders),
                scenario: Arc::new(ScenarioRegistry::load_inline(Vec::new())),
                llm: Arc::new(TemplateBackend),
            }),
            recursion_limit: 50,
        }
    }

    #[tokio::test]
    async fn turn_with_unavailable_llm_falls_back_to_smart_ask() {
        let deps = test_deps();
        let mut state = SessionState::new("s1", "oil_spill");
        let events = run_turn(&deps, &mut state, "机位42 发生燃油泄漏").await;

        assert!(events.iter().any(|e| e.node == "input_parser"));
        assert!(events.iter().any(|e| e.node == "reasoning"));
        assert!(!state.is_complete);
    }

    #[tokio::test]
    async fn recursion_limit_aborts_with_chinese_message() {
        let mut deps = test_deps();
        deps.recursion_limit = 0;
        let mut state = SessionState::new("s1", "oil_spill");
        let events = run_turn(&deps, &mut state, "机位42 发生燃油泄漏").await;

        assert_eq!(state.final_answer.as_deref(), Some(RECURSION_ABORT_MESSAGE));
        assert!(state.awaiting_user);
        assert!(events.iter().any(|e| e.node == "recursion_limit"));
    }
}
