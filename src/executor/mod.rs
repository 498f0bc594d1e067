//! Tool executor (§4.3): resolves the selected tool by name, validates its
//! input against the declared schema, runs it, merges the returned delta,
//! and appends the action record the reasoning node sees next turn.

use chrono::Utc;
use thiserror::Error;

use crate::tools::{Tool, ToolContext, ToolRegistry, ToolResult};
use crate::types::{ActionRecord, FieldKind, InputFieldSchema, SessionState, ToolInputSchema};

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

/// Validate `input` against `schema` (§4.3: "types, required fields, enum
/// constraints, bounded string lengths"). Returns the first violation
/// found, or `None` if the input passes.
pub fn validate_input(schema: &ToolInputSchema, input: &serde_json::Value) -> Option<String> {
    for field in &schema.fields {
        let value = input.get(&field.name);
        match value {
            None if field.required => return Some(format!("invalid input: {} is required", field.name)),
            None => continue,
            Some(v) => {
                if let Some(reason) = validate_field(field, v) {
                    return Some(reason);
                }
            }
        }
    }
    None
}

fn validate_field(field: &InputFieldSchema, value: &serde_json::Value) -> Option<String> {
    let type_ok = match field.kind {
        FieldKind::String => value.is_string(),
        FieldKind::Number => value.is_number(),
        FieldKind::Bool => value.is_boolean(),
    };
    if !type_ok {
        return Some(format!("invalid input: {} must be {:?}", field.name, field.kind));
    }
    if let (FieldKind::String, Some(text)) = (field.kind, value.as_str()) {
        if let Some(max_len) = field.max_len {
            if text.chars().count() > max_len {
                return Some(format!("invalid input: {} exceeds max length {max_len}", field.name));
            }
        }
        if !field.enum_values.is_empty() && !field.enum_values.iter().any(|v| v == text) {
            return Some(format!("invalid input: {} must be one of {:?}", field.name, field.enum_values));
        }
    }
    None
}

/// Resolve, validate, execute, and merge one tool call by name (§4.3).
/// Returns `Err` only when the tool name itself doesn't resolve — every
/// other failure mode (validation, tool-internal) is represented as a
/// `{success:false, ...}` action record, never an `Err`, since tool
/// execution must never fail the turn (§4.3, §7).
pub async fn execute_tool(
    registry: &ToolRegistry,
    ctx: &ToolContext,
    state: &mut SessionState,
    tool_name: &str,
    input: serde_json::Value,
) -> Result<(), ExecutorError> {
    let Some(tool) = registry.get(tool_name) else {
        return Err(ExecutorError::UnknownTool(tool_name.to_string()));
    };

    let result = if let Some(reason) = validate_input(tool.input_schema(), &input) {
        ToolResult::failed(reason)
    } else {
        tool.execute(state, ctx, &input).await
    };

    let field_order = ctx
        .scenario
        .get(&state.scenario_type)
        .map(|s| s.field_order.clone())
        .unwrap_or_default();
    apply_result(state, tool_name, input, result, &field_order);
    Ok(())
}

fn apply_result(state: &mut SessionState, tool_name: &str, input: serde_json::Value, result: ToolResult, field_order: &[String]) {
    state.actions_taken.push(ActionRecord {
        action: tool_name.to_string(),
        timestamp: Utc::now(),
        inputs: input,
        observation: result.observation.clone(),
        success: result.success,
    });
    if let Some(step) = state.reasoning_steps.last_mut() {
        step.observation = Some(result.observation);
    }
    if result.success {
        result.delta.apply(state, field_order);
    }
    state.current_thought = None;
    state.current_action = None;
    state.current_action_input = None;
}

/// Whether `tool_name` requires an FSM validation pass immediately after
/// running (§4.4: `assess_risk`, `calculate_impact_zone`, `notify_department`).
pub fn is_critical(registry: &ToolRegistry, tool_name: &str) -> bool {
    registry
        .get(tool_name)
        .map(|tool| matches!(tool.class(), crate::types::ToolClass::Critical))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::TemplateBackend;
    use crate::scenario::ScenarioRegistry;
    use crate::tools::context::{CleanupTimeTable, DelayTable, NullProviders};
    use crate::topology::{PropagationTable, Topology};
    use crate::types::{NodeType, TopologyFile, TopologyNode};
    use std::sync::Arc;

    fn test_ctx() -> ToolContext {
        let topo = Topology::from_file(TopologyFile {
            nodes: vec![TopologyNode { id: "STAND_1".into(), node_type: NodeType::Stand, lat: 0.0, lon: 0.0 }],
            edges: vec![],
        })
        .unwrap();
        ToolContext {
            topology: Arc::new(topo),
            propagation_table: Arc::new(PropagationTable::default()),
            cleanup_time_table: Arc::new(CleanupTimeTable::default()),
            delay_table: Arc::new(DelayTable::default()),
            flight_data: Arc::new(NullProviders),
            weather: Arc::new(NullProviders),
            aircraft_info: Arc::new(NullProviders),
            scenario: Arc::new(ScenarioRegistry::load_inline(Vec::new())),
            llm: Arc::new(TemplateBackend),
        }
    }

    #[tokio::test]
    async fn unknown_tool_name_is_an_error() {
        let registry = ToolRegistry::with_default_tools();
        let ctx = test_ctx();
        let mut state = SessionState::new("s1", "oil_spill");
        let result = execute_tool(&registry, &ctx, &mut state, "does_not_exist", serde_json::Value::Null).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn invalid_input_does_not_mutate_state() {
        let registry = ToolRegistry::with_default_tools();
        let ctx = test_ctx();
        let mut state = SessionState::new("s1", "oil_spill");
        execute_tool(&registry, &ctx, &mut state, "notify_department", serde_json::json!({})).await.unwrap();
        assert!(state.notifications_sent.is_empty());
        assert_eq!(state.actions_taken.last().unwrap().success, false);
    }

    #[tokio::test]
    async fn valid_call_merges_delta_and_records_action() {
        let registry = ToolRegistry::with_default_tools();
        let ctx = test_ctx();
        let mut state = SessionState::new("s1", "oil_spill");
        execute_tool(
            &registry,
            &ctx,
            &mut state,
            "notify_department",
            serde_json::json!({"department": "fire", "priority": "immediate"}),
        )
        .await
        .unwrap();
        assert_eq!(state.notifications_sent.len(), 1);
        assert!(state.actions_taken.last().unwrap().success);
        assert!(is_critical(&registry, "notify_department"));
    }
}
