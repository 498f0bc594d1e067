//! Action tools (§2, §4.3): department notification and final-report
//! generation — the two tools that actually change the outside world (or,
//! in this engine's scope, the session's terminal state).

use async_trait::async_trait;
use chrono::Utc;

use crate::output::generate_report;
use crate::types::{
    FieldKind, InputFieldSchema, NotificationRecord, SessionState, ToolCategory, ToolClass,
    ToolInputSchema,
};

use super::context::{StateDelta, ToolContext};
use super::{Tool, ToolRegistry, ToolResult};

fn common() -> Vec<String> {
    vec!["common".to_string()]
}

/// Notify a department of the incident (§2, §4.3 idempotence, §8
/// notification-idempotence invariant). Critical tool.
pub struct NotifyDepartmentTool;

#[async_trait]
impl Tool for NotifyDepartmentTool {
    fn name(&self) -> &str {
        "notify_department"
    }
    fn description(&self) -> &str {
        "Dispatch a notification to a coordination department at a given priority."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Action
    }
    fn class(&self) -> ToolClass {
        ToolClass::Critical
    }
    fn input_schema(&self) -> &ToolInputSchema {
        static SCHEMA: std::sync::OnceLock<ToolInputSchema> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(|| ToolInputSchema {
            fields: vec![
                InputFieldSchema {
                    name: "department".to_string(),
                    kind: FieldKind::String,
                    required: true,
                    enum_values: Vec::new(),
                    max_len: Some(64),
                },
                InputFieldSchema {
                    name: "priority".to_string(),
                    kind: FieldKind::String,
                    required: true,
                    enum_values: vec!["immediate".to_string(), "routine".to_string()],
                    max_len: Some(32),
                },
            ],
        })
    }
    fn scenarios(&self) -> &[String] {
        static SCENARIOS: std::sync::OnceLock<Vec<String>> = std::sync::OnceLock::new();
        SCENARIOS.get_or_init(common)
    }

    async fn execute(&self, state: &SessionState, _ctx: &ToolContext, input: &serde_json::Value) -> ToolResult {
        let Some(department) = input.get("department").and_then(|v| v.as_str()) else {
            return ToolResult::failed("invalid input: department is required");
        };
        let Some(priority) = input.get("priority").and_then(|v| v.as_str()) else {
            return ToolResult::failed("invalid input: priority is required");
        };

        // §4.3 idempotence: a no-op for an already-satisfied (department, priority) pair.
        let mandatory_key = format!("{department}_notified");
        if state.already_notified(department, priority)
            || state.mandatory_actions_done.get(&mandatory_key).copied().unwrap_or(false)
        {
            return ToolResult::ok(
                format!("{department} already notified at {priority} priority"),
                StateDelta::default(),
            );
        }

        let mut delta = StateDelta::default();
        delta.notifications_sent.push(NotificationRecord {
            department: department.to_string(),
            priority: priority.to_string(),
            timestamp: Utc::now(),
        });
        delta.mandatory_actions_done.insert(mandatory_key, true);
        ToolResult::ok(format!("notified {department} at {priority} priority"), delta)
    }
}

/// Render and finalise the session's report (§2, §4.3, §4.9). Critical
/// tool; refuses to run a second time once `is_complete` is set (§4.3,
/// §8 report-idempotence invariant).
pub struct GenerateReportTool;

#[async_trait]
impl Tool for GenerateReportTool {
    fn name(&self) -> &str {
        "generate_report"
    }
    fn description(&self) -> &str {
        "Render the final incident checklist/report and close out the session."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Action
    }
    fn class(&self) -> ToolClass {
        ToolClass::Critical
    }
    fn input_schema(&self) -> &ToolInputSchema {
        static SCHEMA: std::sync::OnceLock<ToolInputSchema> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(ToolInputSchema::default)
    }
    fn scenarios(&self) -> &[String] {
        static SCENARIOS: std::sync::OnceLock<Vec<String>> = std::sync::OnceLock::new();
        SCENARIOS.get_or_init(common)
    }

    async fn execute(&self, state: &SessionState, _ctx: &ToolContext, _input: &serde_json::Value) -> ToolResult {
        if state.is_complete {
            return ToolResult::failed("invalid input: report already generated for this session");
        }

        let report = generate_report(state);
        let final_answer = report.event_summary.clone();

        let mut delta = StateDelta::default();
        delta.final_report = Some(report);
        delta.final_answer = Some(final_answer);
        delta.is_complete = true;
        ToolResult::ok("final report generated", delta)
    }
}

pub fn register_all(registry: &mut ToolRegistry) {
    registry.register(std::sync::Arc::new(NotifyDepartmentTool));
    registry.register(std::sync::Arc::new(GenerateReportTool));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::ScenarioRegistry;
    use crate::tools::context::{CleanupTimeTable, DelayTable, NullProviders};
    use crate::topology::{PropagationTable, Topology};
    use crate::types::{TopologyFile, TopologyNode, NodeType};
    use std::sync::Arc;

    fn test_ctx() -> ToolContext {
        let topo = Topology::from_file(TopologyFile {
            nodes: vec![
                TopologyNode { id: "A".into(), node_type: NodeType::Stand, lat: 0.0, lon: 0.0 },
                TopologyNode { id: "B".into(), node_type: NodeType::Taxiway, lat: 0.001, lon: 0.0 },
            ],
            edges: vec![crate::types::TopologyEdge { from: "A".into(), to: "B".into(), distance: None }],
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
            llm: Arc::new(crate::llm::TemplateBackend),
        }
    }

    #[tokio::test]
    async fn notify_department_is_idempotent() {
        let ctx = test_ctx();
        let state = SessionState::new("s1", "oil_spill");
        let input = serde_json::json!({"department": "fire", "priority": "immediate"});

        let first = NotifyDepartmentTool.execute(&state, &ctx, &input).await;
        assert!(first.success);
        let mut state2 = state.clone();
        first.delta.apply(&mut state2, &[]);

        let second = NotifyDepartmentTool.execute(&state2, &ctx, &input).await;
        assert!(second.success);
        assert!(second.observation.contains("already notified"));
        assert_eq!(state2.notifications_sent.len(), 1);
    }

    #[tokio::test]
    async fn generate_report_refuses_second_run() {
        let ctx = test_ctx();
        let mut state = SessionState::new("s1", "oil_spill");

        let first = GenerateReportTool.execute(&state, &ctx, &serde_json::Value::Null).await;
        assert!(first.success);
        first.delta.apply(&mut state, &[]);
        assert!(state.is_complete);

        let second = GenerateReportTool.execute(&state, &ctx, &serde_json::Value::Null).await;
        assert!(!second.success);
    }
}
