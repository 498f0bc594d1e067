//! Information tools (§2): `ask`, `smart_ask`, flight-plan lookup, weather,
//! aircraft info, and the radiotelephony normaliser exposed as an
//! on-demand tool (the same logic the parser runs unconditionally at
//! stage 1, §4.1 step 2).

use async_trait::async_trait;
use chrono::Utc;

use crate::parser::normalise::stage1_normalise;
use crate::types::{FieldKind, InputFieldSchema, SessionState, ToolCategory, ToolClass, ToolInputSchema};

use super::context::{StateDelta, ToolContext};
use super::{Tool, ToolRegistry, ToolResult};

fn common() -> Vec<String> {
    vec!["common".to_string()]
}

/// Ask the controller a direct clarifying question (§2). A no-op on state;
/// its only effect is the observation text the reasoning node surfaces as
/// `next_question` to the caller.
pub struct AskTool;

#[async_trait]
impl Tool for AskTool {
    fn name(&self) -> &str {
        "ask"
    }
    fn description(&self) -> &str {
        "Ask the controller a direct clarifying question about a missing field."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Information
    }
    fn class(&self) -> ToolClass {
        ToolClass::Ordinary
    }
    fn input_schema(&self) -> &ToolInputSchema {
        static SCHEMA: std::sync::OnceLock<ToolInputSchema> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(|| ToolInputSchema {
            fields: vec![InputFieldSchema {
                name: "value".to_string(),
                kind: FieldKind::String,
                required: true,
                enum_values: Vec::new(),
                max_len: Some(500),
            }],
        })
    }
    fn scenarios(&self) -> &[String] {
        static SCENARIOS: std::sync::OnceLock<Vec<String>> = std::sync::OnceLock::new();
        SCENARIOS.get_or_init(common)
    }

    async fn execute(&self, _state: &SessionState, _ctx: &ToolContext, input: &serde_json::Value) -> ToolResult {
        let question = input_value_as_str(input).unwrap_or("请补充相关信息");
        ToolResult::ok(question.to_string(), StateDelta::default())
    }
}

/// Ask the highest-priority missing P1 field, chosen by the scenario's
/// declared field order rather than a value the LLM supplies (§4.2
/// fallback heuristic reuses the same selection logic).
pub struct SmartAskTool;

/// Pick the highest-priority (first in `field_order`) P1 field still
/// missing from the checklist (§4.2 "the highest-priority pending P1
/// field -> smart_ask").
pub fn next_pending_p1_field<'a>(
    scenario: &'a crate::types::ScenarioDescriptor,
    checklist: &std::collections::BTreeMap<String, bool>,
) -> Option<&'a str> {
    scenario.p1_field_keys().into_iter().find(|key| !checklist.get(*key).copied().unwrap_or(false))
}

#[async_trait]
impl Tool for SmartAskTool {
    fn name(&self) -> &str {
        "smart_ask"
    }
    fn description(&self) -> &str {
        "Ask for the single highest-priority missing mandatory field."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Information
    }
    fn class(&self) -> ToolClass {
        ToolClass::Ordinary
    }
    fn input_schema(&self) -> &ToolInputSchema {
        static SCHEMA: std::sync::OnceLock<ToolInputSchema> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(ToolInputSchema::default)
    }
    fn scenarios(&self) -> &[String] {
        static SCENARIOS: std::sync::OnceLock<Vec<String>> = std::sync::OnceLock::new();
        SCENARIOS.get_or_init(common)
    }

    async fn execute(&self, state: &SessionState, ctx: &ToolContext, _input: &serde_json::Value) -> ToolResult {
        let Some(scenario) = ctx.scenario.get(&state.scenario_type) else {
            return ToolResult::failed("invalid input: unknown scenario");
        };
        match next_pending_p1_field(&scenario, &state.checklist) {
            Some(field) => {
                let prompt = scenario
                    .ask_prompts
                    .get(field)
                    .cloned()
                    .unwrap_or_else(|| format!("请提供 {field}"));
                ToolResult::ok(prompt, StateDelta::default())
            }
            None => ToolResult::ok("all mandatory fields collected".to_string(), StateDelta::default()),
        }
    }
}

/// Look up the scheduled flight plan around a reference window (§2, §4.7
/// step 3 consumes this table).
pub struct FlightPlanLookupTool;

#[async_trait]
impl Tool for FlightPlanLookupTool {
    fn name(&self) -> &str {
        "flight_plan_lookup"
    }
    fn description(&self) -> &str {
        "Fetch the flight-plan table around the incident time window."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Information
    }
    fn class(&self) -> ToolClass {
        ToolClass::Ordinary
    }
    fn input_schema(&self) -> &ToolInputSchema {
        static SCHEMA: std::sync::OnceLock<ToolInputSchema> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(ToolInputSchema::default)
    }
    fn scenarios(&self) -> &[String] {
        static SCENARIOS: std::sync::OnceLock<Vec<String>> = std::sync::OnceLock::new();
        SCENARIOS.get_or_init(common)
    }

    async fn execute(&self, state: &SessionState, ctx: &ToolContext, _input: &serde_json::Value) -> ToolResult {
        let reference_time = crate::tools::spatial::reference_time(state).unwrap_or_else(Utc::now);
        let window_end = reference_time + chrono::Duration::hours(2);
        let plan = ctx.flight_data.flight_plan(reference_time, window_end).await;

        let mut delta = StateDelta::default();
        let count = plan.len();
        delta.flight_plan_table = Some(plan);
        ToolResult::ok(format!("flight plan: {count} entries in window"), delta)
    }
}

/// Current weather reading, used by spatial BFS radius adjustment and
/// cleanup-time estimation (§4.6, §4.8).
pub struct WeatherTool;

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "weather"
    }
    fn description(&self) -> &str {
        "Fetch the current wind/temperature/visibility reading."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Information
    }
    fn class(&self) -> ToolClass {
        ToolClass::Ordinary
    }
    fn input_schema(&self) -> &ToolInputSchema {
        static SCHEMA: std::sync::OnceLock<ToolInputSchema> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(ToolInputSchema::default)
    }
    fn scenarios(&self) -> &[String] {
        static SCENARIOS: std::sync::OnceLock<Vec<String>> = std::sync::OnceLock::new();
        SCENARIOS.get_or_init(common)
    }

    async fn execute(&self, _state: &SessionState, ctx: &ToolContext, _input: &serde_json::Value) -> ToolResult {
        match ctx.weather.current_weather().await {
            Some(weather) => {
                let mut delta = StateDelta::default();
                let summary = format!(
                    "wind {:.1} m/s @ {:.0}deg, total_factor {:.2}",
                    weather.wind_impact.speed, weather.wind_impact.direction, weather.total_factor
                );
                delta.weather_impact = Some(weather);
                ToolResult::ok(summary, delta)
            }
            None => {
                let mut delta = StateDelta::default();
                delta.system_messages.push("[warning] weather: no data available".to_string());
                ToolResult::ok("no weather data available", delta)
            }
        }
    }
}

/// Aircraft type/performance reference lookup by flight number (§2).
pub struct AircraftInfoTool;

#[async_trait]
impl Tool for AircraftInfoTool {
    fn name(&self) -> &str {
        "aircraft_info"
    }
    fn description(&self) -> &str {
        "Look up aircraft type and performance data for a flight number."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Information
    }
    fn class(&self) -> ToolClass {
        ToolClass::Ordinary
    }
    fn input_schema(&self) -> &ToolInputSchema {
        static SCHEMA: std::sync::OnceLock<ToolInputSchema> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(|| ToolInputSchema {
            fields: vec![InputFieldSchema {
                name: "flight_no".to_string(),
                kind: FieldKind::String,
                required: true,
                enum_values: Vec::new(),
                max_len: Some(16),
            }],
        })
    }
    fn scenarios(&self) -> &[String] {
        static SCENARIOS: std::sync::OnceLock<Vec<String>> = std::sync::OnceLock::new();
        SCENARIOS.get_or_init(common)
    }

    async fn execute(&self, state: &SessionState, ctx: &ToolContext, input: &serde_json::Value) -> ToolResult {
        let flight_no = input_value_as_str(input)
            .or_else(|| state.incident.get("flight_no").and_then(|v| v.as_text()))
            .unwrap_or_default()
            .to_string();
        if flight_no.is_empty() {
            return ToolResult::failed("invalid input: flight_no is required");
        }
        match ctx.aircraft_info.lookup(&flight_no).await {
            Some(fields) => {
                let mut delta = StateDelta::default();
                delta.incident = fields;
                ToolResult::ok(format!("aircraft info found for {flight_no}"), delta)
            }
            None => {
                let mut delta = StateDelta::default();
                delta.system_messages.push("[warning] aircraft_info: no data available".to_string());
                ToolResult::ok("no aircraft info available", delta)
            }
        }
    }
}

/// Run the deterministic radiotelephony normalisation on demand (§4.1
/// step 2), exposed as a tool so the LLM can re-normalise free text mid
/// conversation.
pub struct NormalizeRadiotelephonyTool;

#[async_trait]
impl Tool for NormalizeRadiotelephonyTool {
    fn name(&self) -> &str {
        "normalize_radiotelephony"
    }
    fn description(&self) -> &str {
        "Normalise spoken-form radiotelephony text into structured identifiers."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Information
    }
    fn class(&self) -> ToolClass {
        ToolClass::Ordinary
    }
    fn input_schema(&self) -> &ToolInputSchema {
        static SCHEMA: std::sync::OnceLock<ToolInputSchema> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(|| ToolInputSchema {
            fields: vec![InputFieldSchema {
                name: "value".to_string(),
                kind: FieldKind::String,
                required: true,
                enum_values: Vec::new(),
                max_len: Some(2000),
            }],
        })
    }
    fn scenarios(&self) -> &[String] {
        static SCENARIOS: std::sync::OnceLock<Vec<String>> = std::sync::OnceLock::new();
        SCENARIOS.get_or_init(common)
    }

    async fn execute(&self, _state: &SessionState, _ctx: &ToolContext, input: &serde_json::Value) -> ToolResult {
        let Some(text) = input_value_as_str(input) else {
            return ToolResult::failed("invalid input: value is required");
        };
        let normalised = stage1_normalise(text);
        ToolResult::ok(normalised, StateDelta::default())
    }
}

fn input_value_as_str(input: &serde_json::Value) -> Option<&str> {
    input.get("value").and_then(|v| v.as_str()).or_else(|| input.as_str())
}

pub fn register_all(registry: &mut ToolRegistry) {
    registry.register(std::sync::Arc::new(AskTool));
    registry.register(std::sync::Arc::new(SmartAskTool));
    registry.register(std::sync::Arc::new(FlightPlanLookupTool));
    registry.register(std::sync::Arc::new(WeatherTool));
    registry.register(std::sync::Arc::new(AircraftInfoTool));
    registry.register(std::sync::Arc::new(NormalizeRadiotelephonyTool));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::ScenarioRegistry;
    use crate::tools::context::{CleanupTimeTable, DelayTable, NullProviders};
    use crate::topology::{PropagationTable, Topology};
    use crate::types::{NodeType, TopologyEdge, TopologyFile, TopologyNode};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    /// Stubs an external feed that returns a field the active scenario
    /// never declares, the way a real aircraft-registry lookup could.
    struct OverReportingAircraftInfo;

    #[async_trait]
    impl super::super::context::AircraftInfoProvider for OverReportingAircraftInfo {
        async fn lookup(&self, _flight_no: &str) -> Option<BTreeMap<String, crate::types::FieldValue>> {
            let mut fields = BTreeMap::new();
            fields.insert("aircraft_type".to_string(), "A320".into());
            fields.insert("fluid_type".to_string(), "FUEL".into());
            Some(fields)
        }
    }

    fn test_ctx() -> ToolContext {
        let topo = Topology::from_file(TopologyFile {
            nodes: vec![TopologyNode { id: "A".into(), node_type: NodeType::Stand, lat: 0.0, lon: 0.0 }],
            edges: Vec::<TopologyEdge>::new(),
        })
        .unwrap();

        ToolContext {
            topology: Arc::new(topo),
            propagation_table: Arc::new(PropagationTable::default()),
            cleanup_time_table: Arc::new(CleanupTimeTable::default()),
            delay_table: Arc::new(DelayTable::default()),
            flight_data: Arc::new(NullProviders),
            weather: Arc::new(NullProviders),
            aircraft_info: Arc::new(OverReportingAircraftInfo),
            scenario: Arc::new(ScenarioRegistry::load_inline(Vec::new())),
            llm: Arc::new(crate::llm::TemplateBackend),
        }
    }

    #[tokio::test]
    async fn aircraft_info_fields_outside_field_order_are_rejected_on_apply() {
        let ctx = test_ctx();
        let mut state = SessionState::new("s1", "oil_spill");
        state.incident.insert("flight_no".to_string(), "CCA1234".into());

        let result = AircraftInfoTool.execute(&state, &ctx, &serde_json::Value::Null).await;
        assert!(result.success);

        // Scenario only declares `fluid_type`; `aircraft_type` is not in
        // `field_order` or the common field set.
        result.delta.apply(&mut state, &["fluid_type".to_string()]);

        assert!(state.incident.contains_key("fluid_type"));
        assert!(!state.incident.contains_key("aircraft_type"));
        assert!(state.messages.iter().any(|m| m.content.contains("rejected key 'aircraft_type'")));
    }
}
