//! Shared, read-only resources every tool may consult, and the delta shape
//! a tool hands back to the executor (§3 "a tool may only set fields it
//! declares", §4.3).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::llm::LlmClient;
use crate::output::FinalReport;
use crate::scenario::ScenarioRegistry;
use crate::topology::{PropagationTable, Topology};
use crate::types::{
    ActionRecord, FieldValue, FlightPlanEntry, FlightImpactPrediction,
    NotificationRecord, ReferenceFlight, RiskAssessment, SessionState, SpatialAnalysis, WeatherImpact,
};

/// External flight-schedule feed. §1 lists persistent data files (flight
/// schedules) as out of scope collaborators — only the interface is
/// defined here, with a simple in-memory implementation for local runs.
#[async_trait]
pub trait FlightDataProvider: Send + Sync {
    async fn flight_plan(&self, window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Vec<FlightPlanEntry>;
    async fn flight_by_no(&self, flight_no: &str) -> Option<FlightPlanEntry>;
}

/// External weather feed (§1 "persistent data files... weather records").
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current_weather(&self) -> Option<WeatherImpact>;
}

/// External aircraft-type/performance reference data.
#[async_trait]
pub trait AircraftInfoProvider: Send + Sync {
    async fn lookup(&self, flight_no: &str) -> Option<BTreeMap<String, FieldValue>>;
}

/// A no-op provider used when no external feed is configured; every lookup
/// reports "no data", which is a defined, recoverable outcome (§5 "missing
/// enrichment datum: warning; proceeds with partial context").
pub struct NullProviders;

#[async_trait]
impl FlightDataProvider for NullProviders {
    async fn flight_plan(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> Vec<FlightPlanEntry> {
        Vec::new()
    }
    async fn flight_by_no(&self, _flight_no: &str) -> Option<FlightPlanEntry> {
        None
    }
}

#[async_trait]
impl WeatherProvider for NullProviders {
    async fn current_weather(&self) -> Option<WeatherImpact> {
        None
    }
}

#[async_trait]
impl AircraftInfoProvider for NullProviders {
    async fn lookup(&self, _flight_no: &str) -> Option<BTreeMap<String, FieldValue>> {
        None
    }
}

/// Resources loaded once at startup and shared read-only across sessions
/// (§3 "Ownership and lifecycle", §5 "Shared resources").
pub struct ToolContext {
    pub topology: Arc<Topology>,
    pub propagation_table: Arc<PropagationTable>,
    pub cleanup_time_table: Arc<CleanupTimeTable>,
    pub delay_table: Arc<DelayTable>,
    pub flight_data: Arc<dyn FlightDataProvider>,
    pub weather: Arc<dyn WeatherProvider>,
    pub aircraft_info: Arc<dyn AircraftInfoProvider>,
    /// Scenario descriptors, consulted by tools that need the active
    /// scenario's declared fields/prompts (e.g. `smart_ask`, `assess_risk`).
    pub scenario: Arc<ScenarioRegistry>,
    /// The LLM seam, used by `cross_validate` and the stage-2 normaliser
    /// (§4.1 step 3, §4.5 cross-validation).
    pub llm: Arc<dyn LlmClient>,
}

/// Base cleanup-minutes lookup keyed by `"<fluid>|<leak_size>|<facility_class>"`
/// (§4.8 "3-axis table").
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct CleanupTimeTable {
    pub base_minutes: BTreeMap<String, u32>,
}

impl CleanupTimeTable {
    pub fn key(fluid: &str, leak_size: &str, facility_class: &str) -> String {
        format!("{fluid}|{leak_size}|{facility_class}")
    }

    pub fn base_for(&self, fluid: &str, leak_size: &str, facility_class: &str) -> u32 {
        self.base_minutes
            .get(&Self::key(fluid, leak_size, facility_class))
            .copied()
            .unwrap_or(30)
    }
}

/// Delay-minutes lookup keyed by `"<facility_type>|<risk_level>"` (§4.7 step 4).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct DelayTable {
    pub delay_minutes: BTreeMap<String, u32>,
}

impl DelayTable {
    pub fn key(facility_type: &str, risk_level: &str) -> String {
        format!("{facility_type}|{risk_level}")
    }

    pub fn delay_for(&self, facility_type: &str, risk_level: &str) -> u32 {
        self.delay_minutes
            .get(&Self::key(facility_type, risk_level))
            .copied()
            .unwrap_or(15)
    }
}

/// The state mutation a tool hands back to the executor. A tool only
/// populates the fields relevant to what it actually computed; every other
/// field is left at its default and the executor leaves that part of state
/// untouched (§3, §4.3 "a tool may only set fields it declares").
#[derive(Debug, Clone, Default)]
pub struct StateDelta {
    pub incident: BTreeMap<String, FieldValue>,
    pub checklist: BTreeMap<String, bool>,
    pub risk_assessment: Option<RiskAssessment>,
    pub spatial_analysis: Option<SpatialAnalysis>,
    pub flight_plan_table: Option<Vec<FlightPlanEntry>>,
    pub reference_flight: Option<ReferenceFlight>,
    pub flight_impact_prediction: Option<FlightImpactPrediction>,
    pub weather_impact: Option<WeatherImpact>,
    pub mandatory_actions_done: BTreeMap<String, bool>,
    pub notifications_sent: Vec<NotificationRecord>,
    pub final_report: Option<FinalReport>,
    pub final_answer: Option<String>,
    pub is_complete: bool,
    pub system_messages: Vec<String>,
}

impl StateDelta {
    pub fn action_record(&self, action: &str, success: bool, observation: &str) -> ActionRecord {
        ActionRecord {
            action: action.to_string(),
            timestamp: Utc::now(),
            inputs: serde_json::Value::Null,
            observation: observation.to_string(),
            success,
        }
    }

    /// Merge this delta into `state` (§4.3 "merges the declared state
    /// delta... a tool may only set fields it declares"). Append-only
    /// collections (§3) are extended, never replaced. `field_order` is the
    /// active scenario's declared field set; any incident key outside it
    /// (and outside the common set) is rejected and logged rather than
    /// written, the same field-filter invariant `parser::filter` enforces
    /// on the parser's own writes (§3, §8).
    pub fn apply(self, state: &mut SessionState, field_order: &[String]) {
        for (k, v) in self.incident {
            if crate::types::is_field_allowed(&k, field_order) {
                state.incident.insert(k, v);
            } else {
                state.messages.push(crate::types::ChatMessage::system(format!(
                    "[warning] field_filter: rejected key '{k}' not declared by scenario '{}'",
                    state.scenario_type
                )));
            }
        }
        for (k, v) in self.checklist {
            // §8 checklist monotonicity: never flip true back to false.
            let current = state.checklist.entry(k).or_insert(false);
            *current = *current || v;
        }
        if let Some(risk) = self.risk_assessment {
            state.risk_assessment = Some(risk);
        }
        if let Some(spatial) = self.spatial_analysis {
            state.spatial_analysis = Some(spatial);
        }
        if let Some(plan) = self.flight_plan_table {
            state.flight_plan_table = plan;
        }
        if let Some(reference) = self.reference_flight {
            state.reference_flight = Some(reference);
        }
        if let Some(prediction) = self.flight_impact_prediction {
            state.flight_impact_prediction = Some(prediction);
        }
        if let Some(weather) = self.weather_impact {
            state.weather_impact = Some(weather);
        }
        for (k, v) in self.mandatory_actions_done {
            let current = state.mandatory_actions_done.entry(k).or_insert(false);
            *current = *current || v;
        }
        for notification in self.notifications_sent {
            state.notifications_sent.push(notification);
        }
        if let Some(report) = self.final_report {
            state.final_report = Some(report);
        }
        if let Some(answer) = self.final_answer {
            state.final_answer = Some(answer);
        }
        if self.is_complete {
            state.is_complete = true;
        }
        for message in self.system_messages {
            state.messages.push(crate::types::ChatMessage::system(message));
        }
    }

    /// Apply only the risk-assessment portion, used by
    /// `ComprehensiveAnalysisTool` to build an intermediate view before
    /// running the impact-zone sub-step against it (§4.5, §4.6).
    pub fn apply_risk_only(&self, state: &mut SessionState) {
        if let Some(risk) = &self.risk_assessment {
            state.risk_assessment = Some(risk.clone());
        }
        for (k, v) in &self.mandatory_actions_done {
            let current = state.mandatory_actions_done.entry(k.clone()).or_insert(false);
            *current = *current || *v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionState;

    #[test]
    fn apply_rejects_incident_keys_outside_declared_field_set() {
        let mut state = SessionState::new("s1", "oil_spill");
        let mut delta = StateDelta::default();
        delta.incident.insert("fluid_type".to_string(), "FUEL".into());
        delta.incident.insert("flight_no".to_string(), "CCA1234".into());
        delta.incident.insert("aircraft_type".to_string(), "A320".into());

        delta.apply(&mut state, &["fluid_type".to_string()]);

        assert!(state.incident.contains_key("fluid_type"));
        assert!(state.incident.contains_key("flight_no")); // common field
        assert!(!state.incident.contains_key("aircraft_type"));
        assert!(state.messages.iter().any(|m| m.content.contains("rejected key 'aircraft_type'")));
    }
}
