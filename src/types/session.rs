//! Per-session mutable state (§3) — the value threaded through every agent
//! graph node. Nodes receive a clone (or a reference) and return a delta
//! that the graph merges back in; the session store owns the canonical
//! copy between turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{
    ActionRecord, ChatMessage, Checklist, FlightImpactPrediction, FlightPlanEntry,
    IncidentFields, NotificationRecord, ReasoningStep, ReferenceFlight, RiskAssessment,
    SpatialAnalysis, WeatherImpact,
};

/// Declared FSM phase identifier. Kept as a `String` rather than a closed
/// enum because the set of phases is scenario-supplied data (§9 "dynamic
/// FSM per scenario... treat scenario YAML as authoritative").
pub type FsmStateId = String;

/// The sentinel initial phase every scenario must declare (§3).
pub const FSM_INIT: &str = "INIT";
/// The sentinel terminal phase every scenario must declare (§3).
pub const FSM_COMPLETED: &str = "COMPLETED";

/// Full per-session state (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub scenario_type: String,
    pub created_at: DateTime<Utc>,

    pub incident: IncidentFields,
    pub checklist: Checklist,

    pub messages: Vec<ChatMessage>,
    pub reasoning_steps: Vec<ReasoningStep>,
    pub actions_taken: Vec<ActionRecord>,

    pub risk_assessment: Option<RiskAssessment>,
    pub spatial_analysis: Option<SpatialAnalysis>,

    pub flight_plan_table: Vec<FlightPlanEntry>,
    pub reference_flight: Option<ReferenceFlight>,
    pub flight_impact_prediction: Option<FlightImpactPrediction>,
    pub weather_impact: Option<WeatherImpact>,

    pub mandatory_actions_done: BTreeMap<String, bool>,
    pub notifications_sent: Vec<NotificationRecord>,

    pub fsm_state: FsmStateId,
    pub iteration_count: u32,
    pub is_complete: bool,
    pub awaiting_user: bool,

    pub final_report: Option<crate::output::FinalReport>,
    pub final_answer: Option<String>,

    /// The tool name/input the reasoning node selected this turn, consumed
    /// by the tool executor then cleared (§4.2, §4.3).
    pub current_thought: Option<String>,
    pub current_action: Option<String>,
    pub current_action_input: Option<serde_json::Value>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, scenario_type: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            scenario_type: scenario_type.into(),
            created_at: Utc::now(),
            incident: IncidentFields::new(),
            checklist: Checklist::new(),
            messages: Vec::new(),
            reasoning_steps: Vec::new(),
            actions_taken: Vec::new(),
            risk_assessment: None,
            spatial_analysis: None,
            flight_plan_table: Vec::new(),
            reference_flight: None,
            flight_impact_prediction: None,
            weather_impact: None,
            mandatory_actions_done: BTreeMap::new(),
            notifications_sent: Vec::new(),
            fsm_state: FSM_INIT.to_string(),
            iteration_count: 0,
            is_complete: false,
            awaiting_user: false,
            final_report: None,
            final_answer: None,
            current_thought: None,
            current_action: None,
            current_action_input: None,
        }
    }

    /// Whether `(department, priority)` was already notified (§4.3
    /// idempotence, §8 notification-idempotence invariant).
    pub fn already_notified(&self, department: &str, priority: &str) -> bool {
        self.notifications_sent
            .iter()
            .any(|n| n.department == department && n.priority == priority)
    }

    /// Read a boolean-ish state path such as `checklist.p1_complete` or
    /// `mandatory_actions_done.fire_dept_notified`, used by FSM
    /// precondition and mandatory-trigger evaluation (§4.4).
    pub fn read_path(&self, path: &str) -> Option<serde_json::Value> {
        let (root, rest) = path.split_once('.')?;
        match root {
            "checklist" => self
                .checklist
                .get(rest)
                .map(|b| serde_json::Value::Bool(*b)),
            "mandatory_actions_done" => self
                .mandatory_actions_done
                .get(rest)
                .map(|b| serde_json::Value::Bool(*b)),
            "incident" => self.incident.get(rest).map(|v| match v {
                super::FieldValue::Text(s) => serde_json::Value::String(s.clone()),
                super::FieldValue::Number(n) => serde_json::json!(n),
                super::FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            }),
            "risk_assessment" if rest == "level" => self
                .risk_assessment
                .as_ref()
                .map(|r| serde_json::Value::String(r.level.to_string())),
            "fsm_state" => Some(serde_json::Value::String(self.fsm_state.clone())),
            _ => None,
        }
    }
}
