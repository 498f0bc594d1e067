//! Request/response handlers for the `/event/*` surface (§6).
//!
//! Shaped after a `handlers.rs` of thin Axum handlers that read shared
//! state, build a response DTO, and map failures through a single
//! `ApiError` — generalised from read-only dashboard snapshots to
//! session-mutating turns.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::graph::{run_turn, NodeEvent};
use crate::storage::{new_session_id, StoreError};
use crate::types::{Checklist, FieldValue, FlightImpactPrediction, ReasoningStep, RiskLevel, SessionState, SpatialAnalysis};

use super::state::AppState;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, code: "NOT_FOUND", message: message.into() }
    }
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, code: "BAD_REQUEST", message: message.into() }
    }
    pub fn conflict(message: impl Into<String>) -> Self {
        Self { status: StatusCode::CONFLICT, code: "session_busy", message: message.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({"error": {"code": self.code, "message": self.message}});
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::not_found("session not found"),
            StoreError::SessionBusy => ApiError::conflict("a turn is already in flight for this session"),
            StoreError::Backend(msg) => {
                Self { status: StatusCode::INTERNAL_SERVER_ERROR, code: "STORAGE_ERROR", message: msg }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub message: String,
    pub scenario_type: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    pub message: String,
    pub scenario_type: Option<String>,
}

/// §6 response shape shared by `/event/start` and `/event/chat`.
#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub session_id: String,
    pub status: &'static str,
    pub message: String,
    pub fsm_state: String,
    pub checklist: Checklist,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    pub scenario_type: String,
    pub incident: BTreeMap<String, FieldValue>,
    pub fsm_states: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_question: Option<String>,
    pub reasoning_steps: Vec<ReasoningStep>,
    pub tool_calls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spatial_analysis: Option<SpatialAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flight_impact_prediction: Option<FlightImpactPrediction>,
}

impl TurnResponse {
    fn from_state(state: &SessionState, events: &[NodeEvent], fsm_states: Vec<String>) -> Self {
        let status = if state.is_complete {
            "completed"
        } else if state.awaiting_user {
            "processing"
        } else {
            "processing"
        };
        let next_question = events.iter().rev().find_map(|e| e.next_question.clone());
        let tool_calls = state.actions_taken.iter().map(|a| a.action.clone()).collect();
        Self {
            session_id: state.session_id.clone(),
            status,
            message: state.final_answer.clone().unwrap_or_default(),
            fsm_state: state.fsm_state.clone(),
            checklist: state.checklist.clone(),
            risk_level: state.risk_assessment.as_ref().map(|r| r.level),
            scenario_type: state.scenario_type.clone(),
            incident: state.incident.clone(),
            fsm_states,
            next_question,
            reasoning_steps: state.reasoning_steps.clone(),
            tool_calls,
            spatial_analysis: state.spatial_analysis.clone(),
            flight_impact_prediction: state.flight_impact_prediction.clone(),
        }
    }
}

fn fsm_state_ids(app: &AppState, scenario_type: &str) -> Vec<String> {
    app.scenarios
        .get(scenario_type)
        .map(|s| s.fsm_states.iter().map(|fs| fs.id.clone()).collect())
        .unwrap_or_default()
}

async fn load_or_create(
    app: &AppState,
    session_id: &str,
    scenario_hint: Option<&str>,
    message: &str,
) -> Result<SessionState, ApiError> {
    if let Some(existing) = app.store.get(session_id).await? {
        return Ok(existing);
    }
    let scenario_type = scenario_hint.map(str::to_string).unwrap_or_else(|| app.scenarios.identify(message));
    Ok(SessionState::new(session_id, scenario_type))
}

async fn run_one_turn(
    app: &AppState,
    session_id: &str,
    scenario_hint: Option<&str>,
    message: &str,
) -> Result<(SessionState, Vec<NodeEvent>), ApiError> {
    let lock = app.store.lock(session_id, app.lock_hold).await?;
    let mut state = load_or_create(app, session_id, scenario_hint, message).await?;
    let deps = app.graph_deps(&state.scenario_type).map_err(ApiError::bad_request)?;
    let events = run_turn(&deps, &mut state, message).await;
    app.store.put(session_id, state.clone(), Some(app.session_ttl)).await?;
    app.store.unlock(lock);
    Ok((state, events))
}

pub async fn start_turn(State(app): State<AppState>, Json(req): Json<StartRequest>) -> Result<Json<TurnResponse>, ApiError> {
    let session_id = req.session_id.unwrap_or_else(new_session_id);
    let (state, events) = run_one_turn(&app, &session_id, req.scenario_type.as_deref(), &req.message).await?;
    let fsm_states = fsm_state_ids(&app, &state.scenario_type);
    Ok(Json(TurnResponse::from_state(&state, &events, fsm_states)))
}

pub async fn chat_turn(State(app): State<AppState>, Json(req): Json<ChatRequest>) -> Result<Json<TurnResponse>, ApiError> {
    if app.store.get(&req.session_id).await?.is_none() {
        return Err(ApiError::not_found("session not found"));
    }
    let (state, events) = run_one_turn(&app, &req.session_id, None, &req.message).await?;
    let fsm_states = fsm_state_ids(&app, &state.scenario_type);
    Ok(Json(TurnResponse::from_state(&state, &events, fsm_states)))
}

pub async fn get_session(State(app): State<AppState>, Path(session_id): Path<String>) -> Result<Json<TurnResponse>, ApiError> {
    let state = app.store.get(&session_id).await?.ok_or_else(|| ApiError::not_found("session not found"))?;
    let fsm_states = fsm_state_ids(&app, &state.scenario_type);
    Ok(Json(TurnResponse::from_state(&state, &[], fsm_states)))
}

pub async fn delete_session(State(app): State<AppState>, Path(session_id): Path<String>) -> Result<StatusCode, ApiError> {
    app.store.delete(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_report(
    State(app): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<crate::output::FinalReport>, ApiError> {
    let state = app.store.get(&session_id).await?.ok_or_else(|| ApiError::not_found("session not found"))?;
    let report = state.final_report.ok_or_else(|| ApiError::not_found("report not yet available"))?;
    Ok(Json(report))
}

pub async fn get_report_markdown(
    State(app): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<String, ApiError> {
    let state = app.store.get(&session_id).await?.ok_or_else(|| ApiError::not_found("session not found"))?;
    let report = state.final_report.as_ref().ok_or_else(|| ApiError::not_found("report not yet available"))?;
    Ok(crate::output::render_markdown(report))
}

#[derive(Debug, Serialize)]
pub struct ParseResponse {
    pub scenario_type: String,
    pub incident: BTreeMap<String, FieldValue>,
    pub checklist: Checklist,
    pub enrichment_observation: String,
}

/// `/event/parse` (§6 "dry-run; does not open a session").
pub async fn parse_only(State(app): State<AppState>, Json(req): Json<ParseRequest>) -> Result<Json<ParseResponse>, ApiError> {
    let scenario_type = req.scenario_type.unwrap_or_else(|| app.scenarios.identify(&req.message));
    let scenario = app.scenarios.get(&scenario_type).ok_or_else(|| ApiError::bad_request(format!("unknown scenario: {scenario_type}")))?;

    let mut state = SessionState::new("parse-dry-run", scenario_type.clone());
    let outcome = crate::parser::parse_turn(app.llm.as_ref(), &scenario, &state.incident, &req.message).await;
    for (k, v) in outcome.incident {
        state.incident.insert(k, v);
    }
    state.checklist = outcome.checklist;
    let enrichment = crate::enrichment::enrich(&state, &app.ctx).await;
    enrichment.delta.apply(&mut state, &scenario.field_order);

    Ok(Json(ParseResponse {
        scenario_type: state.scenario_type,
        incident: state.incident,
        checklist: state.checklist,
        enrichment_observation: enrichment.observation,
    }))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

pub const LOCK_HOLD_DEFAULT: Duration = Duration::from_secs(30);
