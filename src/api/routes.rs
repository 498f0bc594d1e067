//! Route table for the `/event/*` surface (§6), plus the two SSE-streaming
//! variants.
//!
//! Shaped after an `api_routes(state) -> Router` pattern — one `.route`
//! call per endpoint, nested under a version prefix, returned to
//! `create_app` for layering.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream};

use crate::graph::{run_turn, NodeEvent};
use crate::storage::new_session_id;

use super::handlers::{self, ApiError, ChatRequest, StartRequest};
use super::state::AppState;

pub fn event_routes() -> Router<AppState> {
    Router::new()
        .route("/event/start", post(handlers::start_turn))
        .route("/event/chat", post(handlers::chat_turn))
        .route("/event/parse", post(handlers::parse_only))
        .route("/event/start/stream", post(start_stream))
        .route("/event/chat/stream", post(chat_stream))
        .route("/event/:session_id", get(handlers::get_session).delete(handlers::delete_session))
        .route("/event/:session_id/report", get(handlers::get_report))
        .route("/event/:session_id/report/markdown", get(handlers::get_report_markdown))
        .route("/health", get(handlers::health))
}

fn node_event_to_sse(event: &NodeEvent) -> Event {
    Event::default().event("node_update").json_data(event).unwrap_or_else(|_| Event::default().event("error").data("serialization failure"))
}

async fn events_to_stream(
    session_id: String,
    events: Vec<NodeEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let complete = events.last().and_then(|e| e.is_complete).unwrap_or(false);
    let updates = events.iter().map(node_event_to_sse).collect::<Vec<_>>();
    let terminal = if complete {
        Event::default().event("complete").data(session_id)
    } else {
        Event::default().event("complete").data("")
    };
    stream::iter(updates.into_iter().chain(std::iter::once(terminal)).map(Ok))
}

async fn start_stream(
    State(app): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session_id = req.session_id.unwrap_or_else(new_session_id);
    let (events, sid) = run_and_collect(&app, &session_id, req.scenario_type.as_deref(), &req.message).await?;
    Ok(Sse::new(events_to_stream(sid, events).await).keep_alive(KeepAlive::default()))
}

async fn chat_stream(
    State(app): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if app.store.get(&req.session_id).await?.is_none() {
        return Err(ApiError::not_found("session not found"));
    }
    let (events, sid) = run_and_collect(&app, &req.session_id, None, &req.message).await?;
    Ok(Sse::new(events_to_stream(sid, events).await).keep_alive(KeepAlive::default()))
}

async fn run_and_collect(
    app: &AppState,
    session_id: &str,
    scenario_hint: Option<&str>,
    message: &str,
) -> Result<(Vec<NodeEvent>, String), ApiError> {
    let lock = app.store.lock(session_id, app.lock_hold).await?;
    let mut state = match app.store.get(session_id).await? {
        Some(existing) => existing,
        None => {
            let scenario_type = scenario_hint.map(str::to_string).unwrap_or_else(|| app.scenarios.identify(message));
            crate::types::SessionState::new(session_id, scenario_type)
        }
    };
    let deps = app.graph_deps(&state.scenario_type).map_err(ApiError::bad_request)?;
    let events = run_turn(&deps, &mut state, message).await;
    app.store.put(session_id, state.clone(), Some(app.session_ttl)).await?;
    app.store.unlock(lock);
    Ok((events, state.session_id))
}
