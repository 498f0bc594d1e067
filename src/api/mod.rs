//! HTTP surface (§6): the `/event/*` endpoints plus the SSE streaming
//! variants, assembled the same way an `api/mod.rs` builds its `Router`
//! — CORS, tracing, and compression layered over a version-prefixed
//! route table, with a single JSON error shape.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use handlers::ApiError;
pub use state::AppState;

use axum::middleware::from_fn_with_state;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the full Axum app: route table, auth, rate limiting, then the
/// teacher's usual CORS/trace/compression stack, applied outermost-in so
/// auth and rate limiting see the request before routing decides on a
/// handler.
pub fn create_app(state: AppState) -> Router {
    routes::event_routes()
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit))
        .layer(from_fn_with_state(state.clone(), middleware::require_api_key))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .with_state(state)
}
