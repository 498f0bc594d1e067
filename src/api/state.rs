//! Shared Axum application state (§6 HTTP surface).
//!
//! Shaped after `DashboardState` (`Arc<RwLock<AppState>>` plus a handful
//! of optional storage handles passed into every handler) — generalised
//! from one rig's read-only dashboard snapshot to the mutable,
//! per-session agent engine this crate implements.

use std::sync::Arc;
use std::time::Duration;

use crate::llm::LlmClient;
use crate::scenario::ScenarioRegistry;
use crate::storage::SessionStore;
use crate::tools::{ToolContext, ToolRegistry};

use super::middleware::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub llm: Arc<dyn LlmClient>,
    pub registry: Arc<ToolRegistry>,
    pub scenarios: Arc<ScenarioRegistry>,
    pub ctx: Arc<ToolContext>,
    pub recursion_limit: u32,
    pub session_ttl: Duration,
    pub lock_hold: Duration,
    pub api_key: Option<String>,
    pub rate_limit_per_minute: Option<u32>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Build the per-turn [`crate::graph::GraphDeps`] for a specific
    /// scenario — the agent graph pins one scenario descriptor per call
    /// (§3 "scenario descriptors... loaded once at start and shared
    /// read-only"), so a fresh, cheap `Arc`-cloned bundle is assembled per
    /// turn rather than per process.
    pub fn graph_deps(&self, scenario_id: &str) -> Result<crate::graph::GraphDeps, String> {
        let scenario = self.scenarios.get(scenario_id).ok_or_else(|| format!("unknown scenario: {scenario_id}"))?;
        Ok(crate::graph::GraphDeps {
            llm: self.llm.clone(),
            registry: self.registry.clone(),
            scenario,
            ctx: self.ctx.clone(),
            recursion_limit: self.recursion_limit,
        })
    }
}
