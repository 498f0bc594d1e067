//! The tool set (§2, §4.3, §9): Information, Spatial, Assessment, and
//! Action tools behind one uniform contract, dispatched by name from a
//! scenario-scoped registry.
//!
//! Shaped after a dynamic-dispatch specialist pattern
//! (`agents::specialists::Specialist` trait + a `Vec<Box<dyn Specialist>>`
//! voted over by the orchestrator) — generalised here from four hardcoded
//! specialists to a name-indexed registry of heterogeneous tools
//! ("dynamic dispatch over tools... a tool registry indexed by name").

pub mod action;
pub mod assessment;
pub mod context;
pub mod information;
pub mod spatial;

pub use context::{
    AircraftInfoProvider, CleanupTimeTable, DelayTable, FlightDataProvider, NullProviders,
    StateDelta, ToolContext, WeatherProvider,
};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::types::{SessionState, ToolCategory, ToolClass, ToolInputSchema};

/// The outcome of running a tool (§4.3, §7 "tools never raise out of
/// `execute`; they return `{success, observation}`").
pub struct ToolResult {
    pub success: bool,
    pub observation: String,
    pub delta: StateDelta,
}

impl ToolResult {
    pub fn ok(observation: impl Into<String>, delta: StateDelta) -> Self {
        Self { success: true, observation: observation.into(), delta }
    }

    pub fn failed(observation: impl Into<String>) -> Self {
        Self { success: false, observation: observation.into(), delta: StateDelta::default() }
    }
}

/// One entry of the tool set (§2, §3 "tool descriptor").
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn category(&self) -> ToolCategory;
    fn class(&self) -> ToolClass;
    fn input_schema(&self) -> &ToolInputSchema;
    /// Scenario ids this tool is visible to, or `["common"]` for every
    /// scenario (§3 "a tool is visible to a scenario iff the scenario id
    /// is in its `scenarios` list or `common` is").
    fn scenarios(&self) -> &[String];

    /// Execute against validated input. The executor has already checked
    /// the input against `input_schema()`; tools still defend against
    /// semantically-invalid values (§4.3, §7).
    async fn execute(
        &self,
        state: &SessionState,
        ctx: &ToolContext,
        input: &serde_json::Value,
    ) -> ToolResult;
}

/// Name-indexed tool set, scenario-filtered on lookup (§3 "tool descriptor
/// invariant: `name` unique within a registry").
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: BTreeMap::new() }
    }

    /// Register a tool, panicking on a duplicate name — a startup-time
    /// invariant violation, not a recoverable runtime condition (§3).
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            panic!("duplicate tool name registered: {name}");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Tools visible to `scenario_id` (§3 visibility rule), in name order
    /// for stable prompt construction (§4.2).
    pub fn visible_to(&self, scenario_id: &str) -> Vec<Arc<dyn Tool>> {
        self.tools
            .values()
            .filter(|t| {
                t.scenarios().iter().any(|s| s == "common" || s == scenario_id)
            })
            .cloned()
            .collect()
    }

    /// Build the full, batteries-included registry (§2 tool set).
    pub fn with_default_tools() -> Self {
        let mut registry = Self::new();
        information::register_all(&mut registry);
        spatial::register_all(&mut registry);
        assessment::register_all(&mut registry);
        action::register_all(&mut registry);
        registry
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_no_duplicate_names() {
        let registry = ToolRegistry::with_default_tools();
        assert!(registry.tools.len() >= 10);
    }

    #[test]
    fn common_tool_visible_to_every_scenario() {
        let registry = ToolRegistry::with_default_tools();
        let visible = registry.visible_to("oil_spill");
        assert!(visible.iter().any(|t| t.name() == "ask"));
        let visible_other = registry.visible_to("bird_strike");
        assert!(visible_other.iter().any(|t| t.name() == "ask"));
    }
}
