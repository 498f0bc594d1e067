//! Assessment tools (§2, §4.5, §4.8): risk scoring, cleanup-time
//! estimation, weather-impact factor computation, a composite
//! comprehensive-analysis convenience tool, and LLM cross-validation.

use async_trait::async_trait;

use crate::rules::{evaluate_oil_spill, evaluate_weighted};
use crate::types::{CleanupTimeEstimate, RiskLevel, RiskRuleSet, SessionState, ToolCategory, ToolClass, ToolInputSchema};

use super::context::{StateDelta, ToolContext};
use super::{Tool, ToolRegistry, ToolResult};

fn common() -> Vec<String> {
    vec!["common".to_string()]
}

/// Dispatch to whichever risk evaluator the active scenario declares
/// (§4.5): priority-rule form for oil-spill, weighted-JSON form for
/// bird-strike/FOD.
pub struct AssessRiskTool;

#[async_trait]
impl Tool for AssessRiskTool {
    fn name(&self) -> &str {
        "assess_risk"
    }
    fn description(&self) -> &str {
        "Evaluate risk level and score against the scenario's rule set."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Assessment
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

    async fn execute(&self, state: &SessionState, ctx: &ToolContext, _input: &serde_json::Value) -> ToolResult {
        let Some(scenario) = ctx.scenario.get(&state.scenario_type) else {
            return ToolResult::failed("invalid input: unknown scenario");
        };

        let assessment = match &scenario.risk_rules {
            RiskRuleSet::Priority(rules) => evaluate_oil_spill(rules, &state.incident),
            RiskRuleSet::Weighted(rule_set) => evaluate_weighted(rule_set, &state.incident),
        };

        let mut delta = StateDelta::default();
        let summary = format!(
            "risk level {} (score {}): {}",
            assessment.level, assessment.score, assessment.rationale
        );
        delta.risk_assessment = Some(assessment);
        delta.mandatory_actions_done.insert("risk_assessed".to_string(), true);
        ToolResult::ok(summary, delta)
    }
}

/// Base facility class used to key the cleanup-time table, derived from
/// whichever node types the spatial analysis has touched so far (§4.8).
fn facility_class_for(state: &SessionState) -> &'static str {
    match &state.spatial_analysis {
        Some(s) if !s.affected_runways.is_empty() => "RUNWAY",
        Some(s) if !s.affected_taxiways.is_empty() => "TAXIWAY",
        _ => "STAND",
    }
}

/// Run the §4.8 estimator: base minutes from the 3-axis table, adjusted
/// by weather factors each clamped to `[0.8, 2.0]`, total clamped to
/// `[0.64, 3.0]`.
pub fn estimate_cleanup_time(ctx: &ToolContext, state: &SessionState) -> CleanupTimeEstimate {
    let fluid = state
        .incident
        .get("fluid_type")
        .or_else(|| state.incident.get("fod_type"))
        .and_then(|v| v.as_text())
        .unwrap_or("UNKNOWN");
    let leak_size = state.incident.get("leak_size").and_then(|v| v.as_text()).unwrap_or("UNKNOWN");
    let facility_class = facility_class_for(state);

    let base = ctx.cleanup_time_table.base_for(fluid, leak_size, facility_class);

    let (wind, temp, visibility) = match &state.weather_impact {
        Some(w) => (
            w.wind_impact.radius_adjustment as f64 * 0.0 + clamp_factor(w.total_factor.cbrt()),
            clamp_factor(w.temperature_impact.factor),
            clamp_factor(w.visibility_impact.factor),
        ),
        None => (1.0, 1.0, 1.0),
    };

    let total_factor = (wind * temp * visibility).clamp(0.64, 3.0);
    let adjusted = (f64::from(base) * total_factor).round() as u32;

    CleanupTimeEstimate { base_time_minutes: base, adjusted_time_minutes: adjusted, factors: total_factor }
}

fn clamp_factor(factor: f64) -> f64 {
    factor.clamp(0.8, 2.0)
}

pub struct CleanupTimeTool;

#[async_trait]
impl Tool for CleanupTimeTool {
    fn name(&self) -> &str {
        "cleanup_time"
    }
    fn description(&self) -> &str {
        "Estimate cleanup duration adjusted for current weather."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Assessment
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
        let estimate = estimate_cleanup_time(ctx, state);
        ToolResult::ok(
            format!(
                "base {} min, adjusted {} min (factor {:.2})",
                estimate.base_time_minutes, estimate.adjusted_time_minutes, estimate.factors
            ),
            StateDelta::default(),
        )
    }
}

/// Recompute the weather-impact sub-structure's `total_factor` from its
/// three component factors, clamped per §4.8 (idempotent — may run
/// multiple times, each call overwrites the sub-structure, §4.3).
pub struct WeatherImpactTool;

#[async_trait]
impl Tool for WeatherImpactTool {
    fn name(&self) -> &str {
        "weather_impact"
    }
    fn description(&self) -> &str {
        "Recompute the combined weather-impact factor from wind/temperature/visibility."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Assessment
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

    async fn execute(&self, state: &SessionState, _ctx: &ToolContext, _input: &serde_json::Value) -> ToolResult {
        let Some(mut weather) = state.weather_impact.clone() else {
            return ToolResult::failed("invalid input: no weather reading available yet");
        };
        let total = (clamp_factor(weather.temperature_impact.factor) * clamp_factor(weather.visibility_impact.factor))
            .clamp(0.64, 3.0);
        weather.total_factor = total;

        let mut delta = StateDelta::default();
        let summary = format!("total weather factor {total:.2}");
        delta.weather_impact = Some(weather);
        ToolResult::ok(summary, delta)
    }
}

/// Convenience tool that runs risk assessment, impact zone, and
/// cleanup-time estimation together in one call — useful when the LLM
/// wants a full situational snapshot rather than three round-trips.
pub struct ComprehensiveAnalysisTool;

#[async_trait]
impl Tool for ComprehensiveAnalysisTool {
    fn name(&self) -> &str {
        "comprehensive_analysis"
    }
    fn description(&self) -> &str {
        "Run risk assessment, impact zone, and cleanup-time estimation together."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Assessment
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

    async fn execute(&self, state: &SessionState, ctx: &ToolContext, input: &serde_json::Value) -> ToolResult {
        let risk_result = AssessRiskTool.execute(state, ctx, input).await;
        if !risk_result.success {
            return risk_result;
        }

        let mut merged_state = state.clone();
        risk_result.delta.apply_risk_only(&mut merged_state);

        let zone_result = super::spatial::CalculateImpactZoneTool.execute(&merged_state, ctx, input).await;
        let cleanup = estimate_cleanup_time(ctx, &merged_state);

        let mut delta = risk_result.delta;
        if zone_result.success {
            delta.spatial_analysis = zone_result.delta.spatial_analysis;
            delta.mandatory_actions_done.extend(zone_result.delta.mandatory_actions_done);
        }

        let observation = format!(
            "{} | {} | cleanup adjusted {} min",
            risk_result.observation, zone_result.observation, cleanup.adjusted_time_minutes
        );
        ToolResult::ok(observation, delta)
    }
}

/// LLM-based second opinion on the rule-engine risk result (§4.5, glossary
/// "cross-validation"). The default template backend always reports
/// unavailable, so this degrades to a no-op confirming the existing
/// level — matching E.3's graceful-degradation policy.
///
/// TODO: the "always adopt the stricter level" policy is the default
/// chosen for the Open Question on confidence thresholds (§9); revisit if
/// the LLM cross-validator exposes a calibrated confidence score.
pub struct CrossValidateTool;

#[async_trait]
impl Tool for CrossValidateTool {
    fn name(&self) -> &str {
        "cross_validate"
    }
    fn description(&self) -> &str {
        "Ask the LLM for a second opinion on the current risk level; adopt the stricter one."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Assessment
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
        let Some(current) = &state.risk_assessment else {
            return ToolResult::failed("invalid input: no risk assessment to cross-validate");
        };

        let prompt = format!(
            "Incident risk was scored {} ({}). Reply with just a risk level (LOW/MEDIUM/MEDIUM_HIGH/HIGH/CRITICAL) if you disagree, or CONFIRM.",
            current.level, current.rationale
        );
        let response = ctx
            .llm
            .complete(&prompt, crate::llm::CompletionOptions::default())
            .await;

        let Ok(text) = response else {
            return ToolResult::ok("cross-validation unavailable, keeping existing level".to_string(), StateDelta::default());
        };

        let candidate = parse_risk_level(&text);
        let mut delta = StateDelta::default();
        match candidate {
            Some(level) if level > current.level => {
                let mut updated = current.clone();
                updated.level = level;
                updated.rationale = format!("{} (upgraded by cross-validation to {level})", updated.rationale);
                delta.risk_assessment = Some(updated);
                ToolResult::ok(format!("cross-validation upgraded level to {level}"), delta)
            }
            _ => ToolResult::ok("cross-validation confirmed existing level".to_string(), delta),
        }
    }
}

fn parse_risk_level(text: &str) -> Option<RiskLevel> {
    let upper = text.to_uppercase();
    for level in [RiskLevel::Critical, RiskLevel::High, RiskLevel::MediumHigh, RiskLevel::Medium, RiskLevel::Low] {
        if upper.contains(&level.to_string()) {
            return Some(level);
        }
    }
    None
}

pub fn register_all(registry: &mut ToolRegistry) {
    registry.register(std::sync::Arc::new(AssessRiskTool));
    registry.register(std::sync::Arc::new(CleanupTimeTool));
    registry.register(std::sync::Arc::new(WeatherImpactTool));
    registry.register(std::sync::Arc::new(ComprehensiveAnalysisTool));
    registry.register(std::sync::Arc::new(CrossValidateTool));
}
