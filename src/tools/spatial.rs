//! Spatial tools (§2, §4.6, §4.7): stand location resolution, BFS impact
//! zone propagation, position-impact summary, and flight-impact
//! prediction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::topology::propagate;
use crate::types::{
    AffectedFlight, FlightImpactPrediction, FlightImpactStatistics, SessionState, SeverityBucket,
    SeverityDistribution, TimeWindow, ToolCategory, ToolClass, ToolInputSchema,
};

use super::context::{StateDelta, ToolContext};
use super::{Tool, ToolRegistry, ToolResult};

fn common() -> Vec<String> {
    vec!["common".to_string()]
}

/// Resolve `incident.position` to a topology node id. Positions are
/// already structured identifiers by the time they reach here (entity
/// extraction normalises "217"/"27L"/"TWY-A" style tokens, §4.1 step 4);
/// this tries the bare token first, then the conventional prefixed forms
/// the sample topology files use.
pub fn resolve_position_node<'a>(topology: &'a crate::topology::Topology, position: &str) -> Option<&'a str> {
    let candidates = [
        position.to_string(),
        format!("STAND_{position}"),
        format!("TWY_{position}"),
        format!("RWY_{position}"),
    ];
    candidates.iter().find_map(|c| topology.node(c).map(|n| n.id.as_str()))
}

/// Reference time for flight-impact prediction (§4.7 step 1): reference
/// flight's time, then `incident.incident_time`, else `None` (caller
/// supplies the system-wide fallback).
pub fn reference_time(state: &SessionState) -> Option<DateTime<Utc>> {
    if let Some(reference) = &state.reference_flight {
        return Some(reference.reference_time);
    }
    state
        .incident
        .get("incident_time")
        .and_then(|v| v.as_text())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

pub struct StandLocationTool;

#[async_trait]
impl Tool for StandLocationTool {
    fn name(&self) -> &str {
        "stand_location"
    }
    fn description(&self) -> &str {
        "Resolve the incident position to a topology node and its coordinates."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Spatial
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
        let Some(position) = state.incident.get("position").and_then(|v| v.as_text()) else {
            return ToolResult::failed("invalid input: incident.position is not set");
        };
        match resolve_position_node(&ctx.topology, position) {
            Some(node_id) => {
                let node = ctx.topology.node(node_id).expect("resolved id must exist");
                ToolResult::ok(
                    format!("{node_id} ({:?}) at {:.5},{:.5}", node.node_type, node.lat, node.lon),
                    StateDelta::default(),
                )
            }
            None => ToolResult::ok(format!("no topology node found for position {position}"), StateDelta::default()),
        }
    }
}

/// BFS impact-zone propagation (§4.6). Critical tool — triggers an FSM
/// validation pass after running (§4.4).
pub struct CalculateImpactZoneTool;

#[async_trait]
impl Tool for CalculateImpactZoneTool {
    fn name(&self) -> &str {
        "calculate_impact_zone"
    }
    fn description(&self) -> &str {
        "Propagate incident impact across the airport topology via bounded BFS."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Spatial
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
        let Some(position) = state.incident.get("position").and_then(|v| v.as_text()) else {
            return ToolResult::failed("invalid input: incident.position is not set");
        };
        let Some(node_id) = resolve_position_node(&ctx.topology, position).map(str::to_string) else {
            return ToolResult::failed(format!("invalid input: no topology node for position {position}"));
        };
        let Some(risk) = &state.risk_assessment else {
            return ToolResult::failed("invalid input: risk must be assessed before impact zone");
        };

        let category = state
            .incident
            .get("fluid_type")
            .or_else(|| state.incident.get("fod_type"))
            .or_else(|| state.incident.get("bird_info"))
            .and_then(|v| v.as_text())
            .unwrap_or("UNKNOWN");

        let rule = ctx.propagation_table.lookup(category, &risk.level.to_string());
        let analysis = propagate(&ctx.topology, &node_id, rule, state.weather_impact.as_ref());

        let mut delta = StateDelta::default();
        let summary = format!(
            "radius {} hops: {} stands, {} taxiways, {} runways affected",
            analysis.radius_hops,
            analysis.affected_stands.len(),
            analysis.affected_taxiways.len(),
            analysis.affected_runways.len()
        );
        delta.spatial_analysis = Some(analysis);
        delta.mandatory_actions_done.insert("impact_zone_calculated".to_string(), true);
        ToolResult::ok(summary, delta)
    }
}

/// Narrower summary of which facility classes are impacted, without
/// recomputing BFS (§2 "position impact").
pub struct PositionImpactTool;

#[async_trait]
impl Tool for PositionImpactTool {
    fn name(&self) -> &str {
        "position_impact"
    }
    fn description(&self) -> &str {
        "Summarise which facility classes the current spatial analysis affects."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Spatial
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
        match &state.spatial_analysis {
            Some(analysis) => ToolResult::ok(
                format!(
                    "stands={:?} taxiways={:?} runways={:?}",
                    analysis.affected_stands, analysis.affected_taxiways, analysis.affected_runways
                ),
                StateDelta::default(),
            ),
            None => ToolResult::failed("invalid input: no spatial analysis computed yet"),
        }
    }
}

/// Dynamic time-window flight-impact prediction (§4.7).
pub struct PredictFlightImpactTool;

#[async_trait]
impl Tool for PredictFlightImpactTool {
    fn name(&self) -> &str {
        "predict_flight_impact"
    }
    fn description(&self) -> &str {
        "Predict which scheduled flights fall in the cleanup window and intersect the impact zone."
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Spatial
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
        let Some(spatial) = &state.spatial_analysis else {
            return ToolResult::failed("invalid input: spatial analysis required before flight-impact prediction");
        };
        let Some(risk) = &state.risk_assessment else {
            return ToolResult::failed("invalid input: risk assessment required before flight-impact prediction");
        };

        let reference_time = reference_time(state).unwrap_or_else(Utc::now);
        let cleanup = super::assessment::estimate_cleanup_time(ctx, state);
        let window = TimeWindow {
            start: reference_time,
            end: reference_time + chrono::Duration::minutes(i64::from(cleanup.adjusted_time_minutes) + 30),
        };

        let mut affected = Vec::new();
        for entry in &state.flight_plan_table {
            if entry.scheduled_time < window.start || entry.scheduled_time > window.end {
                continue;
            }
            let facility = [
                entry.stand.as_deref().filter(|s| spatial.affected_stands.iter().any(|a| a == s)),
                entry.taxiway.as_deref().filter(|t| spatial.affected_taxiways.iter().any(|a| a == t)),
                entry.runway.as_deref().filter(|r| spatial.affected_runways.iter().any(|a| a == r)),
            ]
            .into_iter()
            .flatten()
            .next();

            let Some(facility_type) = facility else { continue };
            let delay_minutes = ctx.delay_table.delay_for(facility_type, &risk.level.to_string());
            let severity = match delay_minutes {
                d if d >= 60 => SeverityBucket::High,
                d if d >= 20 => SeverityBucket::Medium,
                _ => SeverityBucket::Low,
            };

            affected.push(AffectedFlight {
                flight_no: entry.flight_no.clone(),
                scheduled_time: entry.scheduled_time,
                facility_intersected: facility_type.to_string(),
                delay_minutes,
                severity,
            });
        }

        let mut distribution = SeverityDistribution::default();
        let mut total_delay = 0u32;
        for flight in &affected {
            total_delay += flight.delay_minutes;
            match flight.severity {
                SeverityBucket::High => distribution.high += 1,
                SeverityBucket::Medium => distribution.medium += 1,
                SeverityBucket::Low => distribution.low += 1,
            }
        }

        let statistics = FlightImpactStatistics {
            total: affected.len() as u32,
            total_delay_minutes: total_delay,
            severity_distribution: distribution,
        };

        let summary = format!(
            "{} flights affected in window {} - {}, total delay {} min",
            statistics.total, window.start, window.end, statistics.total_delay_minutes
        );

        let mut delta = StateDelta::default();
        delta.flight_impact_prediction = Some(FlightImpactPrediction {
            time_window: window,
            affected_flights: affected,
            statistics,
        });
        ToolResult::ok(summary, delta)
    }
}

pub fn register_all(registry: &mut ToolRegistry) {
    registry.register(std::sync::Arc::new(StandLocationTool));
    registry.register(std::sync::Arc::new(CalculateImpactZoneTool));
    registry.register(std::sync::Arc::new(PositionImpactTool));
    registry.register(std::sync::Arc::new(PredictFlightImpactTool));
}
