//! Parallel auto-enrichment (§5): a bounded, two-phase fan-out of
//! independent lookups run as part of the input-parser stage.
//!
//! Shaped after a sensor-acquisition fan-out that polls several WITS/OPC
//! feeds concurrently with a bounded semaphore and per-feed timeout,
//! tolerating individual feed failure — generalised here from N
//! homogeneous sensor polls to two fixed phases of heterogeneous
//! enrichment lookups.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::tools::context::{StateDelta, ToolContext};
use crate::tools::{information, spatial, Tool};
use crate::types::SessionState;

/// Everything Phase 1 produced, consumed by Phase 2 (§5 "Phase 2...
/// consume its outputs").
#[derive(Debug, Default)]
struct Phase1Outputs {
    delta: StateDelta,
    observations: Vec<String>,
}

/// Outcome of the whole enrichment stage: the combined delta plus a single
/// human-readable line for `/event/parse`'s `enrichment_observation` (§6).
#[derive(Debug, Default)]
pub struct EnrichmentOutcome {
    pub delta: StateDelta,
    pub observation: String,
}

/// Run Phase 1 (flight info, flight-plan lookup, stand location — fan-out,
/// independent) then Phase 2 (impact zone, position impact — dependent on
/// Phase 1's output), each future bounded by `enrichment_timeout` and the
/// whole stage bounded to `max_enrichment_workers` concurrent lookups
/// (§5).
pub async fn enrich(state: &SessionState, ctx: &Arc<ToolContext>) -> EnrichmentOutcome {
    let config = crate::config::get();
    let semaphore = Arc::new(Semaphore::new(config.max_enrichment_workers));

    let field_order = ctx
        .scenario
        .get(&state.scenario_type)
        .map(|s| s.field_order.clone())
        .unwrap_or_default();

    let phase1 = run_phase1(state, ctx, &semaphore, config.enrichment_timeout).await;

    // §5 "the parser never partially applies a Phase-2 result without its
    // prerequisites": only attempt Phase 2 once Phase 1's state (impact
    // zone needs `incident.position` and flight-plan needs the table) is
    // actually merged into a working copy.
    let mut merged_state = state.clone();
    phase1.delta.clone().apply(&mut merged_state, &field_order);

    let phase2 = run_phase2(&merged_state, ctx, &semaphore, config.enrichment_timeout).await;

    let mut delta = phase1.delta;
    delta.spatial_analysis = phase2.delta.spatial_analysis.or(delta.spatial_analysis);
    delta.mandatory_actions_done.extend(phase2.delta.mandatory_actions_done);
    delta.system_messages.extend(phase2.delta.system_messages);

    let mut observations = phase1.observations;
    observations.extend(phase2.observations);
    EnrichmentOutcome { delta, observation: observations.join("; ") }
}

async fn run_phase1(
    state: &SessionState,
    ctx: &Arc<ToolContext>,
    semaphore: &Arc<Semaphore>,
    timeout: Duration,
) -> Phase1Outputs {
    let has_flight_no = state.incident.contains_key("flight_no") || state.incident.contains_key("flight_no_display");
    let has_position = state.incident.contains_key("position") || state.incident.contains_key("position_display");

    let tasks: Vec<(&'static str, Arc<dyn Tool>)> = [
        has_flight_no.then(|| ("aircraft_info", Arc::new(information::AircraftInfoTool) as Arc<dyn Tool>)),
        has_flight_no.then(|| ("flight_plan_lookup", Arc::new(information::FlightPlanLookupTool) as Arc<dyn Tool>)),
        has_position.then(|| ("stand_location", Arc::new(spatial::StandLocationTool) as Arc<dyn Tool>)),
    ]
    .into_iter()
    .flatten()
    .collect();

    run_bounded(state, ctx, semaphore, timeout, tasks).await
}

async fn run_phase2(
    state: &SessionState,
    ctx: &Arc<ToolContext>,
    semaphore: &Arc<Semaphore>,
    timeout: Duration,
) -> Phase1Outputs {
    if state.risk_assessment.is_none() || !state.incident.contains_key("position") {
        // Preconditions for impact-zone propagation are not met yet; §5
        // forbids a partial Phase-2 application, so skip the phase entirely.
        return Phase1Outputs::default();
    }

    let tasks: Vec<(&'static str, Arc<dyn Tool>)> = vec![
        ("calculate_impact_zone", Arc::new(spatial::CalculateImpactZoneTool)),
        ("position_impact", Arc::new(spatial::PositionImpactTool)),
    ];
    run_bounded(state, ctx, semaphore, timeout, tasks).await
}

async fn run_bounded(
    state: &SessionState,
    ctx: &Arc<ToolContext>,
    semaphore: &Arc<Semaphore>,
    timeout: Duration,
    tasks: Vec<(&'static str, Arc<dyn Tool>)>,
) -> Phase1Outputs {
    let mut handles = Vec::with_capacity(tasks.len());
    for (name, tool) in tasks {
        let permit = Arc::clone(semaphore);
        let ctx = Arc::clone(ctx);
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            let _permit = permit.acquire_owned().await.expect("semaphore never closed");
            let result = tokio::time::timeout(timeout, tool.execute(&state, &ctx, &serde_json::Value::Null)).await;
            (name, result)
        }));
    }

    let mut outputs = Phase1Outputs::default();
    for handle in handles {
        let (name, result) = match handle.await {
            Ok(pair) => pair,
            Err(_) => continue,
        };
        match result {
            Ok(tool_result) if tool_result.success => {
                outputs.observations.push(format!("{name}: {}", tool_result.observation));
                merge_delta(&mut outputs.delta, tool_result.delta);
            }
            Ok(tool_result) => {
                outputs.observations.push(format!("[warning] {name}: {}", tool_result.observation));
            }
            Err(_) => {
                outputs.observations.push(format!("[warning] {name}: timed out after {}s, treated as no data", timeout.as_secs()));
            }
        }
    }
    outputs
}

fn merge_delta(target: &mut StateDelta, source: StateDelta) {
    target.incident.extend(source.incident);
    target.checklist.extend(source.checklist);
    target.risk_assessment = source.risk_assessment.or(target.risk_assessment.take());
    target.spatial_analysis = source.spatial_analysis.or(target.spatial_analysis.take());
    target.flight_plan_table = source.flight_plan_table.or(target.flight_plan_table.take());
    target.reference_flight = source.reference_flight.or(target.reference_flight.take());
    target.flight_impact_prediction = source.flight_impact_prediction.or(target.flight_impact_prediction.take());
    target.weather_impact = source.weather_impact.or(target.weather_impact.take());
    target.mandatory_actions_done.extend(source.mandatory_actions_done);
    target.notifications_sent.extend(source.notifications_sent);
    target.system_messages.extend(source.system_messages);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::TemplateBackend;
    use crate::scenario::ScenarioRegistry;
    use crate::tools::context::{AircraftInfoProvider, CleanupTimeTable, DelayTable, FlightDataProvider, NullProviders, WeatherProvider};
    use crate::topology::{PropagationTable, Topology};
    use crate::types::{NodeType, TopologyEdge, TopologyFile, TopologyNode};

    fn ensure_config() {
        if !crate::config::is_initialized() {
            crate::config::init(crate::config::EngineConfig::load());
        }
    }

    fn test_ctx() -> Arc<ToolContext> {
        let topo = Topology::from_file(TopologyFile {
            nodes: vec![TopologyNode { id: "STAND_1".into(), node_type: NodeType::Stand, lat: 0.0, lon: 0.0 }],
            edges: Vec::<TopologyEdge>::new(),
        })
        .unwrap();

        Arc::new(ToolContext {
            topology: Arc::new(topo),
            propagation_table: Arc::new(PropagationTable::default()),
            cleanup_time_table: Arc::new(CleanupTimeTable::default()),
            delay_table: Arc::new(DelayTable::default()),
            flight_data: Arc::new(NullProviders) as Arc<dyn FlightDataProvider>,
            weather: Arc::new(NullProviders) as Arc<dyn WeatherProvider>,
            aircraft_info: Arc::new(NullProviders) as Arc<dyn AircraftInfoProvider>,
            scenario: Arc::new(ScenarioRegistry::load_inline(Vec::new())),
            llm: Arc::new(TemplateBackend),
        })
    }

    #[tokio::test]
    async fn phase2_is_skipped_without_risk_assessment() {
        ensure_config();
        let ctx = test_ctx();
        let mut state = SessionState::new("s1", "oil_spill");
        state.incident.insert("position".to_string(), "1".into());

        let outcome = enrich(&state, &ctx).await;
        assert!(outcome.delta.spatial_analysis.is_none());
    }

    #[tokio::test]
    async fn missing_data_produces_warning_not_failure() {
        ensure_config();
        let ctx = test_ctx();
        let mut state = SessionState::new("s1", "oil_spill");
        state.incident.insert("flight_no".to_string(), "CCA1234".into());

        let outcome = enrich(&state, &ctx).await;
        assert!(outcome.observation.contains("flight_plan_lookup") || outcome.observation.contains("aircraft_info"));
    }
}
