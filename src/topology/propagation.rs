//! BFS-diffusion propagation and weather-driven radius adjustment (§4.6).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::graph::Topology;
use crate::types::{NodeType, PropagationRule, SpatialAnalysis, WeatherImpact};

/// Propagation rules keyed by `"<fluid_or_category>|<risk_level>"` (§4.6,
/// §9 "treat the scenario-specific table as authoritative").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropagationTable {
    pub rules: BTreeMap<String, PropagationRule>,
}

impl PropagationTable {
    pub fn key(category: &str, level: &str) -> String {
        format!("{category}|{level}")
    }

    /// Look up a rule, falling back to the documented default for
    /// `HYDRAULIC+HIGH` when the scenario table is silent on it (§9 Open
    /// Questions: the two upstream docs disagree, so the scenario table
    /// wins when present).
    pub fn lookup(&self, category: &str, level: &str) -> PropagationRule {
        self.rules
            .get(&Self::key(category, level))
            .copied()
            .unwrap_or_else(|| {
                if category.eq_ignore_ascii_case("hydraulic") && level.eq_ignore_ascii_case("high")
                {
                    PropagationRule { radius_hops: 2, affects_runway: false }
                } else {
                    PropagationRule { radius_hops: 1, affects_runway: false }
                }
            })
    }
}

/// Wind-driven radius bump: `>5 m/s` adds one hop, capped at 4 total
/// (§4.6 "augment the radius").
#[derive(Debug, Clone, Copy)]
pub struct WeatherAdjustment {
    pub radius_hops: u32,
    pub downwind_bearing: Option<f64>,
}

impl WeatherAdjustment {
    pub fn from_rule_and_weather(rule: PropagationRule, weather: Option<&WeatherImpact>) -> Self {
        let Some(weather) = weather else {
            return Self { radius_hops: rule.radius_hops, downwind_bearing: None };
        };

        let bumped = if weather.wind_impact.speed > 5.0 {
            (rule.radius_hops + 1).min(4)
        } else {
            rule.radius_hops
        };

        Self { radius_hops: bumped, downwind_bearing: Some(weather.wind_impact.direction) }
    }
}

/// Run the full §4.6 pipeline: BFS from `start`, classify reached nodes,
/// decide runway inclusion.
pub fn propagate(
    topology: &Topology,
    start: &str,
    rule: PropagationRule,
    weather: Option<&WeatherImpact>,
) -> SpatialAnalysis {
    let adjustment = WeatherAdjustment::from_rule_and_weather(rule, weather);
    let result = topology.bfs(start, adjustment.radius_hops, adjustment.downwind_bearing);

    let mut affected_stands = Vec::new();
    let mut affected_taxiways = Vec::new();
    let mut affected_runways = Vec::new();
    let mut runway_reached = false;

    for id in &result.visited {
        match topology.node_type(id) {
            Some(NodeType::Stand) => affected_stands.push(id.clone()),
            Some(NodeType::Taxiway) => affected_taxiways.push(id.clone()),
            Some(NodeType::Runway) => {
                runway_reached = true;
                affected_runways.push(id.clone());
            }
            None => {}
        }
    }

    if !rule.affects_runway && !runway_reached {
        affected_runways.clear();
    }

    let mut isolated_nodes = vec![start.to_string()];
    isolated_nodes.extend(result.immediate_neighbors().iter().cloned());

    SpatialAnalysis {
        isolated_nodes,
        affected_stands,
        affected_taxiways,
        affected_runways,
        radius_hops: adjustment.radius_hops,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TemperatureImpact, TopologyEdge, TopologyFile, TopologyNode, VisibilityImpact, WindImpact};

    fn sample_topology() -> Topology {
        let file = TopologyFile {
            nodes: vec![
                TopologyNode { id: "STAND_501".into(), node_type: NodeType::Stand, lat: 0.0, lon: 0.0 },
                TopologyNode { id: "TWY_A".into(), node_type: NodeType::Taxiway, lat: 0.001, lon: 0.0 },
                TopologyNode { id: "RWY_09".into(), node_type: NodeType::Runway, lat: 0.002, lon: 0.0 },
            ],
            edges: vec![
                TopologyEdge { from: "STAND_501".into(), to: "TWY_A".into(), distance: None },
                TopologyEdge { from: "TWY_A".into(), to: "RWY_09".into(), distance: None },
            ],
        };
        Topology::from_file(file).unwrap()
    }

    #[test]
    fn high_wind_adds_one_hop_capped_at_four() {
        let weather = WeatherImpact {
            wind_impact: WindImpact { speed: 8.0, direction: 90.0, radius_adjustment: 1 },
            temperature_impact: TemperatureImpact { factor: 1.0 },
            visibility_impact: VisibilityImpact { factor: 1.0 },
            total_factor: 1.0,
        };
        let rule = PropagationRule { radius_hops: 1, affects_runway: false };
        let adjustment = WeatherAdjustment::from_rule_and_weather(rule, Some(&weather));
        assert_eq!(adjustment.radius_hops, 2);
    }

    #[test]
    fn runway_included_when_reached_even_if_rule_says_no() {
        let topo = sample_topology();
        let rule = PropagationRule { radius_hops: 2, affects_runway: false };
        let analysis = propagate(&topo, "STAND_501", rule, None);
        assert!(analysis.affected_runways.contains(&"RWY_09".to_string()));
    }

    #[test]
    fn hydraulic_high_default_fallback() {
        let table = PropagationTable::default();
        let rule = table.lookup("HYDRAULIC", "HIGH");
        assert_eq!(rule.radius_hops, 2);
        assert!(!rule.affects_runway);
    }
}
