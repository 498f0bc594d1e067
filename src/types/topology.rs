//! Airport topology node/edge types (§3, §4.6). The graph algorithms live
//! in `crate::topology`; this module only holds the shared value types so
//! both the topology module and the spatial tools can reference them
//! without a dependency cycle.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Stand,
    Taxiway,
    Runway,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyEdge {
    pub from: String,
    pub to: String,
    /// Geodesic distance in metres; recomputed from coordinates at load
    /// time if omitted.
    #[serde(default)]
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyFile {
    pub nodes: Vec<TopologyNode>,
    pub edges: Vec<TopologyEdge>,
}
