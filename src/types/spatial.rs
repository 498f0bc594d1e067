//! Spatial impact (BFS diffusion) result (§3, §4.6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialAnalysis {
    pub isolated_nodes: Vec<String>,
    pub affected_stands: Vec<String>,
    pub affected_taxiways: Vec<String>,
    pub affected_runways: Vec<String>,
    pub radius_hops: u32,
}

/// `(radius_hops, affects_runway)` propagation rule keyed by
/// `(fluid/category, risk level)` (§4.6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PropagationRule {
    pub radius_hops: u32,
    pub affects_runway: bool,
}
