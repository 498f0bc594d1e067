use std::collections::{BTreeMap, BTreeSet, VecDeque};

use thiserror::Error;

use crate::types::{NodeType, TopologyFile, TopologyNode};

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("duplicate node id: {0}")]
    DuplicateNode(String),
    #[error("edge references unknown node: {0}")]
    UnknownEdgeEndpoint(String),
    #[error("topology file declares no nodes")]
    EmptyGraph,
}

/// An in-memory, undirected graph of apron facilities, built once at
/// startup and shared read-only across sessions (§4.6, §6).
#[derive(Debug, Clone)]
pub struct Topology {
    nodes: BTreeMap<String, TopologyNode>,
    adjacency: BTreeMap<String, Vec<String>>,
}

impl Topology {
    /// Build the graph from a loaded topology file. Nodes with no edges at
    /// all are dropped (with a warning) since BFS could never reach them
    /// and keeping them would make "unreachable" a silent no-op elsewhere.
    pub fn from_file(file: TopologyFile) -> Result<Self, TopologyError> {
        if file.nodes.is_empty() {
            return Err(TopologyError::EmptyGraph);
        }

        let mut nodes = BTreeMap::new();
        for node in file.nodes {
            if nodes.insert(node.id.clone(), node.clone()).is_some() {
                return Err(TopologyError::DuplicateNode(node.id));
            }
        }

        let mut adjacency: BTreeMap<String, Vec<String>> =
            nodes.keys().map(|id| (id.clone(), Vec::new())).collect();

        for edge in &file.edges {
            if !nodes.contains_key(&edge.from) {
                return Err(TopologyError::UnknownEdgeEndpoint(edge.from.clone()));
            }
            if !nodes.contains_key(&edge.to) {
                return Err(TopologyError::UnknownEdgeEndpoint(edge.to.clone()));
            }
            adjacency.get_mut(&edge.from).unwrap().push(edge.to.clone());
            adjacency.get_mut(&edge.to).unwrap().push(edge.from.clone());
        }

        let isolated: Vec<String> = adjacency
            .iter()
            .filter(|(_, neighbors)| neighbors.is_empty())
            .map(|(id, _)| id.clone())
            .collect();

        for id in &isolated {
            tracing::warn!(node = %id, "dropping topology node with no edges");
            nodes.remove(id);
            adjacency.remove(id);
        }

        Ok(Self { nodes, adjacency })
    }

    pub fn node(&self, id: &str) -> Option<&TopologyNode> {
        self.nodes.get(id)
    }

    pub fn neighbors(&self, id: &str) -> &[String] {
        self.adjacency.get(id).map_or(&[], Vec::as_slice)
    }

    /// Nearest node to `(lat, lon)` by great-circle distance (§4.6 "nearest
    /// graph node by geodesic distance").
    pub fn nearest_node(&self, lat: f64, lon: f64) -> Option<&TopologyNode> {
        self.nodes
            .values()
            .min_by(|a, b| {
                haversine_m(lat, lon, a.lat, a.lon)
                    .total_cmp(&haversine_m(lat, lon, b.lat, b.lon))
            })
    }

    /// Bounded BFS from `start`, hop-indexed (§4.6 step 2). `downwind_bearing`
    /// orders equidistant layer candidates so the one within ±90° of the
    /// downwind vector is visited first — this affects traversal order only,
    /// never the reached set (§4.6 "only changes traversal order").
    pub fn bfs(&self, start: &str, radius_hops: u32, downwind_bearing: Option<f64>) -> BfsResult {
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut by_hop: Vec<Vec<String>> = Vec::new();

        if !self.nodes.contains_key(start) {
            return BfsResult { by_hop, visited };
        }

        visited.insert(start.to_string());
        by_hop.push(vec![start.to_string()]);

        let mut frontier: VecDeque<String> = VecDeque::from([start.to_string()]);
        for _hop in 0..radius_hops {
            let mut next_layer: Vec<String> = Vec::new();
            let layer_size = frontier.len();
            for _ in 0..layer_size {
                let Some(current) = frontier.pop_front() else {
                    break;
                };
                for neighbor in self.neighbors(&current) {
                    if visited.insert(neighbor.clone()) {
                        next_layer.push(neighbor.clone());
                    }
                }
            }
            if next_layer.is_empty() {
                break;
            }
            if let Some(bearing) = downwind_bearing {
                next_layer.sort_by_key(|id| {
                    let downwind = self
                        .node(id)
                        .map(|n| is_within_90_degrees(bearing_deg(self.node(start), n), bearing))
                        .unwrap_or(false);
                    (!downwind, id.clone())
                });
            } else {
                next_layer.sort();
            }
            for id in &next_layer {
                frontier.push_back(id.clone());
            }
            by_hop.push(next_layer);
        }

        BfsResult { by_hop, visited }
    }

    pub fn node_type(&self, id: &str) -> Option<NodeType> {
        self.nodes.get(id).map(|n| n.node_type)
    }
}

pub struct BfsResult {
    /// `by_hop[k]` is the set of node ids first reached at hop distance `k`.
    pub by_hop: Vec<Vec<String>>,
    pub visited: BTreeSet<String>,
}

impl BfsResult {
    pub fn immediate_neighbors(&self) -> &[String] {
        self.by_hop.get(1).map_or(&[], Vec::as_slice)
    }
}

fn bearing_deg(from: Option<&TopologyNode>, to: &TopologyNode) -> f64 {
    let Some(from) = from else { return 0.0 };
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let delta_lon = (to.lon - from.lon).to_radians();
    let y = delta_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

fn is_within_90_degrees(bearing: f64, downwind: f64) -> bool {
    let diff = (bearing - downwind).abs() % 360.0;
    let diff = if diff > 180.0 { 360.0 - diff } else { diff };
    diff <= 90.0
}

const EARTH_RADIUS_M: f64 = 6_371_000.0;

fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TopologyEdge, TopologyFile, TopologyNode};

    fn sample_topology() -> Topology {
        let file = TopologyFile {
            nodes: vec![
                TopologyNode { id: "STAND_501".into(), node_type: NodeType::Stand, lat: 0.0, lon: 0.0 },
                TopologyNode { id: "TWY_A".into(), node_type: NodeType::Taxiway, lat: 0.001, lon: 0.0 },
                TopologyNode { id: "TWY_B".into(), node_type: NodeType::Taxiway, lat: -0.001, lon: 0.0 },
                TopologyNode { id: "RWY_09".into(), node_type: NodeType::Runway, lat: 0.002, lon: 0.0 },
            ],
            edges: vec![
                TopologyEdge { from: "STAND_501".into(), to: "TWY_A".into(), distance: None },
                TopologyEdge { from: "STAND_501".into(), to: "TWY_B".into(), distance: None },
                TopologyEdge { from: "TWY_A".into(), to: "RWY_09".into(), distance: None },
            ],
        };
        Topology::from_file(file).unwrap()
    }

    #[test]
    fn bfs_correctness_exact_radius_reachability() {
        let topo = sample_topology();
        let result = topo.bfs("STAND_501", 1, None);
        let reached: BTreeSet<String> = result.visited;
        assert_eq!(
            reached,
            BTreeSet::from(["STAND_501".to_string(), "TWY_A".to_string(), "TWY_B".to_string()])
        );

        let result2 = topo.bfs("STAND_501", 2, None);
        assert!(result2.visited.contains("RWY_09"));
    }

    #[test]
    fn nearest_node_picks_closest_coordinate() {
        let topo = sample_topology();
        let nearest = topo.nearest_node(0.0009, 0.0).unwrap();
        assert_eq!(nearest.id, "TWY_A");
    }

    #[test]
    fn isolated_node_dropped_at_load() {
        let mut file = TopologyFile::default();
        file.nodes.push(TopologyNode {
            id: "ORPHAN".into(),
            node_type: NodeType::Stand,
            lat: 5.0,
            lon: 5.0,
        });
        file.nodes.push(TopologyNode {
            id: "STAND_1".into(),
            node_type: NodeType::Stand,
            lat: 0.0,
            lon: 0.0,
        });
        let topo = Topology::from_file(file).unwrap();
        assert!(topo.node("ORPHAN").is_none());
        assert!(topo.node("STAND_1").is_none()); // also isolated, no edges declared
    }
}
