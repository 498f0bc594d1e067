//! Airport topology graph (§4.6): nearest-node lookup and weather-adjusted
//! BFS diffusion over an undirected stand/taxiway/runway graph.
//!
//! Shaped after a process-scoped, load-once-shared-read-only resource
//! pattern (`config::get()`, `storage::persistence::InMemoryDAL`) — the
//! graph here is built once at startup from a `TopologyFile` and never
//! mutated, so lookups need no locking (§6 "loaded at start, read-only,
//! shared by all sessions").

mod graph;
mod propagation;

pub use graph::{Topology, TopologyError};
pub use propagation::{propagate, PropagationTable, WeatherAdjustment};
