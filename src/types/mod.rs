//! Shared data structures for the apron incident-response engine.
//!
//! - `session`: the mutable per-session state (§3) threaded through every
//!   graph node as a value, mutated only via deltas the nodes return.
//! - `scenario`: immutable, process-scoped scenario/FSM/rule descriptors.
//! - `incident`, `risk`, `spatial`, `flight`, `weather`: the optional
//!   compound sub-structures that hang off session state.
//! - `messages`: conversation/reasoning/action log entries (append-only).
//! - `topology`: airport graph node/edge types shared between the graph
//!   module and the spatial tools.

mod session;
mod scenario;
mod incident;
mod risk;
mod spatial;
mod flight;
mod weather;
mod messages;
mod topology;
mod tool;

pub use session::*;
pub use scenario::*;
pub use incident::*;
pub use risk::*;
pub use spatial::*;
pub use flight::*;
pub use weather::*;
pub use messages::*;
pub use topology::*;
pub use tool::*;
