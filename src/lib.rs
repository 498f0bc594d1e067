//! apron-marshal: incident-response orchestration engine for airport apron
//! emergencies (oil spill, bird strike, FOD).
//!
//! ## Architecture
//!
//! - **parser**: turns free-text operator messages into structured
//!   incident fields and a recomputed checklist (§4.1).
//! - **enrichment**: bounded, two-phase parallel auto-enrichment that runs
//!   immediately after parsing (§5).
//! - **reasoning**: the ReAct-style Thought/Action/Action Input loop, with
//!   a deterministic fallback when the LLM is unavailable (§4.2).
//! - **executor**: validates and dispatches the chosen tool call (§4.3).
//! - **fsm**: declarative compliance validator over scenario-supplied
//!   state paths (§4.4).
//! - **graph**: the per-turn orchestrator tying the above into the
//!   parse → reason → act → validate → repeat loop (§4).
//! - **rules** / **topology**: the deterministic evaluators — risk rules,
//!   BFS impact-zone propagation, flight-impact prediction (§4.6, §4.7).
//! - **scenario**: the declarative scenario/FSM/rule descriptor model,
//!   loaded once and shared read-only (§3).
//! - **storage**: the pluggable `SessionStore` contract (§5).
//! - **api**: the HTTP/SSE surface (§6).

pub mod api;
pub mod background;
pub mod config;
pub mod enrichment;
pub mod executor;
pub mod fsm;
pub mod graph;
pub mod llm;
pub mod output;
pub mod parser;
pub mod reasoning;
pub mod rules;
pub mod scenario;
pub mod storage;
pub mod tools;
pub mod topology;
pub mod types;

pub use config::EngineConfig;
pub use storage::{SessionStore, StoreError};
pub use types::{RiskLevel, SessionState};
