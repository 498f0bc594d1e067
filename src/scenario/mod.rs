//! Scenario registry (§3, §4.1 step 1, §6): loads per-scenario descriptors
//! from `scenarios/<id>/{manifest,prompt,checklist,fsm_states,config}.yaml`
//! and identifies the active scenario from free-form incoming text.
//!
//! Shaped after the `config` module: a process-scoped, once-loaded bundle
//! of operator-tunable data (`config::init()`/`config::get()`), here
//! generalised from one TOML file to a directory of YAML descriptors per
//! scenario, and made hot-reloadable via `arc_swap` the same way
//! `config/formation.rs` reloads formation models.

mod identify;
mod load;
mod registry;

pub use identify::identify_scenario;
pub use load::{load_scenario_dir, ScenarioLoadError};
pub use registry::ScenarioRegistry;

pub const DEFAULT_SCENARIO_ID: &str = "oil_spill";
