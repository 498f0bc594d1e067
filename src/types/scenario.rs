//! Immutable, process-scoped scenario configuration (§3, §6).
//!
//! Mirrors `WellConfig` in spirit — a declarative bundle of
//! operator-tunable values loaded once at startup — but scoped per incident
//! scenario (`oil_spill`, `bird_strike`, `fod`, ...) instead of per well.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `manifest.yaml` — scenario identity and keyword-matching data (§4.1 step 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioManifest {
    pub id: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// `prompt.yaml` + `checklist.yaml` — field declaration and prompts.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FieldDeclaration {
    pub key: String,
    #[serde(default)]
    pub type_hint: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub ask_prompt: String,
}

/// One declared FSM phase (§4.4). Phases form a DAG with a unique `INIT`
/// and a unique `COMPLETED`, ordered by `order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsmStateDescriptor {
    pub id: String,
    pub order: u32,
    pub name: String,
    /// Each precondition is `<path> == <value>` or `<path> in <set>`,
    /// evaluated against state paths such as `checklist.p1_complete` or
    /// `mandatory_actions_done.fire_dept_notified`.
    #[serde(default)]
    pub preconditions: Vec<String>,
    #[serde(default)]
    pub next_states: Vec<String>,
}

/// A declarative obligation: under `condition`, `action` must run, verified
/// by `check_field` becoming true (§4.4 step 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MandatoryTrigger {
    pub id: String,
    pub condition: String,
    pub action: String,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    pub check_field: String,
    pub priority: i64,
}

/// Either form of risk rule set a scenario may declare (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RiskRuleSet {
    Priority(Vec<crate::rules::OilSpillRule>),
    Weighted(Box<crate::rules::WeightedRuleSet>),
}

/// The full, immutable descriptor for one scenario (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioDescriptor {
    pub id: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub field_order: Vec<String>,
    #[serde(default)]
    pub field_names: BTreeMap<String, String>,
    #[serde(default)]
    pub ask_prompts: BTreeMap<String, String>,
    /// Fields required before risk assessment may run.
    pub p1_fields: Vec<FieldDeclaration>,
    /// Optional enricher fields.
    #[serde(default)]
    pub p2_fields: Vec<FieldDeclaration>,
    pub fsm_states: Vec<FsmStateDescriptor>,
    #[serde(default)]
    pub mandatory_triggers: Vec<MandatoryTrigger>,
    pub risk_rules: RiskRuleSet,
    #[serde(default)]
    pub system_prompt: String,
}

impl ScenarioDescriptor {
    /// Every field name required by either P1 or P2 (§4.1 step 6).
    pub fn all_declared_fields(&self) -> Vec<String> {
        self.p1_fields
            .iter()
            .chain(self.p2_fields.iter())
            .map(|f| f.key.clone())
            .collect()
    }

    pub fn p1_field_keys(&self) -> Vec<&str> {
        self.p1_fields.iter().map(|f| f.key.as_str()).collect()
    }

    /// The state descriptor for `INIT` — the unique entry phase.
    pub fn init_state(&self) -> Option<&FsmStateDescriptor> {
        self.fsm_states.iter().find(|s| s.id == "INIT")
    }

    pub fn state_by_id(&self, id: &str) -> Option<&FsmStateDescriptor> {
        self.fsm_states.iter().find(|s| s.id == id)
    }
}
