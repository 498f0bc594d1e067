use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::types::{
    FieldDeclaration, FsmStateDescriptor, MandatoryTrigger, RiskRuleSet, ScenarioDescriptor,
    ScenarioManifest,
};

#[derive(Debug, Error)]
pub enum ScenarioLoadError {
    #[error("reading {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error("parsing {path}: {source}")]
    Yaml { path: String, #[source] source: serde_yaml::Error },
    #[error("scenario {id} declares no INIT state")]
    MissingInitState { id: String },
    #[error("scenario {id} declares no COMPLETED state")]
    MissingCompletedState { id: String },
}

#[derive(Debug, Deserialize)]
struct PromptFile {
    #[serde(default)]
    system_prompt: String,
    field_order: Vec<String>,
    #[serde(default)]
    field_names: BTreeMap<String, String>,
    #[serde(default)]
    ask_prompts: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ChecklistFile {
    p1_fields: Vec<FieldDeclaration>,
    #[serde(default)]
    p2_fields: Vec<FieldDeclaration>,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    mandatory_triggers: Vec<MandatoryTrigger>,
    risk_rules: RiskRuleSet,
}

fn read_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ScenarioLoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| ScenarioLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| ScenarioLoadError::Yaml {
        path: path.display().to_string(),
        source,
    })
}

/// Load one scenario directory into a fully assembled descriptor.
pub fn load_scenario_dir(dir: &Path) -> Result<ScenarioDescriptor, ScenarioLoadError> {
    let manifest: ScenarioManifest = read_yaml(&dir.join("manifest.yaml"))?;
    let prompt: PromptFile = read_yaml(&dir.join("prompt.yaml"))?;
    let checklist: ChecklistFile = read_yaml(&dir.join("checklist.yaml"))?;
    let fsm_states: Vec<FsmStateDescriptor> = read_yaml(&dir.join("fsm_states.yaml"))?;
    let config: ConfigFile = read_yaml(&dir.join("config.yaml"))?;

    if !fsm_states.iter().any(|s| s.id == "INIT") {
        return Err(ScenarioLoadError::MissingInitState { id: manifest.id });
    }
    if !fsm_states.iter().any(|s| s.id == "COMPLETED") {
        return Err(ScenarioLoadError::MissingCompletedState { id: manifest.id });
    }

    Ok(ScenarioDescriptor {
        id: manifest.id,
        keywords: manifest.keywords,
        field_order: prompt.field_order,
        field_names: prompt.field_names,
        ask_prompts: prompt.ask_prompts,
        p1_fields: checklist.p1_fields,
        p2_fields: checklist.p2_fields,
        fsm_states,
        mandatory_triggers: config.mandatory_triggers,
        risk_rules: config.risk_rules,
        system_prompt: prompt.system_prompt,
    })
}
