use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::types::ScenarioDescriptor;

use super::{identify_scenario, load_scenario_dir, ScenarioLoadError};

/// All loaded scenario descriptors, swappable as a whole so readers never
/// observe a partially-reloaded set (§6 "scenario descriptor format", §9
/// scenario hot-reload supplement).
pub struct ScenarioRegistry {
    root: PathBuf,
    descriptors: ArcSwap<Vec<ScenarioDescriptor>>,
}

impl ScenarioRegistry {
    /// Load every immediate subdirectory of `root` as a scenario directory.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self, ScenarioLoadError> {
        let root = root.into();
        let descriptors = Self::load_all(&root)?;
        Ok(Self { root, descriptors: ArcSwap::from_pointee(descriptors) })
    }

    fn load_all(root: &Path) -> Result<Vec<ScenarioDescriptor>, ScenarioLoadError> {
        let mut descriptors = Vec::new();
        let entries = std::fs::read_dir(root).map_err(|source| ScenarioLoadError::Io {
            path: root.display().to_string(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| ScenarioLoadError::Io {
                path: root.display().to_string(),
                source,
            })?;
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                descriptors.push(load_scenario_dir(&entry.path())?);
            }
        }
        descriptors.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(descriptors)
    }

    /// Build a registry directly from descriptors, bypassing the filesystem
    /// (tests, and embedding a fixed scenario set without a data directory).
    /// `reload` will error against a registry built this way since there is
    /// no backing directory to re-read.
    pub fn load_inline(descriptors: Vec<ScenarioDescriptor>) -> Self {
        Self { root: PathBuf::new(), descriptors: ArcSwap::from_pointee(descriptors) }
    }

    /// Re-read every scenario directory and atomically swap the active set.
    /// On parse failure the previous descriptors remain in effect.
    pub fn reload(&self) -> Result<(), ScenarioLoadError> {
        let descriptors = Self::load_all(&self.root)?;
        self.descriptors.store(Arc::new(descriptors));
        Ok(())
    }

    pub fn all(&self) -> Arc<Vec<ScenarioDescriptor>> {
        self.descriptors.load_full()
    }

    pub fn get(&self, id: &str) -> Option<Arc<ScenarioDescriptor>> {
        let snapshot = self.descriptors.load();
        snapshot
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .map(Arc::new)
    }

    /// Identify the active scenario id for an incoming message (§4.1 step 1).
    pub fn identify(&self, message: &str) -> String {
        let snapshot = self.descriptors.load();
        identify_scenario(message, &snapshot).to_string()
    }
}
