//! Registry of features, checklist items, and their runtime state.
//!
//! The registry exclusively owns item definitions and item state; other
//! components read through it and hand results back to the run engine, which
//! is the only writer during a verification run.
use crate::error::EngineError;
use crate::util::{read_json, write_json_atomic};
use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Current schema version for `registry.json`.
pub const REGISTRY_SCHEMA_VERSION: u32 = 1;

mod state;
mod types;
mod validate;

pub use state::{load_item_states, write_item_states, IgnoreMark, ItemState, LastResult};
pub use types::*;

/// Flattened view of one item with its dependencies fully qualified.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub id: String,
    pub feature_id: String,
    pub capability: Option<String>,
    pub item: ChecklistItem,
    /// Item and feature-level dependencies, qualified, sorted, deduplicated.
    pub depends_on: Vec<String>,
}

impl RegistryEntry {
    pub fn category(&self) -> Category {
        self.item.category
    }
}

#[derive(Debug, Clone)]
pub struct Registry {
    definition: RegistryDefinition,
    entries: BTreeMap<String, RegistryEntry>,
    states: BTreeMap<String, ItemState>,
}

impl Registry {
    /// Validate a definition and index its items.
    pub fn new(
        definition: RegistryDefinition,
        states: BTreeMap<String, ItemState>,
    ) -> Result<Self, EngineError> {
        validate::validate_definition(&definition)?;
        let entries = build_entries(&definition);
        Ok(Self {
            definition,
            entries,
            states,
        })
    }

    /// Load the definition and persisted item state from disk.
    pub fn load(definition_path: &Path, items_path: &Path) -> Result<Self> {
        let definition = load_definition(definition_path)?;
        let states = load_item_states(items_path)?;
        let registry = Registry::new(definition, states)
            .with_context(|| format!("load registry {}", definition_path.display()))?;
        tracing::debug!(
            items = registry.entries.len(),
            features = registry.definition.features.len(),
            "registry loaded"
        );
        Ok(registry)
    }

    pub fn definition(&self) -> &RegistryDefinition {
        &self.definition
    }

    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }

    pub fn entry(&self, id: &str) -> Option<&RegistryEntry> {
        self.entries.get(id)
    }

    pub fn require_entry(&self, id: &str) -> Result<&RegistryEntry, EngineError> {
        self.entries
            .get(id)
            .ok_or_else(|| EngineError::UnknownItem(id.to_string()))
    }

    /// Current state of an item (default state when it never ran).
    pub fn state(&self, id: &str) -> ItemState {
        self.states.get(id).cloned().unwrap_or_default()
    }

    pub fn states(&self) -> &BTreeMap<String, ItemState> {
        &self.states
    }

    pub fn set_state(&mut self, id: &str, state: ItemState) {
        self.states.insert(id.to_string(), state);
    }

    pub fn is_ignored(&self, id: &str, now_epoch_ms: u128) -> bool {
        self.states
            .get(id)
            .and_then(|state| state.active_ignore(now_epoch_ms))
            .is_some()
    }

    pub fn scenario(&self, name: &str) -> Option<&ScenarioDef> {
        self.definition.scenarios.get(name)
    }

    /// Record a human verification.
    pub fn mark_resolved(
        &mut self,
        id: &str,
        reason: Option<&str>,
        now_epoch_ms: u128,
    ) -> Result<(), EngineError> {
        self.require_entry(id)?;
        let state = self.states.entry(id.to_string()).or_default();
        state.verified = true;
        state.last_result = Some(LastResult::ManuallyResolved);
        state.last_run_at_epoch_ms = Some(now_epoch_ms);
        state.last_detail = reason.map(str::to_string);
        Ok(())
    }

    /// Record a verification inferred from a successful host command.
    pub fn mark_auto_resolved(
        &mut self,
        id: &str,
        detail: String,
        now_epoch_ms: u128,
    ) -> Result<(), EngineError> {
        self.require_entry(id)?;
        let state = self.states.entry(id.to_string()).or_default();
        state.verified = true;
        state.last_result = Some(LastResult::AutoResolved);
        state.last_run_at_epoch_ms = Some(now_epoch_ms);
        state.last_detail = Some(detail);
        Ok(())
    }

    pub fn mark_ignored(
        &mut self,
        id: &str,
        reason: &str,
        until_epoch_ms: Option<u128>,
        now_epoch_ms: u128,
    ) -> Result<(), EngineError> {
        self.require_entry(id)?;
        let state = self.states.entry(id.to_string()).or_default();
        state.ignored = Some(IgnoreMark {
            reason: reason.to_string(),
            marked_at_epoch_ms: now_epoch_ms,
            until_epoch_ms,
        });
        Ok(())
    }

    /// Remove an ignore mark; returns whether one was present.
    pub fn clear_ignore(&mut self, id: &str) -> Result<bool, EngineError> {
        self.require_entry(id)?;
        Ok(self
            .states
            .get_mut(id)
            .and_then(|state| state.ignored.take())
            .is_some())
    }

    /// Add an item to a feature; the definition is revalidated as a whole.
    pub fn add_item(&mut self, feature_id: &str, item: ChecklistItem) -> Result<(), EngineError> {
        let mut definition = self.definition.clone();
        let feature = definition
            .features
            .iter_mut()
            .find(|feature| feature.id == feature_id)
            .ok_or_else(|| EngineError::UnknownFeature(feature_id.to_string()))?;
        feature.items.push(item);
        validate::validate_definition(&definition)?;
        self.entries = build_entries(&definition);
        self.definition = definition;
        Ok(())
    }

    /// Remove an item and its state; fails if other items still depend on it.
    pub fn remove_item(&mut self, id: &str) -> Result<(), EngineError> {
        let entry = self.require_entry(id)?.clone();
        let mut definition = self.definition.clone();
        if let Some(feature) = definition
            .features
            .iter_mut()
            .find(|feature| feature.id == entry.feature_id)
        {
            feature.items.retain(|item| item.id != entry.item.id);
        }
        validate::validate_definition(&definition)?;
        self.entries = build_entries(&definition);
        self.definition = definition;
        self.states.remove(id);
        Ok(())
    }
}

/// Load the registry definition from disk.
pub fn load_definition(path: &Path) -> Result<RegistryDefinition> {
    read_json(path).with_context(|| format!("load registry definition {}", path.display()))
}

/// Persist the definition; only administrative operations call this.
pub fn write_definition(path: &Path, definition: &RegistryDefinition) -> Result<()> {
    write_json_atomic(path, definition)
}

/// Minimal registry written by `init`.
pub fn definition_stub() -> RegistryDefinition {
    RegistryDefinition {
        schema_version: REGISTRY_SCHEMA_VERSION,
        features: vec![Feature {
            id: "example".to_string(),
            name: "Example feature".to_string(),
            depends_on: Vec::new(),
            capability: None,
            items: vec![ChecklistItem {
                id: "shell_available".to_string(),
                title: "A POSIX shell is available".to_string(),
                automatable: true,
                category: Category::Automatable,
                check: Some(CheckSpec::Assert(Assertion {
                    command: "sh -c 'echo ok'".to_string(),
                    expect_exit_code: 0,
                    output: Some(OutputMatcher::Exact {
                        value: "ok".to_string(),
                        stream: Stream::Stdout,
                        trim: true,
                    }),
                    timeout_seconds: None,
                    requires_tools: Vec::new(),
                    env: BTreeMap::new(),
                    invalidated_by: Vec::new(),
                })),
                depends_on: Vec::new(),
                skip_if_missing: false,
            }],
        }],
        scenarios: BTreeMap::new(),
        resources: BTreeMap::new(),
        tools: BTreeMap::new(),
        auto_resolve: Vec::new(),
        capabilities_probe: None,
    }
}

fn build_entries(definition: &RegistryDefinition) -> BTreeMap<String, RegistryEntry> {
    let mut automatable_by_feature: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for feature in &definition.features {
        let ids = feature
            .items
            .iter()
            .filter(|item| item.category == Category::Automatable)
            .map(|item| qualify(&feature.id, &item.id))
            .collect();
        automatable_by_feature.insert(feature.id.as_str(), ids);
    }

    let mut entries = BTreeMap::new();
    for feature in &definition.features {
        for item in &feature.items {
            let id = qualify(&feature.id, &item.id);
            let mut deps: BTreeSet<String> = item
                .depends_on
                .iter()
                .map(|dep| qualify(&feature.id, dep))
                .collect();
            for dep_feature in &feature.depends_on {
                if let Some(ids) = automatable_by_feature.get(dep_feature.as_str()) {
                    deps.extend(ids.iter().cloned());
                }
            }
            entries.insert(
                id.clone(),
                RegistryEntry {
                    id,
                    feature_id: feature.id.clone(),
                    capability: feature.capability.clone(),
                    item: item.clone(),
                    depends_on: deps.into_iter().collect(),
                },
            );
        }
    }
    entries
}

#[cfg(test)]
pub(crate) mod fixtures;

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
