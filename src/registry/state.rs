//! Runtime item state persisted in `state/items.json`.
//!
//! Kept apart from the definition so verification runs never rewrite
//! `registry.json`.
use crate::util::{read_json, write_json_atomic};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Current schema version for `state/items.json`.
pub const ITEM_STATE_SCHEMA_VERSION: u32 = 1;

/// How an item last reached its verified flag.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LastResult {
    Passed,
    Failed,
    Skipped,
    AutoResolved,
    ManuallyResolved,
}

impl LastResult {
    /// Return the stable string identifier used in JSON artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            LastResult::Passed => "passed",
            LastResult::Failed => "failed",
            LastResult::Skipped => "skipped",
            LastResult::AutoResolved => "auto_resolved",
            LastResult::ManuallyResolved => "manually_resolved",
        }
    }
}

impl fmt::Display for LastResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit exclusion of an item, optionally time-boxed.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct IgnoreMark {
    pub reason: String,
    pub marked_at_epoch_ms: u128,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until_epoch_ms: Option<u128>,
}

impl IgnoreMark {
    /// An ignore mark past its expiry no longer applies.
    pub fn is_active(&self, now_epoch_ms: u128) -> bool {
        match self.until_epoch_ms {
            Some(until) => now_epoch_ms < until,
            None => true,
        }
    }
}

/// Mutable verification state of a single item.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Default)]
pub struct ItemState {
    #[serde(default)]
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_result: Option<LastResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at_epoch_ms: Option<u128>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignored: Option<IgnoreMark>,
}

impl ItemState {
    pub fn active_ignore(&self, now_epoch_ms: u128) -> Option<&IgnoreMark> {
        self.ignored
            .as_ref()
            .filter(|mark| mark.is_active(now_epoch_ms))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ItemStateFile {
    pub schema_version: u32,
    #[serde(default)]
    pub items: BTreeMap<String, ItemState>,
}

impl Default for ItemStateFile {
    fn default() -> Self {
        Self {
            schema_version: ITEM_STATE_SCHEMA_VERSION,
            items: BTreeMap::new(),
        }
    }
}

/// Load item state; a missing file means nothing has run yet.
pub fn load_item_states(path: &Path) -> Result<BTreeMap<String, ItemState>> {
    if !path.is_file() {
        return Ok(BTreeMap::new());
    }
    let file: ItemStateFile = read_json(path)?;
    if file.schema_version != ITEM_STATE_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported item state schema_version {} in {}",
            file.schema_version,
            path.display()
        ));
    }
    Ok(file.items)
}

/// Persist item state atomically.
pub fn write_item_states(path: &Path, items: &BTreeMap<String, ItemState>) -> Result<()> {
    let file = ItemStateFile {
        schema_version: ITEM_STATE_SCHEMA_VERSION,
        items: items.clone(),
    };
    write_json_atomic(path, &file)
}
