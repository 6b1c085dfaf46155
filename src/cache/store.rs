//! Storage backends for cached results.
use crate::outcome::Outcome;
use crate::registry::EventMatcher;
use crate::util::{read_json, write_json_atomic};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Current schema version for `state/cache.json`.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CacheEntry {
    pub outcome: Outcome,
    pub stored_at_epoch_ms: u128,
    pub expires_at_epoch_ms: u128,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalidated_by: Vec<EventMatcher>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct CacheFile {
    schema_version: u32,
    #[serde(default)]
    entries: BTreeMap<String, CacheEntry>,
}

/// Backing store for cache entries; reloaded and merged on every flush.
pub trait CacheStore {
    fn load(&self) -> Result<BTreeMap<String, CacheEntry>>;
    fn save(&mut self, entries: &BTreeMap<String, CacheEntry>) -> Result<()>;
}

/// In-memory store; nothing survives the process.
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, CacheEntry>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl CacheStore for MemoryStore {
    fn load(&self) -> Result<BTreeMap<String, CacheEntry>> {
        Ok(self.entries.clone())
    }

    fn save(&mut self, entries: &BTreeMap<String, CacheEntry>) -> Result<()> {
        self.entries = entries.clone();
        Ok(())
    }
}

/// JSON file store written atomically.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl CacheStore for FileStore {
    fn load(&self) -> Result<BTreeMap<String, CacheEntry>> {
        if !self.path.is_file() {
            return Ok(BTreeMap::new());
        }
        let file: CacheFile = read_json(&self.path)?;
        if file.schema_version != CACHE_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported cache schema_version {} in {}",
                file.schema_version,
                self.path.display()
            ));
        }
        Ok(file.entries)
    }

    fn save(&mut self, entries: &BTreeMap<String, CacheEntry>) -> Result<()> {
        let file = CacheFile {
            schema_version: CACHE_SCHEMA_VERSION,
            entries: entries.clone(),
        };
        write_json_atomic(&self.path, &file)
    }
}
