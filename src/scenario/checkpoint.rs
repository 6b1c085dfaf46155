//! Scenario checkpoints: one record per in-flight scenario.
use super::capture::StateSnapshot;
use crate::util::{read_json, write_json_atomic};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(test)]
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::Mutex;

/// Current schema version for checkpoint files.
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Checkpoint {
    pub schema_version: u32,
    pub scenario_id: String,
    pub item_id: String,
    /// Digest of the scenario definition the progress belongs to.
    pub scenario_digest: String,
    /// Next step to run.
    pub step_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_state_after: Option<StateSnapshot>,
    pub updated_at_epoch_ms: u128,
}

/// Persistence for checkpoints. The scenario runner is the only writer.
pub trait CheckpointStore: Send + Sync {
    fn load(&self, scenario_id: &str, item_id: &str) -> Result<Option<Checkpoint>>;
    fn save(&self, checkpoint: &Checkpoint) -> Result<()>;
    fn delete(&self, scenario_id: &str, item_id: &str) -> Result<()>;
}

/// `state/checkpoints/<scenario>__<item>.json`, written atomically.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn path_for(&self, scenario_id: &str, item_id: &str) -> PathBuf {
        let item = item_id.replace('/', "__");
        self.dir.join(format!("{scenario_id}__{item}.json"))
    }

    /// All checkpoints currently on disk (used by `status`).
    pub fn list(&self) -> Result<Vec<Checkpoint>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut checkpoints = Vec::new();
        for entry in
            fs::read_dir(&self.dir).with_context(|| format!("read {}", self.dir.display()))?
        {
            let path = entry
                .with_context(|| format!("read {}", self.dir.display()))?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            checkpoints.push(read_checkpoint(&path)?);
        }
        checkpoints.sort_by(|a, b| {
            (a.scenario_id.as_str(), a.item_id.as_str())
                .cmp(&(b.scenario_id.as_str(), b.item_id.as_str()))
        });
        Ok(checkpoints)
    }
}

fn read_checkpoint(path: &Path) -> Result<Checkpoint> {
    let checkpoint: Checkpoint = read_json(path)?;
    if checkpoint.schema_version != CHECKPOINT_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported checkpoint schema_version {} in {}",
            checkpoint.schema_version,
            path.display()
        ));
    }
    Ok(checkpoint)
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self, scenario_id: &str, item_id: &str) -> Result<Option<Checkpoint>> {
        let path = self.path_for(scenario_id, item_id);
        if !path.is_file() {
            return Ok(None);
        }
        read_checkpoint(&path).map(Some)
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        write_json_atomic(
            &self.path_for(&checkpoint.scenario_id, &checkpoint.item_id),
            checkpoint,
        )
    }

    fn delete(&self, scenario_id: &str, item_id: &str) -> Result<()> {
        let path = self.path_for(scenario_id, item_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
        }
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    records: Mutex<BTreeMap<(String, String), Checkpoint>>,
}

#[cfg(test)]
impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, BTreeMap<(String, String), Checkpoint>> {
        self.records.lock().unwrap_or_else(|err| err.into_inner())
    }
}

#[cfg(test)]
impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, scenario_id: &str, item_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self
            .records()
            .get(&(scenario_id.to_string(), item_id.to_string()))
            .cloned())
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.records().insert(
            (checkpoint.scenario_id.clone(), checkpoint.item_id.clone()),
            checkpoint.clone(),
        );
        Ok(())
    }

    fn delete(&self, scenario_id: &str, item_id: &str) -> Result<()> {
        self.records()
            .remove(&(scenario_id.to_string(), item_id.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint(step_index: usize) -> Checkpoint {
        Checkpoint {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            scenario_id: "backup_restore".to_string(),
            item_id: "backup/restore".to_string(),
            scenario_digest: "abc".to_string(),
            step_index,
            captured_state_after: None,
            updated_at_epoch_ms: 1,
        }
    }

    #[test]
    fn file_store_saves_lists_and_deletes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileCheckpointStore::new(dir.path().join("checkpoints"));
        assert!(store.load("backup_restore", "backup/restore").expect("load").is_none());

        store.save(&checkpoint(2)).expect("save");
        assert!(store
            .path_for("backup_restore", "backup/restore")
            .ends_with("backup_restore__backup__restore.json"));
        assert_eq!(
            store.load("backup_restore", "backup/restore").expect("load"),
            Some(checkpoint(2))
        );
        assert_eq!(store.list().expect("list").len(), 1);

        store.delete("backup_restore", "backup/restore").expect("delete");
        store
            .delete("backup_restore", "backup/restore")
            .expect("delete is idempotent");
        assert!(store.list().expect("list").is_empty());
    }
}
