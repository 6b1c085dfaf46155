//! Snapshot persistence: write the immutable snapshot, then swap the pointer.
use super::{CoverageSnapshot, COVERAGE_SCHEMA_VERSION};
use crate::paths::StatePaths;
use crate::util::{read_json, write_json_atomic};
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::PathBuf;

/// Persist `snapshot` under `state/snapshots/` and then replace
/// `state/coverage.json`. Returns the immutable snapshot's path.
pub fn write_snapshot(paths: &StatePaths, snapshot: &CoverageSnapshot) -> Result<PathBuf> {
    let dir = paths.snapshots_dir();
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let mut path = dir.join(format!("snapshot-{}.json", snapshot.generated_at_epoch_ms));
    let mut suffix = 1;
    while path.exists() {
        path = dir.join(format!(
            "snapshot-{}-{suffix}.json",
            snapshot.generated_at_epoch_ms
        ));
        suffix += 1;
    }
    write_json_atomic(&path, snapshot)?;
    write_json_atomic(&paths.coverage_path(), snapshot)?;
    tracing::info!(path = %path.display(), "coverage snapshot written");
    Ok(path)
}

/// The current snapshot, if one has been written.
pub fn load_current(paths: &StatePaths) -> Result<Option<CoverageSnapshot>> {
    let path = paths.coverage_path();
    if !path.is_file() {
        return Ok(None);
    }
    let snapshot: CoverageSnapshot = read_json(&path)?;
    if snapshot.schema_version != COVERAGE_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported coverage schema_version {} in {}",
            snapshot.schema_version,
            path.display()
        ));
    }
    Ok(Some(snapshot))
}
