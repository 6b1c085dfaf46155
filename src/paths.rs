//! Typed paths into a verification root.
//!
//! Centralizing path construction keeps file access consistent across the
//! engine and prevents drift when the layout evolves.
use std::path::{Path, PathBuf};

/// Convenience wrapper for locating engine-owned artifacts.
#[derive(Debug, Clone)]
pub struct StatePaths {
    root: PathBuf,
}

impl StatePaths {
    /// Create a new path helper rooted at the verification root.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Return the verification root used for path derivation.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the `config.json` path.
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Resolve the registry definition path relative to the root.
    pub fn registry_path(&self, registry_rel: &str) -> PathBuf {
        self.root.join(registry_rel)
    }

    /// Return the `state/` directory path.
    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    /// Return the `state/items.json` path.
    pub fn items_path(&self) -> PathBuf {
        self.state_dir().join("items.json")
    }

    /// Return the `state/cache.json` path.
    pub fn cache_path(&self) -> PathBuf {
        self.state_dir().join("cache.json")
    }

    /// Return the `state/checkpoints/` directory path.
    pub fn checkpoints_dir(&self) -> PathBuf {
        self.state_dir().join("checkpoints")
    }

    /// Return the `state/snapshots/` directory path.
    pub fn snapshots_dir(&self) -> PathBuf {
        self.state_dir().join("snapshots")
    }

    /// Return the `state/coverage.json` path (current snapshot, badge data).
    pub fn coverage_path(&self) -> PathBuf {
        self.state_dir().join("coverage.json")
    }

    /// Return the `state/history.jsonl` path.
    pub fn history_path(&self) -> PathBuf {
        self.state_dir().join("history.jsonl")
    }

    /// Return the `state/events.jsonl` path.
    pub fn events_path(&self) -> PathBuf {
        self.state_dir().join("events.jsonl")
    }
}
