//! Engine configuration (`config.json`).
//!
//! A missing file means defaults; a present file is parsed strictly and
//! validated so a typo never silently falls back to a default.
use crate::cache::DEFAULT_TTL;
use crate::paths::StatePaths;
use crate::util::{read_json, write_json_atomic};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};
use std::time::Duration;

/// Current schema version for `config.json`.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

fn default_cache_ttl_seconds() -> u64 {
    DEFAULT_TTL.as_secs()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_jobs() -> usize {
    4
}

fn default_resource_wait_seconds() -> u64 {
    60
}

fn default_registry_path() -> String {
    "registry.json".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub schema_version: u32,
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "default_timeout_seconds")]
    pub default_timeout_seconds: u64,
    /// Worker threads per wave; checks are I/O bound so this is not tied to cores.
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    #[serde(default = "default_resource_wait_seconds")]
    pub resource_wait_seconds: u64,
    #[serde(default)]
    pub strict_tools: bool,
    #[serde(default = "default_registry_path")]
    pub registry_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            cache_ttl_seconds: default_cache_ttl_seconds(),
            default_timeout_seconds: default_timeout_seconds(),
            jobs: default_jobs(),
            resource_wait_seconds: default_resource_wait_seconds(),
            strict_tools: false,
            registry_path: default_registry_path(),
        }
    }
}

impl EngineConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_seconds)
    }

    pub fn resource_wait(&self) -> Duration {
        Duration::from_secs(self.resource_wait_seconds)
    }
}

/// Load `config.json` under the root, falling back to defaults when absent.
pub fn load_config(paths: &StatePaths) -> Result<EngineConfig> {
    let path = paths.config_path();
    if !path.is_file() {
        tracing::debug!(path = %path.display(), "no config file; using defaults");
        return Ok(EngineConfig::default());
    }
    let config: EngineConfig = read_json(&path)?;
    validate_config(&config).map_err(|err| anyhow!("invalid {}: {err}", path.display()))?;
    Ok(config)
}

/// Persist a config in a stable JSON format.
pub fn write_config(paths: &StatePaths, config: &EngineConfig) -> Result<()> {
    write_json_atomic(&paths.config_path(), config)
}

/// Validate schema and value ranges.
pub fn validate_config(config: &EngineConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    if config.jobs == 0 {
        return Err(anyhow!("jobs must be at least 1"));
    }
    if config.default_timeout_seconds == 0 {
        return Err(anyhow!("default_timeout_seconds must be at least 1"));
    }
    validate_relative_path(&config.registry_path, "registry_path")
}

fn validate_relative_path(rel: &str, label: &str) -> Result<()> {
    let path = Path::new(rel);
    if rel.trim().is_empty() || path.is_absolute() || has_parent_components(path) {
        return Err(anyhow!(
            "{label} must be a relative path without '..' (got {rel:?})"
        ));
    }
    Ok(())
}

fn has_parent_components(path: &Path) -> bool {
    path.components()
        .any(|component| matches!(component, Component::ParentDir))
}
