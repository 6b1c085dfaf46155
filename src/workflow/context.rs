use crate::config::{load_config, EngineConfig};
use crate::paths::StatePaths;
use crate::registry::{write_item_states, Registry};
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

/// Fresh view of one `--root` for a single command invocation.
pub(crate) struct Workspace {
    pub(crate) paths: StatePaths,
    pub(crate) config: EngineConfig,
}

impl Workspace {
    pub(crate) fn open(root: &Path) -> Result<Self> {
        let paths = StatePaths::new(expand_home(root));
        let config = load_config(&paths)?;
        Ok(Self { paths, config })
    }

    /// Workspace with default configuration, for commands that replace it.
    pub(crate) fn with_defaults(root: &Path) -> Self {
        Self {
            paths: StatePaths::new(expand_home(root)),
            config: EngineConfig::default(),
        }
    }

    pub(crate) fn registry_path(&self) -> PathBuf {
        self.paths.registry_path(&self.config.registry_path)
    }

    pub(crate) fn require_registry(&self) -> Result<PathBuf> {
        let path = self.registry_path();
        if !path.is_file() {
            return Err(anyhow!(
                "registry not found at {} (run `opsverify init` first)",
                path.display()
            ));
        }
        Ok(path)
    }

    pub(crate) fn load_registry(&self) -> Result<Registry> {
        let path = self.require_registry()?;
        Registry::load(&path, &self.paths.items_path())
    }

    pub(crate) fn save_states(&self, registry: &Registry) -> Result<()> {
        write_item_states(&self.paths.items_path(), registry.states())
    }
}

/// Expand a leading `~/` against the user's home directory.
pub(crate) fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}
