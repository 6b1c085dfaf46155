//! Workflow init step.
//!
//! Writes default configuration and a stub registry so `run` works
//! immediately against a fresh root.
use super::Workspace;
use crate::cli::InitArgs;
use crate::config::{write_config, EngineConfig};
use crate::registry::{definition_stub, write_definition};
use crate::util::display_path;
use anyhow::{anyhow, Context, Result};
use std::fs;

pub fn run_init(workspace: &Workspace, args: &InitArgs) -> Result<()> {
    let paths = &workspace.paths;
    fs::create_dir_all(paths.root())
        .with_context(|| format!("create {}", paths.root().display()))?;

    let config_path = paths.config_path();
    if config_path.is_file() && !args.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            config_path.display()
        ));
    }
    let config = EngineConfig::default();
    write_config(paths, &config)?;
    println!("wrote {}", display_path(&config_path, Some(paths.root())));

    let registry_path = paths.registry_path(&config.registry_path);
    if registry_path.is_file() && !args.force {
        println!(
            "kept existing {}",
            display_path(&registry_path, Some(paths.root()))
        );
    } else {
        write_definition(&registry_path, &definition_stub())?;
        println!("wrote {}", display_path(&registry_path, Some(paths.root())));
    }
    tracing::info!(root = %paths.root().display(), "workspace initialized");
    Ok(())
}

#[cfg(test)]
#[path = "init_tests.rs"]
mod tests;
