//! Verification runs, plans and capability probing from the CLI.
use super::Workspace;
use crate::cancel::{install_interrupt_handler, CancelToken};
use crate::check::{PathLocator, ShellRunner};
use crate::cli::{PlanArgs, RunArgs};
use crate::clock::SystemClock;
use crate::engine::{probe_capabilities, Collaborators, RunEngine, RunOptions, RunStatus};
use crate::output::{print_json, print_plan, print_report};
use crate::scenario::FileCheckpointStore;
use anyhow::{anyhow, Result};

/// Production collaborators rooted at the workspace.
struct Host {
    runner: ShellRunner,
    tools: PathLocator,
    clock: SystemClock,
    checkpoints: FileCheckpointStore,
}

impl Host {
    fn new(workspace: &Workspace) -> Self {
        let root = workspace.paths.root().to_path_buf();
        Self {
            runner: ShellRunner::new(Some(root.clone())),
            tools: PathLocator::new(Some(root)),
            clock: SystemClock,
            checkpoints: FileCheckpointStore::new(workspace.paths.checkpoints_dir()),
        }
    }

    fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            runner: &self.runner,
            tools: &self.tools,
            clock: &self.clock,
            checkpoints: &self.checkpoints,
        }
    }
}

/// Run a scope; the returned status decides the exit code.
pub fn run_run(workspace: &Workspace, args: &RunArgs, json: bool) -> Result<RunStatus> {
    workspace.require_registry()?;
    let host = Host::new(workspace);
    let engine = RunEngine::new(&workspace.paths, &workspace.config, host.collaborators());
    let options = RunOptions {
        refresh: args.refresh,
        jobs: args.jobs.map(usize::from),
        strict_tools: args.strict_tools.then_some(true),
        source_revision: args.source_revision.clone(),
        ..RunOptions::new(args.scope.scope())
    };

    let cancel = CancelToken::new();
    install_interrupt_handler(&cancel);
    let output = engine.run(&options, &cancel)?;

    if json {
        print_json(&output.report)?;
    } else {
        print_report(&output.report);
    }
    Ok(output.report.status)
}

pub fn run_plan(workspace: &Workspace, args: &PlanArgs, json: bool) -> Result<()> {
    workspace.require_registry()?;
    let host = Host::new(workspace);
    let engine = RunEngine::new(&workspace.paths, &workspace.config, host.collaborators());
    let ctx = engine.prepare(&args.scope.scope())?;
    if json {
        print_json(&ctx.plan)
    } else {
        print_plan(&ctx.plan);
        Ok(())
    }
}

pub fn run_capabilities(workspace: &Workspace, json: bool) -> Result<()> {
    let registry = workspace.load_registry()?;
    let probe = registry
        .definition()
        .capabilities_probe
        .as_deref()
        .ok_or_else(|| anyhow!("registry declares no capabilities_probe"))?;
    let host = Host::new(workspace);
    let capabilities =
        probe_capabilities(&host.runner, probe, workspace.config.default_timeout())?;
    if json {
        print_json(&capabilities)
    } else {
        for capability in &capabilities {
            println!("{capability}");
        }
        Ok(())
    }
}
