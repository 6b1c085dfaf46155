mod cache;
mod cancel;
mod check;
mod cli;
mod clock;
mod config;
mod coverage;
mod dispatch;
mod engine;
mod error;
mod history;
mod outcome;
mod output;
mod paths;
mod registry;
mod resolver;
mod scenario;
mod util;
mod workflow;

use anyhow::Result;
use clap::Parser;
use cli::{AdminCommand, Command, RootArgs};
use error::EngineError;
use std::process::ExitCode;
use workflow::Workspace;

fn main() -> ExitCode {
    let args = match RootArgs::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(EngineError::EXIT_CODE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let default_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match dispatch(&args) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EngineError::EXIT_CODE)
        }
    }
}

/// Run the selected command; returns the process exit code.
fn dispatch(args: &RootArgs) -> Result<u8> {
    if let Command::Init(init) = &args.command {
        workflow::run_init(&Workspace::with_defaults(&args.root), init)?;
        return Ok(0);
    }
    let workspace = Workspace::open(&args.root)?;
    let json = args.json;
    match &args.command {
        Command::Init(_) => {}
        Command::Run(run) => {
            let status = workflow::run_run(&workspace, run, json)?;
            return Ok(status.exit_code());
        }
        Command::Status(status) => workflow::run_status(&workspace, status, json)?,
        Command::Plan(plan) => workflow::run_plan(&workspace, plan, json)?,
        Command::Resolve(resolve) => workflow::run_resolve(&workspace, resolve, json)?,
        Command::Ignore(ignore) => workflow::run_ignore(&workspace, ignore, json)?,
        Command::Unignore(item) => workflow::run_unignore(&workspace, item, json)?,
        Command::Event(event) => workflow::run_event(&workspace, event, json)?,
        Command::Coverage(coverage) => workflow::run_coverage(&workspace, coverage, json)?,
        Command::Capabilities => workflow::run_capabilities(&workspace, json)?,
        Command::Admin(AdminCommand::AddItem(add)) => workflow::run_add_item(&workspace, add, json)?,
        Command::Admin(AdminCommand::RemoveItem(item)) => {
            workflow::run_remove_item(&workspace, item, json)?
        }
    }
    Ok(0)
}
