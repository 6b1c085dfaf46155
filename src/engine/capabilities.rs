//! Capability declarations reported by the host CLI.
//!
//! The probe prints a JSON array of capability names. Features that name a
//! capability only run when the host declares it.
use crate::check::{CommandRunner, Invocation};
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeSet;
use std::time::Duration;

pub fn probe_capabilities(
    runner: &dyn CommandRunner,
    command: &str,
    timeout: Duration,
) -> Result<BTreeSet<String>> {
    let invocation = Invocation::parse(command, timeout)?;
    let output = runner
        .run(&invocation)
        .with_context(|| format!("run capabilities probe `{}`", invocation.command_line()))?;
    if output.timed_out {
        return Err(anyhow!(
            "capabilities probe `{}` timed out",
            invocation.command_line()
        ));
    }
    if output.exit_code != Some(0) {
        return Err(anyhow!(
            "capabilities probe `{}` exited {}",
            invocation.command_line(),
            output.exit_code_string()
        ));
    }
    let names: Vec<String> =
        serde_json::from_str(output.stdout.trim()).context("parse capabilities probe output")?;
    Ok(names.into_iter().collect())
}
