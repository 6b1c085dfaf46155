//! Manual state edits and administrative registry edits.
use super::Workspace;
use crate::cli::{AddItemArgs, IgnoreArgs, ItemArgs, ResolveArgs};
use crate::clock::{Clock, SystemClock};
use crate::output::print_json;
use crate::registry::{qualify, write_definition, ChecklistItem, Registry};
use anyhow::{Context, Result};

const DAY_MS: u128 = 86_400_000;

fn print_state(registry: &Registry, id: &str, json: bool, message: &str) -> Result<()> {
    if json {
        return print_json(&serde_json::json!({
            "item_id": id,
            "state": registry.state(id),
        }));
    }
    println!("{message}");
    Ok(())
}

pub fn run_resolve(workspace: &Workspace, args: &ResolveArgs, json: bool) -> Result<()> {
    let mut registry = workspace.load_registry()?;
    let now = SystemClock.now_epoch_ms()?;
    registry.mark_resolved(&args.item, args.reason.as_deref(), now)?;
    workspace.save_states(&registry)?;
    tracing::info!(item = %args.item, "item manually resolved");
    print_state(&registry, &args.item, json, &format!("resolved {}", args.item))
}

pub fn run_ignore(workspace: &Workspace, args: &IgnoreArgs, json: bool) -> Result<()> {
    let mut registry = workspace.load_registry()?;
    let now = SystemClock.now_epoch_ms()?;
    let until = args
        .for_days
        .map(|days| now + u128::from(days) * DAY_MS);
    registry.mark_ignored(&args.item, &args.reason, until, now)?;
    workspace.save_states(&registry)?;
    let message = match args.for_days {
        Some(days) => format!("ignored {} for {days} day(s)", args.item),
        None => format!("ignored {}", args.item),
    };
    print_state(&registry, &args.item, json, &message)
}

pub fn run_unignore(workspace: &Workspace, args: &ItemArgs, json: bool) -> Result<()> {
    let mut registry = workspace.load_registry()?;
    let cleared = registry.clear_ignore(&args.item)?;
    if cleared {
        workspace.save_states(&registry)?;
    }
    let message = if cleared {
        format!("cleared ignore mark on {}", args.item)
    } else {
        format!("{} was not ignored", args.item)
    };
    print_state(&registry, &args.item, json, &message)
}

pub fn run_add_item(workspace: &Workspace, args: &AddItemArgs, json: bool) -> Result<()> {
    let item: ChecklistItem =
        serde_json::from_str(&args.item_json).context("parse --item-json as a checklist item")?;
    let id = qualify(&args.feature, &item.id);
    let mut registry = workspace.load_registry()?;
    registry.add_item(&args.feature, item)?;
    write_definition(&workspace.registry_path(), registry.definition())?;
    tracing::info!(item = %id, "registry item added");
    if json {
        return print_json(&serde_json::json!({ "added": id }));
    }
    println!("added {id}");
    Ok(())
}

pub fn run_remove_item(workspace: &Workspace, args: &ItemArgs, json: bool) -> Result<()> {
    let mut registry = workspace.load_registry()?;
    registry.remove_item(&args.item)?;
    write_definition(&workspace.registry_path(), registry.definition())?;
    workspace.save_states(&registry)?;
    tracing::info!(item = %args.item, "registry item removed");
    if json {
        return print_json(&serde_json::json!({ "removed": args.item }));
    }
    println!("removed {}", args.item);
    Ok(())
}
