//! CLI argument parsing.
//!
//! The CLI stays thin: every command loads fresh state under `--root`, calls
//! one library operation, and renders the result.
use crate::registry::Category;
use crate::resolver::Scope;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "opsverify",
    version,
    about = "Checklist verification and scenario orchestration for operations CLIs",
    after_help = "Examples:\n  opsverify init\n  opsverify run --category automatable\n  opsverify run --item site/backup --refresh\n  opsverify event --command backup -- --site demo\n  opsverify coverage --json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Directory holding config.json, registry.json and state/
    #[arg(long, global = true, env = "OPSVERIFY_ROOT", default_value = ".", value_name = "DIR")]
    pub root: PathBuf,

    /// Emit machine-readable JSON output
    #[arg(long, global = true)]
    pub json: bool,

    /// Log per-item detail to stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Init(InitArgs),
    Run(RunArgs),
    Status(StatusArgs),
    Plan(PlanArgs),
    Resolve(ResolveArgs),
    Ignore(IgnoreArgs),
    /// Clear an ignore mark
    Unignore(ItemArgs),
    Event(EventArgs),
    Coverage(CoverageArgs),
    /// Print the capabilities declared by the host CLI
    Capabilities,
    /// Administrative registry edits
    #[command(subcommand)]
    Admin(AdminCommand),
}

#[derive(Parser, Debug)]
#[command(about = "Write config.json and a stub registry.json")]
pub struct InitArgs {
    /// Overwrite existing files
    #[arg(long)]
    pub force: bool,
}

/// Scope selection shared by `run` and `plan`.
#[derive(Args, Debug)]
pub struct ScopeArgs {
    /// Limit to one category (automatable, human_required, ...)
    #[arg(long, value_name = "CATEGORY", conflicts_with = "item")]
    pub category: Option<Category>,

    /// Limit to one qualified item id (feature/item)
    #[arg(long, value_name = "ID")]
    pub item: Option<String>,
}

impl ScopeArgs {
    pub fn scope(&self) -> Scope {
        match (&self.category, &self.item) {
            (_, Some(item)) => Scope::Item(item.clone()),
            (Some(category), None) => Scope::Category(*category),
            (None, None) => Scope::All,
        }
    }
}

#[derive(Parser, Debug)]
#[command(about = "Verify items and write a new coverage snapshot")]
pub struct RunArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Ignore cached outcomes
    #[arg(long)]
    pub refresh: bool,

    /// Concurrent checks per wave (overrides config)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    pub jobs: Option<u16>,

    /// Report missing tools as failures instead of skips
    #[arg(long)]
    pub strict_tools: bool,

    /// Source revision recorded in the snapshot and history
    #[arg(long, value_name = "REV")]
    pub source_revision: Option<String>,
}

#[derive(Parser, Debug)]
#[command(about = "Print the execution plan without running anything")]
pub struct PlanArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,
}

#[derive(Parser, Debug)]
#[command(about = "List items with their recorded state")]
pub struct StatusArgs {
    /// Limit to one category
    #[arg(long, value_name = "CATEGORY")]
    pub category: Option<Category>,
}

#[derive(Args, Debug)]
pub struct ItemArgs {
    /// Qualified item id (feature/item)
    #[arg(long, value_name = "ID")]
    pub item: String,
}

#[derive(Parser, Debug)]
#[command(about = "Mark an item as manually verified")]
pub struct ResolveArgs {
    /// Qualified item id (feature/item)
    #[arg(long, value_name = "ID")]
    pub item: String,

    /// Note recorded with the verification
    #[arg(long)]
    pub reason: Option<String>,
}

#[derive(Parser, Debug)]
#[command(about = "Exclude an item from runs and coverage")]
pub struct IgnoreArgs {
    /// Qualified item id (feature/item)
    #[arg(long, value_name = "ID")]
    pub item: String,

    /// Why the item is ignored
    #[arg(long)]
    pub reason: String,

    /// Expire the ignore mark after N days
    #[arg(long, value_name = "N")]
    pub for_days: Option<u32>,
}

#[derive(Parser, Debug)]
#[command(about = "Record a host command completion and apply auto-resolution")]
pub struct EventArgs {
    /// Host command name
    #[arg(long, value_name = "NAME")]
    pub command: String,

    /// Exit code of the host command
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub exit_code: i32,

    /// Arguments the host command was invoked with
    #[arg(last = true, value_name = "ARGS")]
    pub arguments: Vec<String>,
}

#[derive(Parser, Debug)]
#[command(about = "Print the current coverage snapshot")]
pub struct CoverageArgs {
    /// Recompute from item state instead of reading the last snapshot
    #[arg(long)]
    pub recompute: bool,
}

/// Registry edits; the only commands that write registry.json.
#[derive(Subcommand, Debug)]
pub enum AdminCommand {
    /// Add an item to a feature
    AddItem(AddItemArgs),
    /// Remove an item and its state
    RemoveItem(ItemArgs),
}

#[derive(Args, Debug)]
pub struct AddItemArgs {
    /// Feature id the item belongs to
    #[arg(long, value_name = "FEATURE")]
    pub feature: String,

    /// Checklist item as JSON
    #[arg(long, value_name = "JSON")]
    pub item_json: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_flags_map_to_scopes() {
        let args = RootArgs::parse_from(["opsverify", "run", "--category", "human_required"]);
        let Command::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.scope.scope(), Scope::Category(Category::HumanRequired));

        let args = RootArgs::parse_from(["opsverify", "plan", "--item", "site/backup"]);
        let Command::Plan(plan) = args.command else {
            panic!("expected plan");
        };
        assert_eq!(plan.scope.scope(), Scope::Item("site/backup".to_string()));
    }

    #[test]
    fn event_takes_trailing_arguments_and_global_flags() {
        let args = RootArgs::parse_from([
            "opsverify",
            "event",
            "--command",
            "backup",
            "--exit-code",
            "0",
            "--json",
            "--",
            "--site",
            "demo",
        ]);
        assert!(args.json);
        let Command::Event(event) = args.command else {
            panic!("expected event");
        };
        assert_eq!(event.command, "backup");
        assert_eq!(event.arguments, vec!["--site", "demo"]);
    }

    #[test]
    fn unknown_category_is_rejected() {
        assert!(RootArgs::try_parse_from(["opsverify", "status", "--category", "nope"]).is_err());
    }
}
