//! Command handlers.
//!
//! Each handler opens a fresh [`Workspace`], calls one library operation and
//! renders the result, so the CLI stays thin.
mod context;
mod event;
mod init;
mod items;
mod run;
mod status;

pub(crate) use context::Workspace;
pub use event::{run_coverage, run_event};
pub use init::run_init;
pub use items::{run_add_item, run_ignore, run_remove_item, run_resolve, run_unignore};
pub use run::{run_capabilities, run_plan, run_run};
pub use status::run_status;
