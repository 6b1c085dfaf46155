//! External tool discovery.
use std::path::PathBuf;

/// Locates executables a check needs before it runs.
pub trait ToolLocator: Send + Sync {
    fn locate(&self, tool: &str) -> Option<PathBuf>;
}

/// Resolves tools against `PATH` (or as a literal path when one is given).
///
/// Relative paths such as `./checks/site.sh` resolve against `cwd`, the same
/// directory `ShellRunner` spawns commands in.
#[derive(Debug, Clone, Default)]
pub struct PathLocator {
    cwd: Option<PathBuf>,
}

impl PathLocator {
    pub fn new(cwd: Option<PathBuf>) -> Self {
        Self { cwd }
    }
}

impl ToolLocator for PathLocator {
    fn locate(&self, tool: &str) -> Option<PathBuf> {
        match &self.cwd {
            Some(cwd) => which::which_in(tool, std::env::var_os("PATH"), cwd).ok(),
            None => which::which(tool).ok(),
        }
    }
}

/// First tool (argv[0] included) that cannot be located, in declaration order.
pub fn first_missing_tool<'a>(
    locator: &dyn ToolLocator,
    program: &'a str,
    required: &'a [String],
) -> Option<&'a str> {
    std::iter::once(program)
        .chain(required.iter().map(String::as_str))
        .find(|tool| locator.locate(tool).is_none())
}
