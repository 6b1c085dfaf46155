//! Shared test infrastructure for CLI integration tests.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// A throwaway `--root` plus helpers to drive the built binary against it.
pub struct TestRoot {
    dir: TempDir,
}

/// Exit code, stdout and stderr of one invocation.
pub struct RunResult {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunResult {
    /// Parse stdout as JSON (commands run with `--json`).
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.stdout).unwrap_or_else(|err| {
            panic!(
                "stdout is not JSON ({err}):\n{}\nstderr:\n{}",
                self.stdout, self.stderr
            )
        })
    }
}

impl From<Output> for RunResult {
    fn from(output: Output) -> Self {
        Self {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

impl TestRoot {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp root"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write_registry(&self, registry: &Value) {
        let text = serde_json::to_string_pretty(registry).expect("serialize registry");
        std::fs::write(self.file("registry.json"), text).expect("write registry");
    }

    pub fn read_json(&self, rel: &str) -> Value {
        let text = std::fs::read_to_string(self.file(rel))
            .unwrap_or_else(|err| panic!("read {rel}: {err}"));
        serde_json::from_str(&text).unwrap_or_else(|err| panic!("parse {rel}: {err}"))
    }

    pub fn run(&self, args: &[&str]) -> RunResult {
        Command::new(env!("CARGO_BIN_EXE_opsverify"))
            .arg("--root")
            .arg(self.path())
            .args(args)
            .env_remove("OPSVERIFY_ROOT")
            .env_remove("RUST_LOG")
            .output()
            .expect("run opsverify")
            .into()
    }
}

/// Find an item report in a `run --json` report.
pub fn item<'a>(report: &'a Value, id: &str) -> &'a Value {
    report["items"]
        .as_array()
        .expect("items array")
        .iter()
        .find(|item| item["item_id"] == id)
        .unwrap_or_else(|| panic!("no report for {id}: {report}"))
}
