//! Collaborator process execution with a bounded wait.
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// One external command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub argv: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl Invocation {
    /// Split a command string with shell-words; argv[0] is the executable.
    pub fn parse(command: &str, timeout: Duration) -> Result<Self> {
        let argv = shell_words::split(command)
            .with_context(|| format!("parse command {command:?}"))?;
        if argv.is_empty() {
            return Err(anyhow!("empty command"));
        }
        Ok(Self {
            argv,
            env: BTreeMap::new(),
            timeout,
        })
    }

    pub fn with_env(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    pub fn command_line(&self) -> String {
        format_command_line(&self.argv)
    }
}

/// What a collaborator returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when terminated by a signal or killed on timeout.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub elapsed_ms: u128,
}

impl ProcessOutput {
    pub fn exit_code_string(&self) -> String {
        match self.exit_code {
            Some(code) => code.to_string(),
            None if self.timed_out => "timed out".to_string(),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Executes invocations. `Err` means the process could not be started at all.
pub trait CommandRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> Result<ProcessOutput>;
}

/// Spawns processes directly (no shell), reading both pipes on dedicated
/// threads and killing the process group when the timeout elapses.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner {
    cwd: Option<PathBuf>,
}

impl ShellRunner {
    pub fn new(cwd: Option<PathBuf>) -> Self {
        Self { cwd }
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        let started = Instant::now();
        let (program, args) = invocation
            .argv
            .split_first()
            .ok_or_else(|| anyhow!("empty command"))?;
        let mut command = Command::new(program);
        command
            .args(args)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        let mut child = command
            .spawn()
            .with_context(|| format!("spawn {}", invocation.command_line()))?;
        let pid = child.id();

        let stdout_thread = spawn_reader(child.stdout.take());
        let stderr_thread = spawn_reader(child.stderr.take());

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(child.wait());
        });

        match rx.recv_timeout(invocation.timeout) {
            Ok(status) => {
                let status = status.context("wait for collaborator")?;
                let stdout = stdout_thread.join().unwrap_or_default();
                let stderr = stderr_thread.join().unwrap_or_default();
                Ok(ProcessOutput {
                    exit_code: status.code(),
                    stdout,
                    stderr,
                    timed_out: false,
                    elapsed_ms: started.elapsed().as_millis(),
                })
            }
            Err(_) => {
                kill_process_group(pid);
                tracing::debug!(
                    command = %invocation.command_line(),
                    timeout_ms = invocation.timeout.as_millis() as u64,
                    "collaborator timed out"
                );
                Ok(ProcessOutput {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    timed_out: true,
                    elapsed_ms: started.elapsed().as_millis(),
                })
            }
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    handle: Option<R>,
) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut bytes = Vec::new();
        if let Some(mut reader) = handle {
            let _ = reader.read_to_end(&mut bytes);
        }
        String::from_utf8_lossy(&bytes).into_owned()
    })
}

/// SIGKILL the whole process group so grandchildren release the pipes.
fn kill_process_group(pid: u32) {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions; a stale pid only yields ESRCH.
    unsafe {
        libc::kill(-pid, libc::SIGKILL);
    }
}

/// Bounded excerpt of collaborator output for reports.
pub fn bounded_snippet(text: &str, max_lines: usize, max_bytes: usize) -> String {
    let marker = "\n[... output truncated ...]\n";
    if max_lines == 0 || max_bytes == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut truncated = false;
    for (line_idx, chunk) in text.split_inclusive('\n').enumerate() {
        if line_idx >= max_lines {
            truncated = true;
            break;
        }
        if out.len() + chunk.len() > max_bytes {
            out.push_str(truncate_utf8(chunk, max_bytes.saturating_sub(out.len())));
            truncated = true;
            break;
        }
        out.push_str(chunk);
    }
    if !truncated {
        return out;
    }
    if max_bytes <= marker.len() {
        return truncate_utf8(marker, max_bytes).to_string();
    }
    let available = max_bytes - marker.len();
    if out.len() > available {
        out = truncate_utf8(&out, available).to_string();
    }
    out.push_str(marker);
    out
}

fn truncate_utf8(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

pub fn format_command_line(argv: &[String]) -> String {
    argv.iter()
        .map(String::as_str)
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }
    let safe = arg.chars().all(|ch| {
        ch.is_ascii_alphanumeric()
            || matches!(ch, '_' | '-' | '.' | '/' | ':' | '@' | '+' | '=' | ',')
    });
    if safe {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', "'\"'\"'"))
}

/// Scripted runner for tests: replies by command line, records every call.
#[cfg(test)]
pub(crate) mod scripted {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct ScriptedRunner {
        replies: Mutex<BTreeMap<String, Vec<ProcessOutput>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Queue a reply; the last queued reply for a command repeats.
        pub(crate) fn reply(&self, command: &str, exit_code: i32, stdout: &str) {
            self.push(
                command,
                ProcessOutput {
                    exit_code: Some(exit_code),
                    stdout: stdout.to_string(),
                    ..ProcessOutput::default()
                },
            );
        }

        pub(crate) fn push(&self, command: &str, output: ProcessOutput) {
            self.replies
                .lock()
                .expect("replies")
                .entry(command.to_string())
                .or_default()
                .push(output);
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls").clone()
        }

        pub(crate) fn count(&self, command: &str) -> usize {
            self.calls()
                .iter()
                .filter(|call| call.as_str() == command)
                .count()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, invocation: &Invocation) -> Result<ProcessOutput> {
            let line = invocation.command_line();
            self.calls.lock().expect("calls").push(line.clone());
            let mut replies = self.replies.lock().expect("replies");
            let queue = replies
                .get_mut(&line)
                .ok_or_else(|| anyhow!("no scripted reply for {line}"))?;
            if queue.len() > 1 {
                Ok(queue.remove(0))
            } else {
                queue
                    .first()
                    .cloned()
                    .ok_or_else(|| anyhow!("no scripted reply for {line}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(command: &str, timeout_ms: u64) -> Invocation {
        Invocation::parse(command, Duration::from_millis(timeout_ms)).expect("parse")
    }

    #[test]
    fn shell_runner_captures_exit_code_and_streams() {
        let runner = ShellRunner::default();
        let output = runner
            .run(&invocation("sh -c 'echo out; echo err >&2; exit 3'", 10_000))
            .expect("run");
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert!(!output.timed_out);
    }

    #[test]
    fn shell_runner_passes_environment() {
        let runner = ShellRunner::default();
        let mut env = BTreeMap::new();
        env.insert("OPSVERIFY_PROBE".to_string(), "present".to_string());
        let output = runner
            .run(&invocation("sh -c 'printf %s \"$OPSVERIFY_PROBE\"'", 10_000).with_env(&env))
            .expect("run");
        assert_eq!(output.stdout, "present");
    }

    #[test]
    fn shell_runner_kills_on_timeout() {
        let runner = ShellRunner::default();
        let started = Instant::now();
        let output = runner
            .run(&invocation("sh -c 'sleep 5'", 150))
            .expect("run");
        assert!(output.timed_out);
        assert_eq!(output.exit_code, None);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let runner = ShellRunner::default();
        assert!(runner
            .run(&invocation("opsverify-definitely-missing-binary", 1_000))
            .is_err());
    }

    #[test]
    fn bounded_snippet_marks_truncation() {
        assert_eq!(bounded_snippet("a\nb\n", 5, 100), "a\nb\n");
        let snippet = bounded_snippet("a\nb\nc\n", 1, 100);
        assert!(snippet.starts_with("a\n"));
        assert!(snippet.contains("output truncated"));
    }

    #[test]
    fn command_line_quotes_unsafe_arguments() {
        let argv = vec!["sh".to_string(), "-c".to_string(), "echo it's".to_string()];
        assert_eq!(format_command_line(&argv), r#"sh -c 'echo it'"'"'s'"#);
    }
}
