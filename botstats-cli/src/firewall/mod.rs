//! Firewall integration.
//!
//! External programs run through [`CommandRunner`] so rule handling can be
//! tested without touching the host firewall.

pub mod ufw;

pub use ufw::{parse_expiring_rules, ExpiringRule, UfwRuleSink, RULE_COMMENT_PREFIX};

use std::collections::VecDeque;
use std::io;
use std::process::Command;
use std::sync::{Arc, Mutex};

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status; -1 when terminated by a signal.
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

/// Trait for running external programs.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and wait for it to finish.
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput>;
}

/// Runs programs on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        let output = Command::new(program).args(args).output()?;
        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Debug, Default)]
struct MockRunnerState {
    calls: Vec<Vec<String>>,
    responses: VecDeque<io::Result<CommandOutput>>,
}

/// Mock runner that records invocations and replays queued responses.
/// Once the queue is empty every call succeeds with empty output.
/// Cloning creates a new handle to the same underlying data.
#[derive(Debug, Clone, Default)]
pub struct MockCommandRunner {
    state: Arc<Mutex<MockRunnerState>>,
}

impl MockCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the output of the next call.
    pub fn push_output(&self, output: CommandOutput) {
        self.state.lock().unwrap().responses.push_back(Ok(output));
    }

    /// Queue a spawn failure for the next call.
    pub fn push_spawn_error(&self, kind: io::ErrorKind) {
        self.state
            .lock()
            .unwrap()
            .responses
            .push_back(Err(io::Error::new(kind, "spawn failed")));
    }

    /// Every call so far as `[program, args...]`.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Every call so far joined with spaces.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.join(" ")).collect()
    }
}

impl CommandRunner for MockCommandRunner {
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        let mut call = vec![program.to_string()];
        call.extend(args.iter().cloned());
        state.calls.push(call);
        state
            .responses
            .pop_front()
            .unwrap_or_else(|| Ok(CommandOutput::success("")))
    }
}
