//! External command execution: required vs best-effort actions.
//!
//! Every subprocess the maintenance flows spawn goes through a
//! [`CommandRunner`] so the orchestrators can be exercised against a
//! [`RecordingRunner`] in tests. Required actions propagate failure;
//! best-effort actions fold failure into [`BestEffort::Ignored`].

#![allow(missing_docs)]

use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use parking_lot::Mutex;
use serde::Serialize;

use crate::core::errors::{OrbitError, Result};

/// Program + argument vector for one external command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    #[must_use]
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub success: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Successful, empty output.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            code: Some(0),
            success: true,
            ..Self::default()
        }
    }

    /// Failed with the given exit code and stderr text.
    #[must_use]
    pub fn failed(code: i32, stderr: &str) -> Self {
        Self {
            code: Some(code),
            success: false,
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    #[must_use]
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// `exit N` or `terminated by signal`.
    #[must_use]
    pub fn status_label(&self) -> String {
        self.code
            .map_or_else(|| "terminated by signal".to_string(), |c| format!("exit {c}"))
    }
}

/// Spawns external commands and waits for them.
pub trait CommandRunner: Send + Sync {
    /// Run to completion, capturing output. `Err` only when the process could
    /// not be started at all; a non-zero exit is reported in the output.
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// [`CommandRunner`] backed by `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let output = Command::new(&spec.program)
            .args(&spec.args)
            .output()
            .map_err(|source| OrbitError::Io {
                path: PathBuf::from(&spec.program),
                source,
            })?;
        Ok(CommandOutput {
            code: output.status.code(),
            success: output.status.success(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Result of an action whose failure is an expected, non-error state
/// (stopping a service that is not running, forgetting an absent package).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BestEffort {
    /// The command ran and exited zero.
    Completed,
    /// The command failed or could not start; deliberately not propagated.
    Ignored { reason: String },
    /// Dry run: described to the operator, never executed.
    Skipped,
}

/// Run a command whose failure must not stop the caller.
pub fn run_best_effort(runner: &dyn CommandRunner, spec: &CommandSpec) -> BestEffort {
    match runner.run(spec) {
        Ok(output) if output.success => BestEffort::Completed,
        Ok(output) => BestEffort::Ignored {
            reason: format!(
                "{spec} ({}): {}",
                output.status_label(),
                output.stderr_lossy().trim()
            ),
        },
        Err(e) => BestEffort::Ignored {
            reason: e.to_string(),
        },
    }
}

/// Run a command that must succeed; a non-zero exit becomes
/// [`OrbitError::ToolFailed`].
pub fn run_required(runner: &dyn CommandRunner, spec: &CommandSpec) -> Result<CommandOutput> {
    let output = runner.run(spec)?;
    if output.success {
        Ok(output)
    } else {
        Err(OrbitError::ToolFailed {
            tool: spec.to_string(),
            details: format!(
                "{}: {}",
                output.status_label(),
                output.stderr_lossy().trim()
            ),
        })
    }
}

type Responder = Box<dyn Fn(&CommandSpec) -> Result<CommandOutput> + Send + Sync>;

/// Test double that records every command and answers from a closure.
pub struct RecordingRunner {
    calls: Mutex<Vec<CommandSpec>>,
    responder: Responder,
}

impl RecordingRunner {
    /// Every command succeeds with empty output.
    #[must_use]
    pub fn succeeding() -> Self {
        Self::with_responder(|_| Ok(CommandOutput::ok()))
    }

    /// Every command exits non-zero.
    #[must_use]
    pub fn failing() -> Self {
        Self::with_responder(|_| Ok(CommandOutput::failed(1, "not running")))
    }

    #[must_use]
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&CommandSpec) -> Result<CommandOutput> + Send + Sync + 'static,
    {
        Self {
            calls: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    /// Commands run so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }

    /// Rendered command lines run so far.
    #[must_use]
    pub fn call_lines(&self) -> Vec<String> {
        self.calls.lock().iter().map(ToString::to_string).collect()
    }
}

impl fmt::Debug for RecordingRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingRunner")
            .field("calls", &self.calls.lock().len())
            .finish_non_exhaustive()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().push(spec.clone());
        (self.responder)(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_args_with_spaces() {
        let spec = CommandSpec::new("net", &["stop", "Fleet osquery"]);
        assert_eq!(spec.to_string(), "net stop 'Fleet osquery'");
    }

    #[test]
    fn best_effort_swallows_non_zero_exit() {
        let runner = RecordingRunner::failing();
        let spec = CommandSpec::new("systemctl", &["stop", "orbit.service"]);
        let outcome = run_best_effort(&runner, &spec);
        match outcome {
            BestEffort::Ignored { reason } => {
                assert!(reason.contains("systemctl stop orbit.service"));
                assert!(reason.contains("exit 1"));
            }
            BestEffort::Completed | BestEffort::Skipped => {
                panic!("failure should be ignored, not completed or skipped")
            }
        }
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn best_effort_swallows_spawn_failure() {
        let runner = RecordingRunner::with_responder(|spec| {
            Err(OrbitError::io(
                &spec.program,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            ))
        });
        let outcome = run_best_effort(&runner, &CommandSpec::new("pkill", &["fleet-desktop"]));
        assert!(matches!(outcome, BestEffort::Ignored { .. }));
    }

    #[test]
    fn required_propagates_non_zero_exit() {
        let runner = RecordingRunner::failing();
        let err = run_required(&runner, &CommandSpec::new("fleet", &["prepare", "db"]))
            .expect_err("non-zero exit must propagate");
        assert_eq!(err.code(), "ORB-2002");
        assert!(err.to_string().contains("fleet prepare db"));
    }

    #[test]
    fn required_returns_output_on_success() {
        let runner = RecordingRunner::with_responder(|_| {
            Ok(CommandOutput {
                code: Some(0),
                success: true,
                stdout: b"done".to_vec(),
                stderr: Vec::new(),
            })
        });
        let output = run_required(&runner, &CommandSpec::new("true", &[])).unwrap();
        assert_eq!(output.stdout_lossy(), "done");
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_reports_exit_code() {
        let output = SystemRunner
            .run(&CommandSpec::new("sh", &["-c", "echo hi; exit 3"]))
            .expect("sh should start");
        assert!(!output.success);
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout_lossy().trim(), "hi");
    }

    #[test]
    fn system_runner_missing_binary_is_io_error() {
        let err = SystemRunner
            .run(&CommandSpec::new("/nonexistent/orbit-maint-missing-binary", &[]))
            .expect_err("missing binary should not start");
        assert_eq!(err.code(), "ORB-3002");
    }
}
