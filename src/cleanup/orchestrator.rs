//! Cleanup orchestration: privilege check, confirmation gate, then the
//! planned steps in order under the chosen error policy.

#![allow(missing_docs)]

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::cleanup::report::{CleanupFailure, CleanupResult};
use crate::cleanup::targets::{Category, category_paths};
use crate::core::errors::{OrbitError, Result};
use crate::logger::activity::ActivityLogger;
use crate::logger::jsonl::{EventType, LogEntry, Severity};
use crate::platform::command::{BestEffort, CommandRunner, CommandSpec, run_best_effort};
use crate::platform::pal::PlatformPolicy;

pub const CONFIRM_PROMPT: &str = "This will delete orbit data. Continue? [y/N]: ";

// ---------------------------------------------------------------------------
// Request model
// ---------------------------------------------------------------------------

/// Standard-mode category flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategorySelection {
    pub logs: bool,
    pub cache: bool,
    pub secrets: bool,
    pub registry: bool,
    pub service: bool,
}

impl CategorySelection {
    #[must_use]
    pub const fn all() -> Self {
        Self {
            logs: true,
            cache: true,
            secrets: true,
            registry: true,
            service: true,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !(self.logs || self.cache || self.secrets || self.registry || self.service)
    }

    const fn includes(&self, category: Category) -> bool {
        match category {
            Category::Logs => self.logs,
            Category::Cache => self.cache,
            Category::Secrets => self.secrets,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupMode {
    /// Interactive maintenance of a regular agent install.
    Standard(CategorySelection),
    /// OpenFrame-managed host: stop the collector, clear all data categories,
    /// leave the agent service alone.
    OpenFrame { osquery_path: PathBuf },
}

impl CleanupMode {
    /// Standard cleanup leaves the osquery collector running; only OpenFrame
    /// mode stops it.
    #[must_use]
    pub const fn keeps_collector(&self) -> bool {
        matches!(self, Self::Standard(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Abort at the first removal error.
    #[default]
    FailFast,
    /// Attempt every path and report the error count.
    ContinueOnError,
}

#[derive(Debug, Clone)]
pub struct CleanupRequest {
    pub root_dir: PathBuf,
    pub mode: CleanupMode,
    pub dry_run: bool,
    pub force: bool,
    pub error_policy: ErrorPolicy,
    pub backup_suffix: String,
}

/// One unit of work, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupStep {
    StopAgent,
    StopCollector(PathBuf),
    Remove(Category),
    Registry,
    ServiceFiles,
}

/// Order the steps a mode implies.
#[must_use]
pub fn plan_steps(mode: &CleanupMode) -> Vec<CleanupStep> {
    match mode {
        CleanupMode::Standard(selection) => {
            let mut steps = Vec::new();
            if selection.service {
                steps.push(CleanupStep::StopAgent);
            }
            steps.extend(
                Category::ALL
                    .into_iter()
                    .filter(|c| selection.includes(*c))
                    .map(CleanupStep::Remove),
            );
            if selection.registry {
                steps.push(CleanupStep::Registry);
            }
            if selection.service {
                steps.push(CleanupStep::ServiceFiles);
            }
            steps
        }
        CleanupMode::OpenFrame { osquery_path } => {
            let mut steps = vec![CleanupStep::StopCollector(osquery_path.clone())];
            steps.extend(Category::ALL.into_iter().map(CleanupStep::Remove));
            steps
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The operator declined the confirmation prompt; nothing was touched.
    Cancelled,
    Completed(CleanupResult),
}

// ---------------------------------------------------------------------------
// Filesystem seam
// ---------------------------------------------------------------------------

/// Removes paths. Swappable so failure handling can be tested without
/// relying on filesystem permissions.
pub trait PathRemover: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// Real filesystem: directories recursively, everything else as a file.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsRemover;

impl PathRemover for FsRemover {
    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Ask the operator to confirm. Only `y` or `Y` proceeds.
pub fn confirm(input: &mut dyn BufRead, out: &mut dyn Write) -> bool {
    let _ = write!(out, "{CONFIRM_PROMPT}");
    let _ = out.flush();
    let mut answer = String::new();
    if input.read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y")
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs a [`CleanupRequest`] against injected platform, process and
/// filesystem seams.
pub struct Cleanup<'a> {
    pub policy: &'a dyn PlatformPolicy,
    pub runner: &'a dyn CommandRunner,
    pub remover: &'a dyn PathRemover,
    pub logger: &'a ActivityLogger,
}

impl Cleanup<'_> {
    /// Execute the request. Progress lines go to `out`. The confirmation
    /// prompt and a cancellation notice go to `prompt`, and the answer is
    /// read from `input`.
    pub fn run(
        &self,
        request: &CleanupRequest,
        input: &mut dyn BufRead,
        prompt: &mut dyn Write,
        out: &mut dyn Write,
    ) -> Result<CleanupOutcome> {
        if let CleanupMode::Standard(selection) = &request.mode
            && selection.is_empty()
        {
            return Err(OrbitError::InvalidConfig {
                details: "no cleanup category selected; pass --all or at least one of \
                          --logs, --cache, --secrets, --registry, --service"
                    .to_string(),
            });
        }

        // Dry runs mutate nothing, so they need no elevation.
        if !request.dry_run && !self.policy.has_admin_privileges(self.runner) {
            return Err(OrbitError::PrivilegeRequired);
        }

        let gated = matches!(request.mode, CleanupMode::Standard(_));
        if gated && !request.force && !request.dry_run && !confirm(input, prompt) {
            let _ = writeln!(prompt, "Cleanup cancelled.");
            return Ok(CleanupOutcome::Cancelled);
        }

        if request.dry_run {
            let _ = writeln!(out, "DRY RUN - No files will be deleted");
            let _ = writeln!(out);
        }

        self.logger.record(
            &LogEntry::new(EventType::CleanupStart, Severity::Info).with_path(&request.root_dir),
        );

        let mut total = CleanupResult::default();
        for step in plan_steps(&request.mode) {
            let result = self.run_step(&step, request, out);
            let failed = result.has_errors();
            total.merge(result);
            if failed && request.error_policy == ErrorPolicy::FailFast {
                let _ = writeln!(out, "Stopping after first error (fail-fast).");
                break;
            }
        }

        self.logger.record(
            &LogEntry::new(
                EventType::CleanupComplete,
                if total.has_errors() {
                    Severity::Warning
                } else {
                    Severity::Info
                },
            )
            .with_ok(!total.has_errors())
            .with_details(format!(
                "removed={} stopped={} errors={}",
                total.removed.len(),
                total.stopped.len(),
                total.errors.len()
            )),
        );
        Ok(CleanupOutcome::Completed(total))
    }

    fn run_step(
        &self,
        step: &CleanupStep,
        request: &CleanupRequest,
        out: &mut dyn Write,
    ) -> CleanupResult {
        match step {
            CleanupStep::StopAgent => {
                let _ = writeln!(out, "Stopping orbit service and fleet-desktop...");
                self.run_commands(&self.policy.agent_stop_commands(), request.dry_run, out);
                CleanupResult {
                    stopped: vec![self.policy.agent_service_label().to_string()],
                    ..CleanupResult::default()
                }
            }
            CleanupStep::StopCollector(osquery_path) => {
                let _ = writeln!(out, "Stopping osquery collector {}...", osquery_path.display());
                self.run_commands(
                    &self.policy.collector_stop_commands(osquery_path),
                    request.dry_run,
                    out,
                );
                CleanupResult {
                    stopped: vec![osquery_path.display().to_string()],
                    ..CleanupResult::default()
                }
            }
            CleanupStep::Remove(category) => {
                let _ = writeln!(out, "Cleaning {category}...");
                let paths = category_paths(
                    *category,
                    &request.root_dir,
                    self.policy,
                    &request.backup_suffix,
                );
                self.remove_paths(&paths, request, out)
            }
            CleanupStep::Registry => {
                let commands = self.policy.registry_commands();
                if !commands.is_empty() {
                    let _ = writeln!(out, "Cleaning Windows registry...");
                    self.run_commands(&commands, request.dry_run, out);
                }
                CleanupResult::default()
            }
            CleanupStep::ServiceFiles => {
                let _ = writeln!(out, "Cleaning service configuration files...");
                let result = self.remove_paths(&self.policy.service_files(), request, out);
                if !(result.has_errors() && request.error_policy == ErrorPolicy::FailFast) {
                    self.run_commands(
                        &self.policy.service_followup_commands(),
                        request.dry_run,
                        out,
                    );
                }
                result
            }
        }
    }

    fn remove_paths(
        &self,
        paths: &[PathBuf],
        request: &CleanupRequest,
        out: &mut dyn Write,
    ) -> CleanupResult {
        let mut result = CleanupResult::default();
        for path in paths {
            if !self.remover.exists(path) {
                continue;
            }
            if request.dry_run {
                let _ = writeln!(out, "  Would remove: {}", path.display());
                result.removed.push(path.clone());
                continue;
            }

            let _ = writeln!(out, "  Removing: {}", path.display());
            match self.remover.remove(path) {
                Ok(()) => {
                    self.logger.record(
                        &LogEntry::new(EventType::PathRemoved, Severity::Info)
                            .with_path(path)
                            .with_ok(true),
                    );
                    result.removed.push(path.clone());
                }
                Err(source) => {
                    let err = OrbitError::Removal {
                        path: path.clone(),
                        source,
                    };
                    let _ = writeln!(out, "  Failed: {err}");
                    self.logger.record(
                        &LogEntry::new(EventType::RemovalFailed, Severity::Warning)
                            .with_path(path)
                            .with_error(&err),
                    );
                    result.errors.push(CleanupFailure {
                        path: Some(path.clone()),
                        code: err.code().to_string(),
                        message: err.to_string(),
                    });
                    if request.error_policy == ErrorPolicy::FailFast {
                        break;
                    }
                }
            }
        }
        result
    }

    fn run_commands(&self, commands: &[CommandSpec], dry_run: bool, out: &mut dyn Write) {
        for command in commands {
            let outcome = if dry_run {
                let _ = writeln!(out, "  Would run: {command}");
                BestEffort::Skipped
            } else {
                run_best_effort(self.runner, command)
            };
            match outcome {
                BestEffort::Completed => self.logger.record(
                    &LogEntry::new(EventType::CommandRun, Severity::Info)
                        .with_command(command.to_string())
                        .with_ok(true),
                ),
                BestEffort::Ignored { reason } => self.logger.record(
                    &LogEntry::new(EventType::CommandIgnored, Severity::Info)
                        .with_command(command.to_string())
                        .with_ok(false)
                        .with_details(reason),
                ),
                BestEffort::Skipped => {}
            }
        }
    }
}
