//! Cleanup result accumulation and summary rendering.

#![allow(missing_docs)]

use std::path::PathBuf;

use serde::Serialize;

/// One recorded failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupFailure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub code: String,
    pub message: String,
}

/// What one step (or a whole run) did. Steps return their own result and
/// the orchestrator merges them in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupResult {
    /// Removed paths, or paths that would be removed in a dry run.
    pub removed: Vec<PathBuf>,
    /// Service or process labels stopped.
    pub stopped: Vec<String>,
    pub errors: Vec<CleanupFailure>,
}

impl CleanupResult {
    pub fn merge(&mut self, other: Self) {
        self.removed.extend(other.removed);
        self.stopped.extend(other.stopped);
        self.errors.extend(other.errors);
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Severity of a summary line, for coloring by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Rule,
    Count,
    Warning,
    Success,
    Note,
}

/// JSON form of the final summary.
#[derive(Debug, Serialize)]
pub struct CleanupSummary<'a> {
    pub dry_run: bool,
    pub removed_count: usize,
    pub stopped_count: usize,
    pub error_count: usize,
    #[serde(flatten)]
    pub result: &'a CleanupResult,
}

impl<'a> CleanupSummary<'a> {
    #[must_use]
    pub fn new(result: &'a CleanupResult, dry_run: bool) -> Self {
        Self {
            dry_run,
            removed_count: result.removed.len(),
            stopped_count: result.stopped.len(),
            error_count: result.errors.len(),
            result,
        }
    }

    /// Human-readable summary lines.
    #[must_use]
    pub fn lines(&self, osquery_kept: bool) -> Vec<(LineKind, String)> {
        let rule = "=".repeat(51);
        let mut lines = vec![(LineKind::Rule, rule.clone())];
        if self.dry_run {
            lines.push((
                LineKind::Count,
                format!("Would clean {} files/directories", self.removed_count),
            ));
            lines.push((
                LineKind::Count,
                format!("Would remove {} services", self.stopped_count),
            ));
        } else {
            lines.push((
                LineKind::Count,
                format!("Cleaned {} files/directories", self.removed_count),
            ));
            lines.push((
                LineKind::Count,
                format!("Removed {} services", self.stopped_count),
            ));
        }
        if self.error_count > 0 {
            lines.push((
                LineKind::Warning,
                format!("{} errors occurred", self.error_count),
            ));
        }
        lines.push((LineKind::Rule, rule));
        if !self.dry_run && self.error_count == 0 {
            lines.push((LineKind::Success, "Cleanup completed successfully!".to_string()));
            if osquery_kept {
                lines.push((
                    LineKind::Note,
                    "Note: osqueryd process was NOT stopped".to_string(),
                ));
            }
        }
        lines
    }
}
