//! Shared activity-log handle used by the cleanup, uuid and bootstrap flows.

#![allow(missing_docs)]

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::config::LoggingConfig;
use crate::logger::jsonl::{JsonlConfig, JsonlWriter, LogEntry};

/// Cheaply cloneable handle around an optional [`JsonlWriter`].
///
/// A disabled logger drops every entry; with `mirror_stderr` each entry is
/// also echoed to stderr as `[ORB-ACTIVITY] <json>`.
#[derive(Clone)]
pub struct ActivityLogger {
    writer: Arc<Mutex<Option<JsonlWriter>>>,
    mirror_stderr: bool,
}

impl ActivityLogger {
    /// Logger that writes nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            writer: Arc::new(Mutex::new(None)),
            mirror_stderr: false,
        }
    }

    #[must_use]
    pub fn new(config: JsonlConfig, mirror_stderr: bool) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Some(JsonlWriter::open(config)))),
            mirror_stderr,
        }
    }

    /// Build from the `[logging]` section. Dry runs never touch the log file.
    #[must_use]
    pub fn from_config(config: &LoggingConfig, verbose: bool, dry_run: bool) -> Self {
        match (&config.activity_log, dry_run) {
            (Some(path), false) => Self::new(
                JsonlConfig {
                    path: path.clone(),
                    fallback_path: config.fallback_log.clone(),
                    max_size_bytes: config.max_size_bytes,
                    max_rotated_files: config.max_rotated_files,
                },
                verbose,
            ),
            _ => Self {
                mirror_stderr: verbose && !dry_run,
                ..Self::disabled()
            },
        }
    }

    pub fn record(&self, entry: &LogEntry) {
        if self.mirror_stderr
            && let Ok(json) = serde_json::to_string(entry)
        {
            let _ = writeln!(io::stderr(), "[ORB-ACTIVITY] {json}");
        }
        if let Some(writer) = self.writer.lock().as_mut() {
            writer.write_entry(entry);
        }
    }

    fn is_enabled(&self) -> bool {
        self.writer.lock().is_some()
    }
}

impl std::fmt::Debug for ActivityLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityLogger")
            .field("enabled", &self.is_enabled())
            .field("mirror_stderr", &self.mirror_stderr)
            .finish()
    }
}
