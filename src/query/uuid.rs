//! Host hardware UUID lookup through a one-shot osqueryd invocation.
//!
//! osqueryd is run in shell mode (`-S`) against a throwaway database
//! directory. Some osqueryd builds exit non-zero (78) after printing a valid
//! result, so the exit status only matters when stdout does not parse.

#![allow(missing_docs)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::core::errors::{OrbitError, Result};
use crate::platform::command::{CommandOutput, CommandRunner, CommandSpec};

pub const UUID_QUERY: &str = "SELECT uuid FROM system_info";

const OSQUERYD: &str = "osqueryd";

/// Check the OpenFrame mode gate and the configured osqueryd path.
pub fn resolve_osquery_path(openframe_mode: bool, osquery_path: Option<&Path>) -> Result<PathBuf> {
    if !openframe_mode {
        return Err(OrbitError::InvalidConfig {
            details: "this command only works in OpenFrame mode; run with --openframe-mode \
                      or set ORBIT_OPENFRAME_MODE"
                .to_string(),
        });
    }
    let Some(path) = osquery_path else {
        return Err(OrbitError::InvalidConfig {
            details: "openframe-osquery-path must be specified when openframe-mode is enabled"
                .to_string(),
        });
    };
    match fs::metadata(path) {
        Ok(_) => Ok(path.to_path_buf()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(OrbitError::ToolNotFound {
            tool: "custom openframe osqueryd",
            path: path.to_path_buf(),
        }),
        Err(source) => Err(OrbitError::io(path, source)),
    }
}

/// Command line for the UUID query against `database_path`.
#[must_use]
pub fn uuid_command(osquery_path: &Path, database_path: &Path) -> CommandSpec {
    CommandSpec::new(osquery_path.display().to_string(), &["-S", "--database_path"])
        .arg(database_path.display().to_string())
        .arg("--json")
        .arg(UUID_QUERY)
}

/// Extract the UUID from osqueryd's JSON row output.
pub fn parse_uuid_rows(stdout: &[u8]) -> Result<String> {
    let rows: Vec<serde_json::Map<String, Value>> =
        serde_json::from_slice(stdout).map_err(|e| OrbitError::ToolOutput {
            tool: OSQUERYD,
            details: format!("failed to parse osqueryd output: {e}"),
        })?;
    if rows.len() != 1 {
        return Err(OrbitError::ToolOutput {
            tool: OSQUERYD,
            details: format!("expected 1 row from UUID query, got {}", rows.len()),
        });
    }
    match rows[0].get("uuid") {
        Some(Value::String(uuid)) => Ok(uuid.clone()),
        _ => Err(OrbitError::ToolOutput {
            tool: OSQUERYD,
            details: "UUID field not found or not a string".to_string(),
        }),
    }
}

/// Combine exit status and stdout into the UUID or an error.
pub fn interpret_output(output: &CommandOutput) -> Result<String> {
    if output.success {
        return parse_uuid_rows(&output.stdout);
    }
    match serde_json::from_slice::<Vec<serde_json::Map<String, Value>>>(&output.stdout) {
        Ok(_) => parse_uuid_rows(&output.stdout),
        Err(_) => Err(OrbitError::ToolFailed {
            tool: OSQUERYD.to_string(),
            details: format!(
                "{}, output: {}, stderr: {}",
                output.status_label(),
                output.stdout_lossy().trim(),
                output.stderr_lossy().trim()
            ),
        }),
    }
}

/// Run the UUID query with a scratch database under `scratch_parent`.
///
/// The scratch directory is removed when this returns, on every path.
pub fn query_host_uuid(
    runner: &dyn CommandRunner,
    osquery_path: &Path,
    scratch_parent: &Path,
) -> Result<String> {
    fs::create_dir_all(scratch_parent).map_err(|source| OrbitError::io(scratch_parent, source))?;
    let scratch = tempfile::Builder::new()
        .prefix("orbit-uuid-")
        .tempdir_in(scratch_parent)
        .map_err(|source| OrbitError::io(scratch_parent, source))?;
    let database_path = scratch.path().join("osquery.db");

    let output = runner.run(&uuid_command(osquery_path, &database_path))?;
    interpret_output(&output)
}
