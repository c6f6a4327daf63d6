//! Category path sets: which files under the root belong to logs, cache and
//! secrets.

#![allow(missing_docs)]

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::platform::pal::PlatformPolicy;

/// File categories removed from the root directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Logs,
    Cache,
    Secrets,
}

impl Category {
    pub const ALL: [Self; 3] = [Self::Logs, Self::Cache, Self::Secrets];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Logs => f.write_str("log files"),
            Self::Cache => f.write_str("cache files"),
            Self::Secrets => f.write_str("secrets and enrollment data"),
        }
    }
}

pub const NODE_KEY_FILE: &str = "secret-orbit-node-key.txt";
pub const DESKTOP_TOKEN_FILE: &str = "identifier";
pub const ENROLL_SECRET_FILE: &str = "secret.txt";
pub const SERVER_OVERRIDES_FILE: &str = "server-overrides.json";

/// Agent logs under the root plus the platform's system log directory.
pub fn log_paths(root: &Path, policy: &dyn PlatformPolicy) -> Vec<PathBuf> {
    let mut paths = vec![
        root.join("osquery_log"),
        root.join("orbit.stderr.log"),
        root.join("orbit.stdout.log"),
    ];
    paths.extend(policy.system_log_dir());
    paths
}

/// Fixed cache entries plus every entry under `root` whose name ends with
/// `backup_suffix`. Unreadable directories are skipped.
pub fn cache_paths(root: &Path, backup_suffix: &str) -> Vec<PathBuf> {
    let mut paths = vec![
        root.join("shell"),
        root.join("update-metadata"),
        root.join("updates.json"),
    ];
    paths.extend(
        WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(backup_suffix))
            .map(walkdir::DirEntry::into_path),
    );
    paths
}

/// Enrollment credentials and the osquery database with its WAL/SHM files.
pub fn secret_paths(root: &Path) -> Vec<PathBuf> {
    vec![
        root.join(NODE_KEY_FILE),
        root.join(DESKTOP_TOKEN_FILE),
        root.join(ENROLL_SECRET_FILE),
        root.join(SERVER_OVERRIDES_FILE),
        root.join("osquery.db"),
        root.join("osquery.db-wal"),
        root.join("osquery.db-shm"),
    ]
}

pub fn category_paths(
    category: Category,
    root: &Path,
    policy: &dyn PlatformPolicy,
    backup_suffix: &str,
) -> Vec<PathBuf> {
    match category {
        Category::Logs => log_paths(root, policy),
        Category::Cache => cache_paths(root, backup_suffix),
        Category::Secrets => secret_paths(root),
    }
}
