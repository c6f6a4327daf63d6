//! Configuration system: TOML file + env var overrides + platform defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{OrbitError, Result};

/// Full orbit-maint configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub cleanup: CleanupConfig,
    pub openframe: OpenFrameConfig,
    pub bootstrap: BootstrapConfig,
    pub logging: LoggingConfig,
    /// Path the configuration was loaded from (not serialized).
    #[serde(skip)]
    pub config_file: PathBuf,
}

/// Cleanup behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CleanupConfig {
    /// Agent root directory; resolved from the platform when unset.
    pub root_dir: Option<PathBuf>,
    /// Keep going after a removal error and report the aggregate count.
    pub continue_on_error: bool,
    /// File-name suffix marking legacy backup files swept by the cache category.
    pub legacy_backup_suffix: String,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            root_dir: None,
            continue_on_error: false,
            legacy_backup_suffix: ".old".to_string(),
        }
    }
}

/// OpenFrame deployment: osquery managed outside the agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct OpenFrameConfig {
    pub enabled: bool,
    pub osquery_path: Option<PathBuf>,
}

/// Container bootstrap tunables. Addresses and credentials come from the
/// environment only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Server binary (`prepare db`, `serve`).
    pub fleet_binary: PathBuf,
    /// Admin CLI used by the one-shot initialization.
    pub fleetctl_binary: PathBuf,
    /// Fixed sleep between readiness attempts.
    pub poll_interval_ms: u64,
    /// Attempts per dependency before giving up.
    pub dependency_max_attempts: u32,
    /// Attempts against the health endpoint before declaring startup failed.
    pub health_max_attempts: u32,
    /// Per-attempt TCP connect / HTTP request timeout.
    pub probe_timeout_ms: u64,
    /// Sentinel file holding the API-only user's token.
    pub api_token_file: PathBuf,
    /// Health endpoint path on the local server.
    pub health_path: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            fleet_binary: PathBuf::from("fleet"),
            fleetctl_binary: PathBuf::from("fleetctl"),
            poll_interval_ms: 1_000,
            dependency_max_attempts: 60,
            health_max_attempts: 60,
            probe_timeout_ms: 2_000,
            api_token_file: PathBuf::from("/fleet/api_token"),
            health_path: "/healthz".to_string(),
        }
    }
}

/// Activity log settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// JSONL activity log. Disabled when unset.
    pub activity_log: Option<PathBuf>,
    /// Fallback used when the primary log cannot be opened.
    pub fallback_log: Option<PathBuf>,
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            activity_log: None,
            fallback_log: None,
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        if cfg!(windows) {
            env::var_os("ProgramData")
                .map_or_else(|| PathBuf::from(r"C:\ProgramData"), PathBuf::from)
                .join("Orbit")
                .join("maint.toml")
        } else {
            PathBuf::from("/etc/orbit/maint.toml")
        }
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| OrbitError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(OrbitError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `ORBIT_*` / `FLEET_*` overrides from an arbitrary lookup.
    pub fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("ORBIT_ROOT_DIR") {
            self.cleanup.root_dir = Some(PathBuf::from(raw));
        }
        if let Some(raw) = lookup("ORBIT_MAINT_CONTINUE_ON_ERROR") {
            self.cleanup.continue_on_error = parse_env_bool("ORBIT_MAINT_CONTINUE_ON_ERROR", &raw)?;
        }
        if let Some(raw) = lookup("ORBIT_OPENFRAME_MODE") {
            self.openframe.enabled = parse_env_bool("ORBIT_OPENFRAME_MODE", &raw)?;
        }
        if let Some(raw) = lookup("ORBIT_OPENFRAME_OSQUERY_PATH") {
            self.openframe.osquery_path = Some(PathBuf::from(raw));
        }
        if let Some(raw) = lookup("ORBIT_MAINT_ACTIVITY_LOG") {
            self.logging.activity_log = Some(PathBuf::from(raw));
        }

        if let Some(raw) = lookup("FLEET_BINARY") {
            self.bootstrap.fleet_binary = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("FLEETCTL_BINARY") {
            self.bootstrap.fleetctl_binary = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("FLEET_BOOTSTRAP_POLL_INTERVAL_MS") {
            self.bootstrap.poll_interval_ms =
                parse_env_u64("FLEET_BOOTSTRAP_POLL_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = lookup("FLEET_BOOTSTRAP_MAX_ATTEMPTS") {
            let attempts = parse_env_u32("FLEET_BOOTSTRAP_MAX_ATTEMPTS", &raw)?;
            self.bootstrap.dependency_max_attempts = attempts;
            self.bootstrap.health_max_attempts = attempts;
        }
        if let Some(raw) = lookup("FLEET_API_TOKEN_FILE") {
            self.bootstrap.api_token_file = PathBuf::from(raw);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.cleanup.legacy_backup_suffix.trim().is_empty() {
            return Err(OrbitError::InvalidConfig {
                details: "cleanup.legacy_backup_suffix must not be empty".to_string(),
            });
        }
        if self.bootstrap.dependency_max_attempts == 0 || self.bootstrap.health_max_attempts == 0 {
            return Err(OrbitError::InvalidConfig {
                details: "bootstrap max attempts must be >= 1".to_string(),
            });
        }
        if self.bootstrap.probe_timeout_ms == 0 {
            return Err(OrbitError::InvalidConfig {
                details: "bootstrap.probe_timeout_ms must be > 0".to_string(),
            });
        }
        if !self.bootstrap.health_path.starts_with('/') {
            return Err(OrbitError::InvalidConfig {
                details: format!(
                    "bootstrap.health_path must start with '/', got {:?}",
                    self.bootstrap.health_path
                ),
            });
        }
        if self.logging.max_size_bytes == 0 {
            return Err(OrbitError::InvalidConfig {
                details: "logging.max_size_bytes must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Process environment lookup; blank values count as unset.
pub fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.trim().parse::<u64>().map_err(|error| OrbitError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

fn parse_env_u32(name: &str, raw: &str) -> Result<u32> {
    raw.trim().parse::<u32>().map_err(|error| OrbitError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

/// Parse a boolean toggle. Accepts `true/false`, `1/0`, `yes/no` (any case).
pub fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(OrbitError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: expected a boolean"),
        }),
    }
}
