//! ORB-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, OrbitError>;

/// Top-level error type for orbit maintenance flows.
#[derive(Debug, Error)]
pub enum OrbitError {
    #[error("[ORB-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[ORB-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[ORB-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[ORB-1004] required environment variable {name} is not set")]
    MissingEnv { name: &'static str },

    #[error("[ORB-1101] unsupported platform: {details}")]
    UnsupportedPlatform { details: String },

    #[error(
        "[ORB-1201] this command requires administrator/root privileges; \
         run with sudo (macOS/Linux) or as Administrator (Windows)"
    )]
    PrivilegeRequired,

    #[error("[ORB-2001] {tool} binary not found: {path}")]
    ToolNotFound { tool: &'static str, path: PathBuf },

    #[error("[ORB-2002] {tool} failed: {details}")]
    ToolFailed { tool: String, details: String },

    #[error("[ORB-2003] unexpected {tool} output: {details}")]
    ToolOutput { tool: &'static str, details: String },

    #[error("[ORB-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[ORB-3001] failed to remove {path}: {source}")]
    Removal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[ORB-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[ORB-4001] {name} at {address} not reachable after {attempts} attempts")]
    DependencyTimeout {
        name: String,
        address: String,
        attempts: u32,
    },

    #[error("[ORB-4002] server startup failed: {details}")]
    ServerStartup { details: String },

    #[error("[ORB-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl OrbitError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "ORB-1001",
            Self::MissingConfig { .. } => "ORB-1002",
            Self::ConfigParse { .. } => "ORB-1003",
            Self::MissingEnv { .. } => "ORB-1004",
            Self::UnsupportedPlatform { .. } => "ORB-1101",
            Self::PrivilegeRequired => "ORB-1201",
            Self::ToolNotFound { .. } => "ORB-2001",
            Self::ToolFailed { .. } => "ORB-2002",
            Self::ToolOutput { .. } => "ORB-2003",
            Self::Serialization { .. } => "ORB-2101",
            Self::Removal { .. } => "ORB-3001",
            Self::Io { .. } => "ORB-3002",
            Self::DependencyTimeout { .. } => "ORB-4001",
            Self::ServerStartup { .. } => "ORB-4002",
            Self::Runtime { .. } => "ORB-3900",
        }
    }

    /// Whether the failure is a configuration problem detected before any side effect.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::MissingConfig { .. }
                | Self::ConfigParse { .. }
                | Self::MissingEnv { .. }
                | Self::UnsupportedPlatform { .. }
                | Self::PrivilegeRequired
                | Self::ToolNotFound { .. }
        )
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::Removal { .. }
                | Self::DependencyTimeout { .. }
                | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for OrbitError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for OrbitError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn every_variant() -> Vec<OrbitError> {
        vec![
            OrbitError::InvalidConfig {
                details: String::new(),
            },
            OrbitError::MissingConfig {
                path: PathBuf::new(),
            },
            OrbitError::ConfigParse {
                context: "",
                details: String::new(),
            },
            OrbitError::MissingEnv { name: "X" },
            OrbitError::UnsupportedPlatform {
                details: String::new(),
            },
            OrbitError::PrivilegeRequired,
            OrbitError::ToolNotFound {
                tool: "osqueryd",
                path: PathBuf::new(),
            },
            OrbitError::ToolFailed {
                tool: String::new(),
                details: String::new(),
            },
            OrbitError::ToolOutput {
                tool: "osqueryd",
                details: String::new(),
            },
            OrbitError::Serialization {
                context: "",
                details: String::new(),
            },
            OrbitError::Removal {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            OrbitError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            OrbitError::DependencyTimeout {
                name: String::new(),
                address: String::new(),
                attempts: 0,
            },
            OrbitError::ServerStartup {
                details: String::new(),
            },
            OrbitError::Runtime {
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let codes: Vec<&str> = every_variant().iter().map(OrbitError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn display_includes_code() {
        for err in every_variant() {
            let msg = err.to_string();
            assert!(
                msg.contains(err.code()),
                "display should contain {}: {msg}",
                err.code()
            );
        }
    }

    #[test]
    fn config_errors_are_not_retryable() {
        for err in every_variant() {
            if err.is_config_error() {
                assert!(!err.is_retryable(), "{} should not be retryable", err.code());
            }
        }
    }

    #[test]
    fn privilege_message_mentions_sudo() {
        let msg = OrbitError::PrivilegeRequired.to_string();
        assert!(msg.contains("sudo"));
        assert!(msg.contains("Administrator"));
    }

    #[test]
    fn io_convenience_constructor() {
        let err = OrbitError::io(
            "/tmp/test.txt",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), "ORB-3002");
        assert!(err.to_string().contains("/tmp/test.txt"));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: OrbitError = json_err.into();
        assert_eq!(err.code(), "ORB-2101");
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: OrbitError = toml_err.into();
        assert_eq!(err.code(), "ORB-1003");
    }
}
