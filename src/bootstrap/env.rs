//! Container environment for the bootstrap flow. Everything is validated up
//! front so a misconfigured container fails before any network activity.

#![allow(missing_docs)]

use std::fmt;
use std::path::PathBuf;

use crate::core::config::{BootstrapConfig, parse_env_bool};
use crate::core::errors::{OrbitError, Result};

pub const DEFAULT_MYSQL_PORT: u16 = 3306;
pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// `host:port` with the port defaulted when omitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl HostPort {
    /// Parse `host[:port]`. Bracketed IPv6 (`[::1]:3306`) is accepted.
    pub fn parse(name: &'static str, raw: &str, default_port: u16) -> Result<Self> {
        let raw = raw.trim();
        let invalid = |why: &str| OrbitError::InvalidConfig {
            details: format!("{name}={raw:?}: {why}"),
        };

        let (host, port) = if let Some(rest) = raw.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| invalid("unterminated IPv6 bracket"))?;
            match tail.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if tail.is_empty() => (host, None),
                None => return Err(invalid("unexpected text after IPv6 address")),
            }
        } else {
            match raw.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (raw, None),
            }
        };

        if host.is_empty() {
            return Err(invalid("host is empty"));
        }
        let port = match port {
            None => default_port,
            Some(p) => match p.parse::<u16>() {
                Ok(port) if port > 0 => port,
                _ => return Err(invalid("port must be 1-65535")),
            },
        };
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Login for one server account.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    pub name: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .finish()
    }
}

/// Inputs for the one-shot server initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoInit {
    pub admin: Credentials,
    pub api_user: Credentials,
    pub org_name: String,
    pub token_file: PathBuf,
}

/// Validated bootstrap environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapEnv {
    pub mysql: HostPort,
    pub redis: HostPort,
    pub server_port: u16,
    /// Passed to `prepare db` and `serve` as `--config`.
    pub fleet_config: Option<PathBuf>,
    pub health_url: String,
    /// Present only when `FLEET_AUTO_INIT` is true.
    pub auto_init: Option<AutoInit>,
}

impl BootstrapEnv {
    /// Read and validate the `FLEET_*` variables through `lookup`.
    pub fn from_lookup<F>(mut lookup: F, config: &BootstrapConfig) -> Result<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(OrbitError::MissingEnv { name })
        };
        let mysql = HostPort::parse(
            "FLEET_MYSQL_ADDRESS",
            &required("FLEET_MYSQL_ADDRESS")?,
            DEFAULT_MYSQL_PORT,
        )?;
        let redis = HostPort::parse(
            "FLEET_REDIS_ADDRESS",
            &required("FLEET_REDIS_ADDRESS")?,
            DEFAULT_REDIS_PORT,
        )?;

        let server_port = match lookup("FLEET_SERVER_PORT") {
            None => DEFAULT_SERVER_PORT,
            Some(raw) => match raw.trim().parse::<u16>() {
                Ok(port) if port > 0 => port,
                _ => {
                    return Err(OrbitError::InvalidConfig {
                        details: format!("FLEET_SERVER_PORT={raw:?}: port must be 1-65535"),
                    });
                }
            },
        };
        let fleet_config = lookup("FLEET_CONFIG").map(PathBuf::from);
        let health_url = lookup("FLEET_HEALTH_URL").unwrap_or_else(|| {
            format!("http://127.0.0.1:{server_port}{}", config.health_path)
        });

        let auto_init_enabled = match lookup("FLEET_AUTO_INIT") {
            Some(raw) => parse_env_bool("FLEET_AUTO_INIT", &raw)?,
            None => false,
        };
        let auto_init = if auto_init_enabled {
            let mut required = |name: &'static str| {
                lookup(name)
                    .filter(|v| !v.trim().is_empty())
                    .ok_or(OrbitError::MissingEnv { name })
            };
            let admin_email = required("FLEET_ADMIN_EMAIL")?;
            let admin_password = required("FLEET_ADMIN_PASSWORD")?;
            let api_email = required("FLEET_API_USER_EMAIL")?;
            let api_password = required("FLEET_API_USER_PASSWORD")?;
            Some(AutoInit {
                admin: Credentials {
                    email: admin_email,
                    password: admin_password,
                    name: lookup("FLEET_ADMIN_NAME").unwrap_or_else(|| "Admin".to_string()),
                },
                api_user: Credentials {
                    email: api_email,
                    password: api_password,
                    name: lookup("FLEET_API_USER_NAME").unwrap_or_else(|| "API User".to_string()),
                },
                org_name: lookup("FLEET_ORG_NAME").unwrap_or_else(|| "Fleet".to_string()),
                token_file: config.api_token_file.clone(),
            })
        } else {
            None
        };

        Ok(Self {
            mysql,
            redis,
            server_port,
            fleet_config,
            health_url,
            auto_init,
        })
    }

    /// Base URL the admin CLI is pointed at.
    #[must_use]
    pub fn server_address(&self) -> String {
        format!("http://127.0.0.1:{}", self.server_port)
    }
}
