//! One-shot server initialization through the admin CLI: admin account,
//! API-only account, and the API token written to a restricted file.

#![allow(missing_docs)]

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::bootstrap::env::AutoInit;
use crate::core::errors::{OrbitError, Result};
use crate::logger::activity::ActivityLogger;
use crate::logger::jsonl::{EventType, LogEntry, Severity};
use crate::platform::command::{BestEffort, CommandRunner, CommandSpec, run_best_effort, run_required};

static TOKEN_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*token:\s*(\S+)\s*$").expect("valid regex"));

/// Pull the `token:` value out of an admin CLI context file.
#[must_use]
pub fn extract_token(context: &str) -> Option<String> {
    TOKEN_LINE
        .captures(context)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_matches('"').to_string())
        .filter(|t| !t.is_empty())
}

/// Write `token` to `path`, readable by the owner only.
pub fn write_token_file(path: &Path, token: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| OrbitError::io(parent, source))?;
    }
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .map_err(|source| OrbitError::io(path, source))?;
    file.write_all(token.as_bytes())
        .map_err(|source| OrbitError::io(path, source))?;

    // `mode` only applies on create; tighten a pre-existing file too.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|source| OrbitError::io(path, source))?;
    }
    Ok(())
}

/// Drives `fleetctl` through the first-run setup.
pub struct AdminInitializer<'a> {
    pub runner: &'a dyn CommandRunner,
    pub fleetctl: &'a Path,
    pub server_address: &'a str,
    pub init: &'a AutoInit,
    pub logger: &'a ActivityLogger,
}

impl AdminInitializer<'_> {
    /// Whether the sentinel token file already exists.
    #[must_use]
    pub fn already_initialized(&self) -> bool {
        self.init.token_file.exists()
    }

    /// Run every step; the API user's token ends up in the sentinel file.
    pub fn run(&self) -> Result<()> {
        let admin = &self.init.admin;
        let api = &self.init.api_user;

        self.required(&[
            "config",
            "set",
            "--address",
            self.server_address,
        ])?;
        self.tolerated(&[
            "setup",
            "--email",
            &admin.email,
            "--password",
            &admin.password,
            "--name",
            &admin.name,
            "--org-name",
            &self.init.org_name,
        ]);
        self.required(&["login", "--email", &admin.email, "--password", &admin.password])?;
        self.tolerated(&[
            "user",
            "create",
            "--email",
            &api.email,
            "--password",
            &api.password,
            "--name",
            &api.name,
            "--api-only",
        ]);

        // API user gets its own context file; the default context keeps the admin session.
        let context_dir = tempfile::Builder::new()
            .prefix("orbit-fleetctl-")
            .tempdir()
            .map_err(|source| OrbitError::io(std::env::temp_dir(), source))?;
        let context_file = context_dir.path().join("config");
        let context_arg = context_file.display().to_string();
        self.required(&[
            "config",
            "set",
            "--address",
            self.server_address,
            "--config",
            &context_arg,
        ])?;
        self.required(&[
            "login",
            "--email",
            &api.email,
            "--password",
            &api.password,
            "--config",
            &context_arg,
        ])?;

        let context = fs::read_to_string(&context_file)
            .map_err(|source| OrbitError::io(&context_file, source))?;
        let token = extract_token(&context).ok_or_else(|| OrbitError::ToolOutput {
            tool: "fleetctl",
            details: format!("no token found in {}", context_file.display()),
        })?;
        write_token_file(&self.init.token_file, &token)?;

        self.logger.record(
            &LogEntry::new(EventType::AdminInit, Severity::Info)
                .with_path(&self.init.token_file)
                .with_ok(true),
        );
        Ok(())
    }

    fn spec(&self, args: &[&str]) -> CommandSpec {
        CommandSpec::new(self.fleetctl.display().to_string(), args)
    }

    fn required(&self, args: &[&str]) -> Result<()> {
        run_required(self.runner, &self.spec(args))
            .map(|_| ())
            .map_err(|e| redact(e, &self.init.admin.password, &self.init.api_user.password))
    }

    /// Steps that fail harmlessly on a second run (already set up, user exists).
    fn tolerated(&self, args: &[&str]) {
        if let BestEffort::Ignored { reason } = run_best_effort(self.runner, &self.spec(args)) {
            let verb = args.first().copied().unwrap_or_default();
            self.logger.record(
                &LogEntry::new(EventType::CommandIgnored, Severity::Info)
                    .with_command(format!("fleetctl {verb}"))
                    .with_details(redact_text(
                        &reason,
                        &self.init.admin.password,
                        &self.init.api_user.password,
                    )),
            );
        }
    }
}

fn redact_text(text: &str, admin_password: &str, api_password: &str) -> String {
    text.replace(admin_password, "<redacted>")
        .replace(api_password, "<redacted>")
}

fn redact(err: OrbitError, admin_password: &str, api_password: &str) -> OrbitError {
    match err {
        OrbitError::ToolFailed { tool, details } => OrbitError::ToolFailed {
            tool: redact_text(&tool, admin_password, api_password),
            details: redact_text(&details, admin_password, api_password),
        },
        other => other,
    }
}
