//! Top-level CLI definition and dispatch.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use orbit_maint::bootstrap::env::BootstrapEnv;
use orbit_maint::bootstrap::process::SystemLauncher;
use orbit_maint::bootstrap::readiness::{HttpProbe, TcpProbe};
use orbit_maint::bootstrap::signals::SignalHandler;
use orbit_maint::bootstrap::supervisor::{BootstrapSettings, Bootstrapper, Probes};
use orbit_maint::cleanup::orchestrator::{
    CategorySelection, Cleanup, CleanupMode, CleanupOutcome, CleanupRequest, ErrorPolicy,
    FsRemover,
};
use orbit_maint::cleanup::report::{CleanupSummary, LineKind};
use orbit_maint::core::config::{Config, env_var};
use orbit_maint::core::errors::OrbitError;
use orbit_maint::core::paths::resolve_root_dir;
use orbit_maint::logger::activity::ActivityLogger;
use orbit_maint::logger::jsonl::{EventType, LogEntry, Severity};
use orbit_maint::platform::command::SystemRunner;
use orbit_maint::platform::pal::detect_policy;
use orbit_maint::query::uuid::{query_host_uuid, resolve_osquery_path};

/// Orbit agent maintenance: host UUID lookup, data cleanup, container bootstrap.
#[derive(Debug, Parser)]
#[command(
    name = "orbit-maint",
    author,
    version,
    about = "Orbit agent maintenance tool",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Agent root directory (overrides ORBIT_ROOT_DIR and config).
    #[arg(long, global = true, value_name = "DIR")]
    root_dir: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity (mirror activity events to stderr).
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors and final summary only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Print the host UUID reported by osquery.
    Uuid(UuidArgs),
    /// Stop the agent and remove its data.
    Cleanup(CleanupArgs),
    /// Container entrypoint: wait for dependencies, prepare, serve.
    Bootstrap,
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct OpenFrameArgs {
    /// Run against an externally managed osquery (OpenFrame deployments).
    #[arg(long)]
    openframe_mode: bool,
    /// Path to the OpenFrame osqueryd binary.
    #[arg(long, value_name = "PATH")]
    openframe_osquery_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Args, Default)]
struct UuidArgs {
    #[command(flatten)]
    openframe: OpenFrameArgs,
}

#[derive(Debug, Clone, Args, Default)]
struct CleanupArgs {
    /// Clean every category.
    #[arg(long)]
    all: bool,
    /// Remove log files.
    #[arg(long)]
    logs: bool,
    /// Remove cache files and legacy backups.
    #[arg(long)]
    cache: bool,
    /// Remove secrets and enrollment data.
    #[arg(long)]
    secrets: bool,
    /// Remove registry entries (Windows).
    #[arg(long)]
    registry: bool,
    /// Stop the agent and remove its service files.
    #[arg(long)]
    service: bool,
    /// Print what would be done without changing anything.
    #[arg(long)]
    dry_run: bool,
    /// Skip the confirmation prompt.
    #[arg(long)]
    force: bool,
    /// Keep going after a removal error and report the error count.
    #[arg(long)]
    continue_on_error: bool,
    #[command(flatten)]
    openframe: OpenFrameArgs,
}

impl CleanupArgs {
    fn selection(&self) -> CategorySelection {
        if self.all {
            return CategorySelection::all();
        }
        CategorySelection {
            logs: self.logs,
            cache: self.cache,
            secrets: self.secrets,
            registry: self.registry,
            service: self.service,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// Operation partially succeeded.
    #[error("{0}")]
    Partial(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
            Self::Partial(_) => 4,
        }
    }
}

impl From<OrbitError> for CliError {
    fn from(err: OrbitError) -> Self {
        if err.is_config_error() {
            Self::User(err.to_string())
        } else if matches!(err, OrbitError::Serialization { .. }) {
            Self::Internal(err.to_string())
        } else {
            Self::Runtime(err.to_string())
        }
    }
}

/// Dispatch CLI commands. Returns the process exit code on success.
pub fn run(cli: &Cli) -> Result<i32, CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Uuid(args) => run_uuid(cli, args).map(|()| 0),
        Command::Cleanup(args) => run_cleanup(cli, args).map(|()| 0),
        Command::Bootstrap => run_bootstrap(cli),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(0)
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Ok(Config::load(cli.config.as_deref())?)
}

// ---------------------------------------------------------------------------
// uuid
// ---------------------------------------------------------------------------

fn run_uuid(cli: &Cli, args: &UuidArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let openframe_mode = args.openframe.openframe_mode || config.openframe.enabled;
    let configured_path = args
        .openframe
        .openframe_osquery_path
        .as_deref()
        .or(config.openframe.osquery_path.as_deref());
    let osquery_path = resolve_osquery_path(openframe_mode, configured_path)?;

    let logger = ActivityLogger::from_config(&config.logging, cli.verbose, false);
    let uuid = match query_host_uuid(&SystemRunner, &osquery_path, &std::env::temp_dir()) {
        Ok(uuid) => {
            logger.record(
                &LogEntry::new(EventType::UuidQuery, Severity::Info)
                    .with_path(&osquery_path)
                    .with_ok(true),
            );
            uuid
        }
        Err(e) => {
            logger.record(
                &LogEntry::new(EventType::UuidQuery, Severity::Warning)
                    .with_path(&osquery_path)
                    .with_error(&e),
            );
            return Err(e.into());
        }
    };

    match output_mode(cli) {
        OutputMode::Human => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{uuid}")?;
        }
        OutputMode::Json => write_json_line(&json!({ "uuid": uuid }))?,
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// cleanup
// ---------------------------------------------------------------------------

fn run_cleanup(cli: &Cli, args: &CleanupArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let policy = detect_policy()?;

    let openframe_mode = args.openframe.openframe_mode || config.openframe.enabled;
    let mode = if openframe_mode {
        let configured_path = args
            .openframe
            .openframe_osquery_path
            .clone()
            .or_else(|| config.openframe.osquery_path.clone());
        let osquery_path = configured_path.ok_or_else(|| {
            CliError::User(
                "--openframe-osquery-path (or ORBIT_OPENFRAME_OSQUERY_PATH) is required \
                 in OpenFrame mode"
                    .to_string(),
            )
        })?;
        CleanupMode::OpenFrame { osquery_path }
    } else {
        let selection = args.selection();
        if selection.is_empty() {
            let mut command = Cli::command();
            if let Some(sub) = command.find_subcommand_mut("cleanup") {
                sub.write_help(&mut io::stderr())?;
            }
            return Err(CliError::User(
                "no cleanup category selected; pass --all or at least one category flag"
                    .to_string(),
            ));
        }
        CleanupMode::Standard(selection)
    };

    let current_exe = std::env::current_exe().ok();
    let root_dir = resolve_root_dir(
        cli.root_dir.as_deref(),
        config.cleanup.root_dir.as_deref(),
        current_exe.as_deref(),
        &policy.default_root_dir(),
    );
    let error_policy = if args.continue_on_error || config.cleanup.continue_on_error {
        ErrorPolicy::ContinueOnError
    } else {
        ErrorPolicy::FailFast
    };
    let request = CleanupRequest {
        root_dir,
        mode,
        dry_run: args.dry_run,
        force: args.force,
        error_policy,
        backup_suffix: config.cleanup.legacy_backup_suffix.clone(),
    };

    let logger = ActivityLogger::from_config(&config.logging, cli.verbose, args.dry_run);
    let cleanup = Cleanup {
        policy: policy.as_ref(),
        runner: &SystemRunner,
        remover: &FsRemover,
        logger: &logger,
    };

    let mode = output_mode(cli);
    // Progress goes to stderr in JSON mode so stdout stays a single object.
    let mut progress: Box<dyn Write> = match (mode, cli.quiet) {
        (_, true) => Box::new(io::sink()),
        (OutputMode::Json, false) => Box::new(io::stderr()),
        (OutputMode::Human, false) => Box::new(io::stdout()),
    };
    // The prompt stays visible under --quiet and --json.
    let mut stdin = io::stdin().lock();
    let mut prompt = io::stderr();
    let outcome = cleanup.run(&request, &mut stdin, &mut prompt, progress.as_mut())?;
    progress.flush()?;

    let result = match outcome {
        CleanupOutcome::Cancelled => {
            if mode == OutputMode::Json {
                write_json_line(&json!({ "cancelled": true }))?;
            }
            return Ok(());
        }
        CleanupOutcome::Completed(result) => result,
    };

    let summary = CleanupSummary::new(&result, request.dry_run);
    match mode {
        OutputMode::Human => print_summary(&summary, request.mode.keeps_collector())?,
        OutputMode::Json => write_json_line(&serde_json::to_value(&summary)?)?,
    }

    if result.has_errors() {
        return Err(CliError::Partial(format!(
            "cleanup finished with {} error(s)",
            result.errors.len()
        )));
    }
    Ok(())
}

fn print_summary(summary: &CleanupSummary<'_>, osquery_kept: bool) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    for (kind, line) in summary.lines(osquery_kept) {
        let styled = match kind {
            LineKind::Rule => line.dimmed(),
            LineKind::Count => line.normal(),
            LineKind::Warning => line.red().bold(),
            LineKind::Success => line.green().bold(),
            LineKind::Note => line.yellow(),
        };
        writeln!(stdout, "{styled}")?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// bootstrap
// ---------------------------------------------------------------------------

fn run_bootstrap(cli: &Cli) -> Result<i32, CliError> {
    let config = load_config(cli)?;
    let env = BootstrapEnv::from_lookup(env_var, &config.bootstrap)?;
    let settings = BootstrapSettings::from_config(&config.bootstrap);
    let timeout = Duration::from_millis(config.bootstrap.probe_timeout_ms);

    let mysql = TcpProbe::new("mysql", env.mysql.clone(), timeout);
    let redis = TcpProbe::new("redis", env.redis.clone(), timeout);
    let health = HttpProbe::new(env.health_url.clone(), timeout)?;
    let signals = SignalHandler::install();
    let logger = ActivityLogger::from_config(&config.logging, cli.verbose, false);
    let sleep = |interval: Duration| std::thread::sleep(interval);

    let bootstrapper = Bootstrapper {
        env: &env,
        settings: &settings,
        runner: &SystemRunner,
        launcher: &SystemLauncher,
        probes: Probes {
            mysql: &mysql,
            redis: &redis,
            health: &health,
        },
        signals: &signals,
        logger: &logger,
        sleep: &sleep,
    };
    Ok(bootstrapper.run()?)
}

// ---------------------------------------------------------------------------
// output helpers
// ---------------------------------------------------------------------------

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("ORBIT_MAINT_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref())
}

/// `--json` wins, then `ORBIT_MAINT_OUTPUT_FORMAT`. Piped output stays human:
/// `uuid` is consumed by scripts as raw text.
fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        _ => OutputMode::Human,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_before_and_after_subcommand() {
        let before = Cli::try_parse_from([
            "orbit-maint",
            "--config",
            "/tmp/maint.toml",
            "--json",
            "--no-color",
            "-v",
            "cleanup",
            "--logs",
        ]);
        assert!(before.is_ok());

        let after = Cli::try_parse_from([
            "orbit-maint",
            "cleanup",
            "--logs",
            "--root-dir",
            "/tmp/x",
            "--json",
            "-q",
        ]);
        assert!(after.is_ok());
    }

    #[test]
    fn parses_all_subcommands() {
        let cases = [
            vec!["orbit-maint", "uuid"],
            vec![
                "orbit-maint",
                "uuid",
                "--openframe-mode",
                "--openframe-osquery-path",
                "/opt/openframe/osqueryd",
            ],
            vec!["orbit-maint", "cleanup", "--all", "--force"],
            vec!["orbit-maint", "cleanup", "--logs", "--cache", "--dry-run"],
            vec!["orbit-maint", "cleanup", "--secrets", "--continue-on-error"],
            vec![
                "orbit-maint",
                "cleanup",
                "--openframe-mode",
                "--openframe-osquery-path",
                "/opt/openframe/osqueryd",
            ],
            vec!["orbit-maint", "bootstrap"],
        ];

        for case in cases {
            let parsed = Cli::try_parse_from(case.clone());
            assert!(parsed.is_ok(), "failed to parse case: {case:?}");
        }
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["orbit-maint", "-v", "-q", "bootstrap"]).is_err());
    }

    #[test]
    fn completions_support_bash_zsh_and_fish() {
        for shell in ["bash", "zsh", "fish"] {
            let parsed = Cli::try_parse_from(["orbit-maint", "completions", shell]);
            assert!(parsed.is_ok(), "failed shell parse for {shell}");
        }
    }

    #[test]
    fn all_flag_selects_every_category() {
        let args = CleanupArgs {
            all: true,
            ..CleanupArgs::default()
        };
        assert_eq!(args.selection(), CategorySelection::all());
        assert!(CleanupArgs::default().selection().is_empty());
    }

    #[test]
    fn output_mode_resolution_honors_precedence() {
        assert_eq!(resolve_output_mode(true, Some("human")), OutputMode::Json);
        assert_eq!(resolve_output_mode(false, Some(" JSON ")), OutputMode::Json);
        assert_eq!(resolve_output_mode(false, Some("human")), OutputMode::Human);
        assert_eq!(resolve_output_mode(false, None), OutputMode::Human);
        assert_eq!(resolve_output_mode(false, Some("bogus")), OutputMode::Human);
    }

    #[test]
    fn exit_codes_follow_contract() {
        assert_eq!(CliError::User(String::new()).exit_code(), 1);
        assert_eq!(CliError::Runtime(String::new()).exit_code(), 2);
        assert_eq!(CliError::Internal(String::new()).exit_code(), 3);
        assert_eq!(CliError::Partial(String::new()).exit_code(), 4);
    }

    #[test]
    fn config_errors_map_to_user_errors() {
        let err: CliError = OrbitError::PrivilegeRequired.into();
        assert_eq!(err.exit_code(), 1);
        let err: CliError = OrbitError::Runtime {
            details: "boom".to_string(),
        }
        .into();
        assert_eq!(err.exit_code(), 2);
    }
}
