//! Platform policy trait and per-OS implementations (Linux, macOS, Windows).
//!
//! All OS branching for the maintenance flows lives here: default root
//! directory, system log location, service stop commands, service
//! registration files, registry cleanup, and the privilege probe. The active
//! policy is selected once at startup by [`detect_policy`].

#![allow(missing_docs)]

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::errors::Result;
use crate::platform::command::{CommandRunner, CommandSpec};

/// Target platform family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformKind {
    Linux,
    MacOs,
    Windows,
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linux => f.write_str("linux"),
            Self::MacOs => f.write_str("darwin"),
            Self::Windows => f.write_str("windows"),
        }
    }
}

/// OS abstraction used by the cleanup orchestrator.
pub trait PlatformPolicy: Send + Sync {
    fn kind(&self) -> PlatformKind;

    /// Root data directory used when nothing else is configured.
    fn default_root_dir(&self) -> PathBuf;

    /// System-wide agent log directory outside the root.
    fn system_log_dir(&self) -> Option<PathBuf>;

    /// Name recorded in the "stopped" list when the agent service is halted.
    fn agent_service_label(&self) -> &'static str;

    /// Commands halting the agent service and the desktop helper.
    fn agent_stop_commands(&self) -> Vec<CommandSpec>;

    /// Commands halting the osquery collection process started from `osquery_path`.
    fn collector_stop_commands(&self, osquery_path: &Path) -> Vec<CommandSpec>;

    /// Service registration files and installed binaries.
    fn service_files(&self) -> Vec<PathBuf>;

    /// Commands run after the service files are removed.
    fn service_followup_commands(&self) -> Vec<CommandSpec>;

    /// Registry cleanup commands (empty off Windows).
    fn registry_commands(&self) -> Vec<CommandSpec>;

    /// Whether the process runs with administrator/root privileges.
    fn has_admin_privileges(&self, runner: &dyn CommandRunner) -> bool;
}

const ORBIT_BINARY: &str = "/usr/local/bin/orbit";
const LAUNCHD_LABEL: &str = "com.fleetdm.orbit";
const LAUNCHD_PLIST: &str = "/Library/LaunchDaemons/com.fleetdm.orbit.plist";
const SYSTEMD_UNIT: &str = "orbit.service";
const WINDOWS_SERVICE: &str = "Fleet osquery";

/// Linux: systemd unit + `/var/log/orbit`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxPolicy;

impl PlatformPolicy for LinuxPolicy {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Linux
    }

    fn default_root_dir(&self) -> PathBuf {
        PathBuf::from("/opt/orbit")
    }

    fn system_log_dir(&self) -> Option<PathBuf> {
        Some(PathBuf::from("/var/log/orbit"))
    }

    fn agent_service_label(&self) -> &'static str {
        SYSTEMD_UNIT
    }

    fn agent_stop_commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("systemctl", &["stop", SYSTEMD_UNIT]),
            CommandSpec::new("systemctl", &["disable", SYSTEMD_UNIT]),
            CommandSpec::new("pkill", &["-f", "fleet-desktop"]),
        ]
    }

    fn collector_stop_commands(&self, osquery_path: &Path) -> Vec<CommandSpec> {
        unix_collector_stop(osquery_path)
    }

    fn service_files(&self) -> Vec<PathBuf> {
        vec![
            PathBuf::from("/usr/lib/systemd/system/orbit.service"),
            PathBuf::from("/etc/default/orbit"),
            PathBuf::from(ORBIT_BINARY),
        ]
    }

    fn service_followup_commands(&self) -> Vec<CommandSpec> {
        vec![CommandSpec::new("systemctl", &["daemon-reload"])]
    }

    fn registry_commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }

    fn has_admin_privileges(&self, _runner: &dyn CommandRunner) -> bool {
        is_effective_root()
    }
}

/// macOS: launchd daemon + package receipt.
#[derive(Debug, Default, Clone, Copy)]
pub struct MacOsPolicy;

impl PlatformPolicy for MacOsPolicy {
    fn kind(&self) -> PlatformKind {
        PlatformKind::MacOs
    }

    fn default_root_dir(&self) -> PathBuf {
        PathBuf::from("/opt/orbit")
    }

    fn system_log_dir(&self) -> Option<PathBuf> {
        Some(PathBuf::from("/var/log/orbit"))
    }

    fn agent_service_label(&self) -> &'static str {
        LAUNCHD_LABEL
    }

    fn agent_stop_commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("launchctl", &["stop", LAUNCHD_LABEL]),
            CommandSpec::new("launchctl", &["unload", LAUNCHD_PLIST]),
            CommandSpec::new("pkill", &["fleet-desktop"]),
        ]
    }

    fn collector_stop_commands(&self, osquery_path: &Path) -> Vec<CommandSpec> {
        unix_collector_stop(osquery_path)
    }

    fn service_files(&self) -> Vec<PathBuf> {
        vec![PathBuf::from(LAUNCHD_PLIST), PathBuf::from(ORBIT_BINARY)]
    }

    fn service_followup_commands(&self) -> Vec<CommandSpec> {
        vec![CommandSpec::new(
            "pkgutil",
            &["--forget", "com.fleetdm.orbit.base.pkg"],
        )]
    }

    fn registry_commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }

    fn has_admin_privileges(&self, _runner: &dyn CommandRunner) -> bool {
        is_effective_root()
    }
}

/// Windows: SCM service, registry uninstall entry, `net session` privilege probe.
#[derive(Debug, Clone)]
pub struct WindowsPolicy {
    system_root: PathBuf,
    program_files: PathBuf,
}

impl WindowsPolicy {
    #[must_use]
    pub fn new(system_root: PathBuf, program_files: PathBuf) -> Self {
        Self {
            system_root,
            program_files,
        }
    }

    /// Build from `%SystemRoot%` and `%ProgramFiles%`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(
            env::var_os("SystemRoot").map_or_else(|| PathBuf::from(r"C:\Windows"), PathBuf::from),
            env::var_os("ProgramFiles")
                .map_or_else(|| PathBuf::from(r"C:\Program Files"), PathBuf::from),
        )
    }
}

impl PlatformPolicy for WindowsPolicy {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Windows
    }

    fn default_root_dir(&self) -> PathBuf {
        self.program_files.join("Orbit")
    }

    fn system_log_dir(&self) -> Option<PathBuf> {
        Some(
            self.system_root
                .join("system32")
                .join("config")
                .join("systemprofile")
                .join("AppData")
                .join("Local")
                .join("FleetDM")
                .join("Orbit")
                .join("Logs"),
        )
    }

    fn agent_service_label(&self) -> &'static str {
        WINDOWS_SERVICE
    }

    fn agent_stop_commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("net", &["stop", WINDOWS_SERVICE]),
            CommandSpec::new("taskkill", &["/F", "/IM", "fleet-desktop.exe"]),
        ]
    }

    fn collector_stop_commands(&self, osquery_path: &Path) -> Vec<CommandSpec> {
        let image = osquery_path
            .file_name()
            .map_or_else(|| "osqueryd.exe".to_string(), |n| n.to_string_lossy().to_string());
        vec![CommandSpec::new("taskkill", &["/F", "/IM", &image])]
    }

    fn service_files(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    fn service_followup_commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }

    fn registry_commands(&self) -> Vec<CommandSpec> {
        let uninstall_entry = format!(
            r#"Get-ChildItem "HKLM:\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall" | Where-Object {{ (Get-ItemProperty $_.PSPath).DisplayName -eq "{WINDOWS_SERVICE}" }} | Remove-Item -Recurse -Force"#
        );
        let service_key = format!(
            r#"Remove-Item "HKLM:\SYSTEM\CurrentControlSet\Services\{WINDOWS_SERVICE}" -Recurse -Force -ErrorAction SilentlyContinue"#
        );
        vec![
            CommandSpec::new("powershell", &["-Command", &uninstall_entry]),
            CommandSpec::new("powershell", &["-Command", &service_key]),
        ]
    }

    fn has_admin_privileges(&self, runner: &dyn CommandRunner) -> bool {
        runner
            .run(&CommandSpec::new("net", &["session"]))
            .is_ok_and(|output| output.success)
    }
}

/// In-memory policy for deterministic tests.
#[derive(Debug, Clone)]
pub struct MockPolicy {
    pub kind: PlatformKind,
    pub root_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub privileged: bool,
    pub agent_stop: Vec<CommandSpec>,
    pub service_files: Vec<PathBuf>,
    pub service_followup: Vec<CommandSpec>,
    pub registry: Vec<CommandSpec>,
}

impl MockPolicy {
    /// Privileged Linux-like policy rooted at `root_dir` with no system log dir.
    #[must_use]
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            kind: PlatformKind::Linux,
            root_dir: root_dir.into(),
            log_dir: None,
            privileged: true,
            agent_stop: vec![
                CommandSpec::new("systemctl", &["stop", SYSTEMD_UNIT]),
                CommandSpec::new("pkill", &["-f", "fleet-desktop"]),
            ],
            service_files: Vec::new(),
            service_followup: Vec::new(),
            registry: Vec::new(),
        }
    }

    #[must_use]
    pub fn unprivileged(mut self) -> Self {
        self.privileged = false;
        self
    }
}

impl PlatformPolicy for MockPolicy {
    fn kind(&self) -> PlatformKind {
        self.kind
    }

    fn default_root_dir(&self) -> PathBuf {
        self.root_dir.clone()
    }

    fn system_log_dir(&self) -> Option<PathBuf> {
        self.log_dir.clone()
    }

    fn agent_service_label(&self) -> &'static str {
        SYSTEMD_UNIT
    }

    fn agent_stop_commands(&self) -> Vec<CommandSpec> {
        self.agent_stop.clone()
    }

    fn collector_stop_commands(&self, osquery_path: &Path) -> Vec<CommandSpec> {
        unix_collector_stop(osquery_path)
    }

    fn service_files(&self) -> Vec<PathBuf> {
        self.service_files.clone()
    }

    fn service_followup_commands(&self) -> Vec<CommandSpec> {
        self.service_followup.clone()
    }

    fn registry_commands(&self) -> Vec<CommandSpec> {
        self.registry.clone()
    }

    fn has_admin_privileges(&self, _runner: &dyn CommandRunner) -> bool {
        self.privileged
    }
}

/// Detect active platform implementation.
pub fn detect_policy() -> Result<Arc<dyn PlatformPolicy>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(LinuxPolicy))
    }
    #[cfg(target_os = "macos")]
    {
        Ok(Arc::new(MacOsPolicy))
    }
    #[cfg(windows)]
    {
        Ok(Arc::new(WindowsPolicy::from_env()))
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
    {
        use crate::core::errors::OrbitError;
        Err(OrbitError::UnsupportedPlatform {
            details: std::env::consts::OS.to_string(),
        })
    }
}

/// `pkill -f` matched against the start of the command line, so only
/// processes executing the binary itself are signalled. Any process that
/// merely carries the path as an argument (this tool included) is left alone.
fn unix_collector_stop(osquery_path: &Path) -> Vec<CommandSpec> {
    vec![CommandSpec::new("pkill", &["-f"]).arg(exec_pattern(osquery_path))]
}

/// Extended regex matching a command line whose first word is `path`.
fn exec_pattern(path: &Path) -> String {
    let mut pattern = String::from("^");
    for c in path.display().to_string().chars() {
        if matches!(
            c,
            '.' | '[' | ']' | '(' | ')' | '*' | '+' | '?' | '{' | '}' | '|' | '^' | '$' | '\\'
        ) {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push_str("( |$)");
    pattern
}

/// Uses `nix::unistd::geteuid()` on Unix; always `false` elsewhere.
fn is_effective_root() -> bool {
    #[cfg(unix)]
    {
        nix::unistd::geteuid().is_root()
    }
    #[cfg(not(unix))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::command::{CommandOutput, RecordingRunner};

    #[test]
    fn linux_stops_agent_but_not_osquery() {
        let lines: Vec<String> = LinuxPolicy
            .agent_stop_commands()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            lines,
            vec![
                "systemctl stop orbit.service",
                "systemctl disable orbit.service",
                "pkill -f fleet-desktop",
            ]
        );
        assert!(lines.iter().all(|l| !l.contains("osquery")));
    }

    #[test]
    fn macos_agent_stop_unloads_plist() {
        let lines: Vec<String> = MacOsPolicy
            .agent_stop_commands()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert!(lines.contains(&format!("launchctl unload {LAUNCHD_PLIST}")));
        assert_eq!(MacOsPolicy.agent_service_label(), "com.fleetdm.orbit");
    }

    #[test]
    fn collector_stop_targets_configured_binary() {
        let cmds = LinuxPolicy.collector_stop_commands(Path::new("/opt/openframe/bin/osqueryd"));
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].program, "pkill");
        assert_eq!(
            cmds[0].args,
            vec!["-f".to_string(), "^/opt/openframe/bin/osqueryd( |$)".to_string()]
        );
    }

    #[test]
    fn exec_pattern_escapes_regex_metacharacters() {
        assert_eq!(
            exec_pattern(Path::new("/opt/of.1/bin/osqueryd+x")),
            r"^/opt/of\.1/bin/osqueryd\+x( |$)"
        );
        assert_eq!(
            exec_pattern(Path::new("/tmp/of-osqueryd")),
            "^/tmp/of-osqueryd( |$)"
        );
    }

    /// Runs the real stop command: the collector dies, while a process that
    /// only mentions the path in its arguments keeps running.
    #[cfg(unix)]
    #[test]
    fn collector_stop_spares_processes_that_only_mention_the_path() {
        use crate::platform::command::{SystemRunner, run_best_effort};
        use std::process::Command;
        use std::time::{Duration, Instant};

        let (Some(sleep), Some(_)) = (
            find_tool(&["/bin/sleep", "/usr/bin/sleep"]),
            find_tool(&["/usr/bin/pkill", "/bin/pkill"]),
        ) else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let collector_path = dir.path().join("osqueryd");
        std::fs::copy(&sleep, &collector_path).unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&collector_path, std::fs::Permissions::from_mode(0o755))
                .unwrap();
        }

        let mut collector = Command::new(&collector_path).arg("30").spawn().unwrap();
        std::thread::sleep(Duration::from_millis(200));
        if collector.try_wait().unwrap().is_some() {
            // Multi-call sleep binaries refuse to run under another name.
            return;
        }
        let mut bystander = Command::new("sh")
            .args(["-c", "sleep 30", collector_path.to_str().unwrap()])
            .spawn()
            .unwrap();
        std::thread::sleep(Duration::from_millis(200));

        for spec in LinuxPolicy.collector_stop_commands(&collector_path) {
            let _ = run_best_effort(&SystemRunner, &spec);
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut stopped = false;
        while Instant::now() < deadline {
            if collector.try_wait().unwrap().is_some() {
                stopped = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        let bystander_alive = bystander.try_wait().unwrap().is_none();
        let _ = collector.kill();
        let _ = collector.wait();
        let _ = bystander.kill();
        let _ = bystander.wait();

        assert!(stopped, "collector should be stopped");
        assert!(bystander_alive, "process mentioning the path must survive");
    }

    #[cfg(unix)]
    fn find_tool(candidates: &[&str]) -> Option<PathBuf> {
        candidates
            .iter()
            .map(PathBuf::from)
            .find(|p| p.is_file())
    }

    #[test]
    fn windows_collector_stop_uses_image_name() {
        let policy = WindowsPolicy::new(PathBuf::from("C:/Windows"), PathBuf::from("C:/PF"));
        let cmds = policy.collector_stop_commands(Path::new("C:/OpenFrame/osqueryd.exe"));
        assert_eq!(cmds[0].to_string(), "taskkill /F /IM osqueryd.exe");
    }

    #[test]
    fn windows_paths_derive_from_environment_roots() {
        let policy = WindowsPolicy::new(PathBuf::from("C:/Windows"), PathBuf::from("C:/PF"));
        assert_eq!(policy.default_root_dir(), PathBuf::from("C:/PF").join("Orbit"));
        let logs = policy.system_log_dir().unwrap();
        assert!(logs.starts_with("C:/Windows"));
        assert!(logs.ends_with(Path::new("FleetDM").join("Orbit").join("Logs")));
        assert_eq!(policy.registry_commands().len(), 2);
    }

    #[test]
    fn windows_privilege_probe_runs_net_session() {
        let policy = WindowsPolicy::new(PathBuf::from("C:/Windows"), PathBuf::from("C:/PF"));
        let denied = RecordingRunner::with_responder(|_| Ok(CommandOutput::failed(2, "denied")));
        assert!(!policy.has_admin_privileges(&denied));
        assert_eq!(denied.call_lines(), vec!["net session"]);

        let granted = RecordingRunner::succeeding();
        assert!(policy.has_admin_privileges(&granted));
    }

    #[test]
    fn unix_policies_have_no_registry_commands() {
        assert!(LinuxPolicy.registry_commands().is_empty());
        assert!(MacOsPolicy.registry_commands().is_empty());
    }

    #[test]
    fn service_files_follow_platform_layout() {
        assert!(
            LinuxPolicy
                .service_files()
                .contains(&PathBuf::from("/etc/default/orbit"))
        );
        assert!(
            MacOsPolicy
                .service_files()
                .contains(&PathBuf::from(LAUNCHD_PLIST))
        );
        assert_eq!(
            MacOsPolicy.service_followup_commands()[0].to_string(),
            "pkgutil --forget com.fleetdm.orbit.base.pkg"
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn detect_policy_on_linux() {
        let policy = detect_policy().expect("linux is supported");
        assert_eq!(policy.kind(), PlatformKind::Linux);
    }
}
