use std::fs;
use std::path::PathBuf;
use std::io::Write;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

/// Variables the binary reads; cleared so the host environment cannot leak in.
const SCRUBBED_ENV: &[&str] = &[
    "ORBIT_ROOT_DIR",
    "ORBIT_OPENFRAME_MODE",
    "ORBIT_OPENFRAME_OSQUERY_PATH",
    "ORBIT_MAINT_ACTIVITY_LOG",
    "ORBIT_MAINT_OUTPUT_FORMAT",
    "ORBIT_MAINT_CONTINUE_ON_ERROR",
    "FLEET_MYSQL_ADDRESS",
    "FLEET_REDIS_ADDRESS",
    "FLEET_AUTO_INIT",
];

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_orbit-maint") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) {
        "orbit-maint.exe"
    } else {
        "orbit-maint"
    };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve orbit-maint binary path for integration test"),
    }
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    run_cli_case_with_env(case_name, args, &[])
}

pub fn run_cli_case_with_env(case_name: &str, args: &[&str], env: &[(&str, &str)]) -> CmdResult {
    run_cli_case_full(case_name, args, env, None)
}

pub fn run_cli_case_with_input(case_name: &str, args: &[&str], input: &str) -> CmdResult {
    run_cli_case_full(case_name, args, &[], Some(input))
}

fn run_cli_case_full(
    case_name: &str,
    args: &[&str],
    env: &[(&str, &str)],
    input: Option<&str>,
) -> CmdResult {
    let root = std::env::temp_dir().join("orbit-maint-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let mut command = Command::new(&bin_path);
    command.args(args).env("RUST_BACKTRACE", "1");
    for name in SCRUBBED_ENV {
        command.env_remove(name);
    }
    for (name, value) in env {
        command.env(name, value);
    }
    let output = match input {
        None => command.output().expect("execute orbit-maint command"),
        Some(input) => {
            let mut child = command
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .expect("spawn orbit-maint command");
            child
                .stdin
                .take()
                .expect("piped stdin")
                .write_all(input.as_bytes())
                .expect("write stdin");
            child.wait_with_output().expect("wait for orbit-maint command")
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("env={env:?}\n"));
    log_content.push_str(&format!("stdin={input:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}
