//! Long-running server child process.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus};

use crate::bootstrap::signals::ForwardSignal;
use crate::core::errors::{OrbitError, Result};
use crate::platform::command::CommandSpec;

/// A started server process.
pub trait ServerProcess: Send {
    /// Exit code if the process has finished.
    fn try_wait(&mut self) -> Result<Option<i32>>;
    /// Deliver a forwarded signal.
    fn signal(&mut self, signal: ForwardSignal) -> Result<()>;
    /// Stop the process and reap it.
    fn terminate(&mut self);
}

/// Starts server processes.
pub trait ServerLauncher: Send + Sync {
    fn launch(&self, spec: &CommandSpec) -> Result<Box<dyn ServerProcess>>;
}

/// [`ServerLauncher`] over `std::process::Command` with inherited stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl ServerLauncher for SystemLauncher {
    fn launch(&self, spec: &CommandSpec) -> Result<Box<dyn ServerProcess>> {
        let child = Command::new(&spec.program)
            .args(&spec.args)
            .spawn()
            .map_err(|source| OrbitError::Io {
                path: PathBuf::from(&spec.program),
                source,
            })?;
        Ok(Box::new(ChildProcess { child }))
    }
}

struct ChildProcess {
    child: Child,
}

impl ServerProcess for ChildProcess {
    fn try_wait(&mut self) -> Result<Option<i32>> {
        self.child
            .try_wait()
            .map(|status| status.map(exit_code))
            .map_err(|e| OrbitError::Runtime {
                details: format!("failed to poll server process: {e}"),
            })
    }

    #[cfg(unix)]
    fn signal(&mut self, signal: ForwardSignal) -> Result<()> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let sig = match signal {
            ForwardSignal::Terminate => Signal::SIGTERM,
            ForwardSignal::Interrupt => Signal::SIGINT,
        };
        let pid = i32::try_from(self.child.id()).map_err(|_| OrbitError::Runtime {
            details: format!("server pid {} out of range", self.child.id()),
        })?;
        kill(Pid::from_raw(pid), sig).map_err(|e| OrbitError::Runtime {
            details: format!("failed to forward {sig:?} to server: {e}"),
        })
    }

    #[cfg(not(unix))]
    fn signal(&mut self, _signal: ForwardSignal) -> Result<()> {
        self.child.kill().map_err(|e| OrbitError::Runtime {
            details: format!("failed to stop server: {e}"),
        })
    }

    fn terminate(&mut self) {
        if matches!(self.child.try_wait(), Ok(Some(_))) {
            return;
        }
        if self.signal(ForwardSignal::Terminate).is_err() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

/// Exit code, mapping signal deaths to `128 + signo` like a shell.
fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    status.code().unwrap_or(1)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    fn wait_for_exit(process: &mut dyn ServerProcess) -> i32 {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(code) = process.try_wait().unwrap() {
                return code;
            }
            assert!(Instant::now() < deadline, "child did not exit");
            thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn exit_code_propagates() {
        let mut process = SystemLauncher
            .launch(&CommandSpec::new("sh", &["-c", "exit 7"]))
            .unwrap();
        assert_eq!(wait_for_exit(process.as_mut()), 7);
    }

    #[test]
    fn forwarded_term_reports_signal_exit() {
        let mut process = SystemLauncher
            .launch(&CommandSpec::new("sleep", &["30"]))
            .unwrap();
        process.signal(ForwardSignal::Terminate).unwrap();
        assert_eq!(wait_for_exit(process.as_mut()), 128 + 15);
    }

    #[test]
    fn missing_binary_fails_to_launch() {
        let result = SystemLauncher.launch(&CommandSpec::new("/nonexistent/fleet-server", &["serve"]));
        assert_eq!(result.err().map(|e| e.code()), Some("ORB-3002"));
    }
}
