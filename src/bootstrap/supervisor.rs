//! Bootstrap sequence: dependencies, schema preparation, server launch,
//! health wait, optional initialization, then supervise until exit.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::bootstrap::env::BootstrapEnv;
use crate::bootstrap::init::AdminInitializer;
use crate::bootstrap::process::{ServerLauncher, ServerProcess};
use crate::bootstrap::readiness::{Probe, RetryPolicy, wait_until_ready};
use crate::bootstrap::signals::SignalHandler;
use crate::core::config::BootstrapConfig;
use crate::core::errors::{OrbitError, Result};
use crate::logger::activity::ActivityLogger;
use crate::logger::jsonl::{EventType, LogEntry, Severity};
use crate::platform::command::{CommandRunner, CommandSpec, run_required};

/// Static tunables derived from `[bootstrap]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapSettings {
    pub fleet_binary: PathBuf,
    pub fleetctl_binary: PathBuf,
    pub dependency_retry: RetryPolicy,
    pub health_retry: RetryPolicy,
    /// Poll interval of the final wait on the server process.
    pub supervise_poll: Duration,
}

impl BootstrapSettings {
    #[must_use]
    pub fn from_config(config: &BootstrapConfig) -> Self {
        let interval = Duration::from_millis(config.poll_interval_ms);
        Self {
            fleet_binary: config.fleet_binary.clone(),
            fleetctl_binary: config.fleetctl_binary.clone(),
            dependency_retry: RetryPolicy {
                interval,
                max_attempts: config.dependency_max_attempts,
            },
            health_retry: RetryPolicy {
                interval,
                max_attempts: config.health_max_attempts,
            },
            supervise_poll: Duration::from_millis(200),
        }
    }
}

/// Readiness probes, one per dependency plus the server health endpoint.
#[derive(Clone, Copy)]
pub struct Probes<'a> {
    pub mysql: &'a dyn Probe,
    pub redis: &'a dyn Probe,
    pub health: &'a dyn Probe,
}

pub struct Bootstrapper<'a> {
    pub env: &'a BootstrapEnv,
    pub settings: &'a BootstrapSettings,
    pub runner: &'a dyn CommandRunner,
    pub launcher: &'a dyn ServerLauncher,
    pub probes: Probes<'a>,
    pub signals: &'a SignalHandler,
    pub logger: &'a ActivityLogger,
    pub sleep: &'a dyn Fn(Duration),
}

impl Bootstrapper<'_> {
    /// Run the full sequence and return the server's exit code.
    pub fn run(&self) -> Result<i32> {
        self.wait_for_dependency(self.probes.mysql)?;
        self.wait_for_dependency(self.probes.redis)?;
        self.prepare_database()?;

        let serve = self.serve_command();
        let mut server = self.launcher.launch(&serve)?;
        self.logger.record(
            &LogEntry::new(EventType::ServerStart, Severity::Info).with_command(serve.to_string()),
        );

        if let Err(e) = self.wait_for_health(server.as_mut()) {
            server.terminate();
            self.logger.record(&LogEntry::new(EventType::Error, Severity::Critical).with_error(&e));
            return Err(e);
        }

        self.initialize_if_needed();
        self.supervise(server.as_mut())
    }

    #[must_use]
    pub fn prepare_command(&self) -> CommandSpec {
        self.fleet_command(&["prepare", "db", "--no-prompt"])
    }

    #[must_use]
    pub fn serve_command(&self) -> CommandSpec {
        self.fleet_command(&["serve"])
    }

    fn fleet_command(&self, args: &[&str]) -> CommandSpec {
        let spec = CommandSpec::new(self.settings.fleet_binary.display().to_string(), args);
        match &self.env.fleet_config {
            Some(config) => spec.arg("--config").arg(config.display().to_string()),
            None => spec,
        }
    }

    fn wait_for_dependency(&self, probe: &dyn Probe) -> Result<()> {
        let started = Instant::now();
        let attempts = wait_until_ready(
            probe,
            self.settings.dependency_retry,
            |d| (self.sleep)(d),
            || match self.signals.take_pending() {
                Some(signal) => Err(OrbitError::Runtime {
                    details: format!("{signal:?} received while waiting for {}", probe.name()),
                }),
                None => Ok(()),
            },
        )?;
        self.logger.record(
            &LogEntry::new(EventType::DependencyReady, Severity::Info)
                .with_details(format!("{} at {}", probe.name(), probe.target()))
                .with_attempts(attempts)
                .with_duration_ms(elapsed_ms(started)),
        );
        Ok(())
    }

    fn prepare_database(&self) -> Result<()> {
        let spec = self.prepare_command();
        let started = Instant::now();
        run_required(self.runner, &spec)?;
        self.logger.record(
            &LogEntry::new(EventType::MigrationComplete, Severity::Info)
                .with_command(spec.to_string())
                .with_duration_ms(elapsed_ms(started))
                .with_ok(true),
        );
        Ok(())
    }

    fn wait_for_health(&self, server: &mut dyn ServerProcess) -> Result<()> {
        let health = self.probes.health;
        let outcome = wait_until_ready(
            health,
            self.settings.health_retry,
            |d| (self.sleep)(d),
            || {
                if let Some(code) = server.try_wait()? {
                    return Err(OrbitError::ServerStartup {
                        details: format!("server exited with code {code} before becoming healthy"),
                    });
                }
                if let Some(signal) = self.signals.take_pending() {
                    let _ = server.signal(signal);
                    return Err(OrbitError::ServerStartup {
                        details: format!("{signal:?} received during startup"),
                    });
                }
                Ok(())
            },
        );
        match outcome {
            Ok(_) => Ok(()),
            Err(OrbitError::DependencyTimeout { attempts, .. }) => {
                Err(OrbitError::ServerStartup {
                    details: format!(
                        "health endpoint {} not ready after {attempts} attempts",
                        health.target()
                    ),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Initialization failure is reported and swallowed.
    fn initialize_if_needed(&self) {
        let Some(init) = &self.env.auto_init else {
            return;
        };
        let server_address = self.env.server_address();
        let initializer = AdminInitializer {
            runner: self.runner,
            fleetctl: &self.settings.fleetctl_binary,
            server_address: &server_address,
            init,
            logger: self.logger,
        };
        if initializer.already_initialized() {
            return;
        }
        if let Err(e) = initializer.run() {
            eprintln!("[ORB-BOOTSTRAP] initialization failed, continuing: {e}");
            self.logger.record(
                &LogEntry::new(EventType::AdminInit, Severity::Warning).with_error(&e),
            );
        }
    }

    fn supervise(&self, server: &mut dyn ServerProcess) -> Result<i32> {
        loop {
            if let Some(code) = server.try_wait()? {
                self.logger.record(
                    &LogEntry::new(EventType::ServerExit, Severity::Info)
                        .with_ok(code == 0)
                        .with_details(format!("exit code {code}")),
                );
                return Ok(code);
            }
            if let Some(signal) = self.signals.take_pending()
                && let Err(e) = server.signal(signal)
            {
                eprintln!("[ORB-BOOTSTRAP] {e}");
            }
            (self.sleep)(self.settings.supervise_poll);
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
