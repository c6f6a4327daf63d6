//! Readiness probes and the bounded fixed-interval retry loop.

#![allow(missing_docs)]

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::bootstrap::env::HostPort;
use crate::core::errors::{OrbitError, Result};

/// One readiness check.
pub trait Probe: Send + Sync {
    /// Name used in logs and timeout errors (`mysql`, `redis`, `server`).
    fn name(&self) -> &str;
    /// Address or URL being probed.
    fn target(&self) -> String;
    /// Single attempt; `true` when the dependency answered.
    fn check(&self) -> bool;
}

/// TCP connect probe.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    name: String,
    address: HostPort,
    timeout: Duration,
}

impl TcpProbe {
    #[must_use]
    pub fn new(name: impl Into<String>, address: HostPort, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            address,
            timeout,
        }
    }
}

impl Probe for TcpProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn target(&self) -> String {
        self.address.to_string()
    }

    fn check(&self) -> bool {
        // Unresolvable host counts as not ready.
        let Ok(addrs) = (self.address.host.as_str(), self.address.port).to_socket_addrs() else {
            return false;
        };
        addrs
            .into_iter()
            .any(|addr| TcpStream::connect_timeout(&addr, self.timeout).is_ok())
    }
}

/// HTTP GET probe; ready on any 2xx response.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OrbitError::Runtime {
                details: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

impl Probe for HttpProbe {
    fn name(&self) -> &str {
        "server"
    }

    fn target(&self) -> String {
        self.url.clone()
    }

    fn check(&self) -> bool {
        self.client
            .get(&self.url)
            .send()
            .is_ok_and(|response| response.status().is_success())
    }
}

/// Fixed interval, bounded attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

/// Poll `probe` until it answers or attempts run out.
///
/// `guard` runs before every attempt and can abort the wait (the server
/// process exiting early, for example). Returns the attempt that succeeded.
pub fn wait_until_ready<S, G>(
    probe: &dyn Probe,
    policy: RetryPolicy,
    mut sleep: S,
    mut guard: G,
) -> Result<u32>
where
    S: FnMut(Duration),
    G: FnMut() -> Result<()>,
{
    for attempt in 1..=policy.max_attempts {
        guard()?;
        if probe.check() {
            return Ok(attempt);
        }
        if attempt < policy.max_attempts {
            sleep(policy.interval);
        }
    }
    Err(OrbitError::DependencyTimeout {
        name: probe.name().to_string(),
        address: probe.target(),
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Succeeds from the `ready_at`-th check on; `None` never succeeds.
    pub(crate) struct CountingProbe {
        pub name: &'static str,
        pub ready_at: Option<u32>,
        pub checks: AtomicU32,
    }

    impl CountingProbe {
        pub(crate) fn new(name: &'static str, ready_at: Option<u32>) -> Self {
            Self {
                name,
                ready_at,
                checks: AtomicU32::new(0),
            }
        }

        pub(crate) fn checks(&self) -> u32 {
            self.checks.load(Ordering::SeqCst)
        }
    }

    impl Probe for CountingProbe {
        fn name(&self) -> &str {
            self.name
        }

        fn target(&self) -> String {
            format!("{}:0", self.name)
        }

        fn check(&self) -> bool {
            let n = self.checks.fetch_add(1, Ordering::SeqCst) + 1;
            self.ready_at.is_some_and(|at| n >= at)
        }
    }

    const POLICY: RetryPolicy = RetryPolicy {
        interval: Duration::from_millis(250),
        max_attempts: 5,
    };

    #[test]
    fn ready_on_third_attempt_sleeps_twice() {
        let probe = CountingProbe::new("mysql", Some(3));
        let mut sleeps = Vec::new();
        let attempt = wait_until_ready(&probe, POLICY, |d| sleeps.push(d), || Ok(())).unwrap();
        assert_eq!(attempt, 3);
        assert_eq!(sleeps, vec![Duration::from_millis(250); 2]);
    }

    #[test]
    fn exhaustion_names_dependency() {
        let probe = CountingProbe::new("redis", None);
        let mut sleeps = 0;
        let err = wait_until_ready(&probe, POLICY, |_| sleeps += 1, || Ok(())).unwrap_err();
        assert_eq!(probe.checks(), 5);
        assert_eq!(sleeps, 4);
        assert_eq!(err.code(), "ORB-4001");
        assert!(err.to_string().contains("redis"));
        assert!(err.to_string().contains("5 attempts"));
    }

    #[test]
    fn guard_aborts_wait() {
        let probe = CountingProbe::new("server", None);
        let mut calls = 0;
        let err = wait_until_ready(
            &probe,
            POLICY,
            |_| {},
            || {
                calls += 1;
                if calls == 2 {
                    Err(OrbitError::ServerStartup {
                        details: "exited".to_string(),
                    })
                } else {
                    Ok(())
                }
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "ORB-4002");
        assert_eq!(probe.checks(), 1);
    }

    #[test]
    fn tcp_probe_detects_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = TcpProbe::new(
            "mysql",
            HostPort {
                host: "127.0.0.1".to_string(),
                port,
            },
            Duration::from_millis(500),
        );
        assert!(probe.check());
        assert_eq!(probe.target(), format!("127.0.0.1:{port}"));

        drop(listener);
        assert!(!probe.check());
    }
}
