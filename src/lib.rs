#![forbid(unsafe_code)]

//! orbit-maint: maintenance operations for the orbit endpoint agent.
//!
//! Three flows:
//! 1. **UUID query**: ask an OpenFrame-managed osquery for the host UUID
//! 2. **Cleanup**: stop the agent and remove its logs, caches, secrets, service files
//! 3. **Bootstrap**: container entrypoint that waits for MySQL and Redis, prepares
//!    the schema, runs the server and performs first-run initialization
//!
//! # Library usage
//!
//! ```rust,no_run
//! use orbit_maint::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use orbit_maint::core::config::Config;
//! use orbit_maint::cleanup::orchestrator::{Cleanup, CleanupRequest};
//! ```

pub mod prelude;

#[cfg(feature = "bootstrap")]
pub mod bootstrap;
pub mod cleanup;
pub mod core;
pub mod logger;
pub mod platform;
pub mod query;
