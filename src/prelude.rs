//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use orbit_maint::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{OrbitError, Result};
pub use crate::core::paths::resolve_root_dir;

// Platform
pub use crate::platform::command::{CommandRunner, CommandSpec, SystemRunner};
pub use crate::platform::pal::{PlatformKind, PlatformPolicy, detect_policy};

// Logging
pub use crate::logger::activity::ActivityLogger;

// UUID query
pub use crate::query::uuid::{query_host_uuid, resolve_osquery_path};

// Cleanup
pub use crate::cleanup::orchestrator::{
    CategorySelection, Cleanup, CleanupMode, CleanupOutcome, CleanupRequest, ErrorPolicy,
    FsRemover,
};
pub use crate::cleanup::report::{CleanupResult, CleanupSummary};

// Bootstrap
#[cfg(feature = "bootstrap")]
pub use crate::bootstrap::env::BootstrapEnv;
#[cfg(feature = "bootstrap")]
pub use crate::bootstrap::supervisor::{BootstrapSettings, Bootstrapper};
