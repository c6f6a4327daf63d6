//! Container entrypoint: wait for MySQL and Redis, prepare the schema, run
//! the server, and optionally perform first-run initialization.

pub mod env;
pub mod init;
pub mod process;
pub mod readiness;
pub mod signals;
pub mod supervisor;
