//! Platform abstraction: OS policy and external command execution.

pub mod command;
pub mod pal;
