//! Core types: errors, configuration, root directory resolution.

pub mod config;
pub mod errors;
pub mod paths;
