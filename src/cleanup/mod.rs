//! Agent data cleanup: category path sets, orchestration, result reporting.

pub mod orchestrator;
pub mod report;
pub mod targets;
