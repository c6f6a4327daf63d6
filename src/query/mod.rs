//! One-shot osquery invocations.

pub mod uuid;
