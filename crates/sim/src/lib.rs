//! Deterministic workload for exercising the token end to end.

pub mod scenario;

pub use scenario::{AccountSnapshot, ENV_ROUNDS, Scenario, Snapshot};
