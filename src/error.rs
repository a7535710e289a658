use std::io;

use thiserror::Error;

/// Rejected run parameters. Raised before any worker is spawned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be at least 1, got {value}")]
    NonPositive { name: &'static str, value: i64 },
    #[error("expected total {workers} x {repeats} x {increment} overflows i64")]
    Overflow {
        workers: usize,
        repeats: u64,
        increment: i64,
    },
    #[error("cannot inject {faults} faults into {workers} workers")]
    TooManyFaults { faults: usize, workers: usize },
    #[error("fault planned for worker {worker} but only {workers} workers run")]
    UnknownWorker { worker: usize, workers: usize },
    #[error("fault planned after {at_iteration} increments but workers only repeat {repeats} times")]
    FaultPastEnd { at_iteration: u64, repeats: u64 },
}

/// Failures of the orchestrator itself. Worker faults are not errors here,
/// they are reported inside the run result.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("failed to spawn worker {index}")]
    Spawn {
        index: usize,
        #[source]
        source: io::Error,
    },
}
