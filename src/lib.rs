//! A stress harness that makes lost updates on a shared counter observable.
//!
//! Many worker threads add to one counter at the same time. With the racy
//! counter, the final total usually falls short of
//! `workers * repeats * increment`; the locked and atomic counters show what
//! the total looks like when nothing is lost.
pub mod config;
pub mod counter;
pub mod error;
pub mod fault;
pub mod harness;
pub mod options;
pub mod worker;

pub use config::{ReleaseMode, RunConfig};
pub use counter::{Counter, CounterKind};
pub use error::{ConfigError, HarnessError};
pub use fault::{FaultKind, FaultPlan, FaultRecord, WorkerFault};
pub use harness::{run, run_repeated, Harness, RunResult, Summary, Verdict};
