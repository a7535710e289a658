//! Worker faults and planned fault injection.
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ConfigError;

/// A fault raised while a worker runs its increment loop.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum WorkerFault {
    #[error("injected fault in worker {worker} after {iteration} increments")]
    Injected { worker: usize, iteration: u64 },
    #[error("worker panicked: {message}")]
    Panicked { message: String },
}

impl WorkerFault {
    /// Converts a panic payload caught at the thread boundary.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        WorkerFault::Panicked { message }
    }
}

/// A captured fault together with the worker that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultRecord {
    pub worker: usize,
    pub fault: WorkerFault,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultKind {
    /// `Worker::run` returns `Err(WorkerFault::Injected)`.
    Error,
    /// `Worker::run` panics.
    Panic,
}

impl Default for FaultKind {
    fn default() -> Self {
        FaultKind::Error
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::Error => f.write_str("error"),
            FaultKind::Panic => f.write_str("panic"),
        }
    }
}

impl FromStr for FaultKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(FaultKind::Error),
            "panic" => Ok(FaultKind::Panic),
            other => Err(format!("unknown fault kind `{}`", other)),
        }
    }
}

/// The fault a single worker is told to raise.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InjectedFault {
    pub kind: FaultKind,
    pub at_iteration: u64,
}

/// Which workers fault, how, and after how many increments.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultPlan {
    pub workers: BTreeSet<usize>,
    pub kind: FaultKind,
    pub at_iteration: u64,
}

impl FaultPlan {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(workers: impl IntoIterator<Item = usize>, kind: FaultKind, at_iteration: u64) -> Self {
        Self {
            workers: workers.into_iter().collect(),
            kind,
            at_iteration,
        }
    }

    /// Picks `count` distinct worker indices out of `worker_count`.
    /// The same seed always picks the same workers.
    pub fn random(
        count: usize,
        worker_count: usize,
        kind: FaultKind,
        at_iteration: u64,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        if count > worker_count {
            return Err(ConfigError::TooManyFaults {
                faults: count,
                workers: worker_count,
            });
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let workers = rand::seq::index::sample(&mut rng, worker_count, count);
        Ok(Self::new(workers.into_iter(), kind, at_iteration))
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn fault_for(&self, worker: usize) -> Option<InjectedFault> {
        if self.workers.contains(&worker) {
            Some(InjectedFault {
                kind: self.kind,
                at_iteration: self.at_iteration,
            })
        } else {
            None
        }
    }

    pub(crate) fn validate(&self, worker_count: usize, repeats: u64) -> Result<(), ConfigError> {
        if self.workers.len() > worker_count {
            return Err(ConfigError::TooManyFaults {
                faults: self.workers.len(),
                workers: worker_count,
            });
        }
        if let Some(&worker) = self.workers.iter().find(|&&w| w >= worker_count) {
            return Err(ConfigError::UnknownWorker {
                worker,
                workers: worker_count,
            });
        }
        if !self.is_empty() && self.at_iteration > repeats {
            return Err(ConfigError::FaultPastEnd {
                at_iteration: self.at_iteration,
                repeats,
            });
        }
        Ok(())
    }
}
