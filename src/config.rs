//! Parameters of a single harness run.
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::counter::CounterKind;
use crate::error::ConfigError;
use crate::fault::FaultPlan;

pub const DEFAULT_WORKERS: usize = 1000;
pub const DEFAULT_INCREMENT: i64 = 7;
pub const DEFAULT_REPEATS: u64 = 1000;

/// How the start gate lets workers into their loops.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseMode {
    /// Open once, after every worker thread exists.
    Once,
    /// Gate sized to the worker count and counted down once per spawn. It
    /// still opens on the last spawn, so no worker starts before all exist.
    PerSpawn,
}

impl Default for ReleaseMode {
    fn default() -> Self {
        ReleaseMode::Once
    }
}

impl fmt::Display for ReleaseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseMode::Once => f.write_str("once"),
            ReleaseMode::PerSpawn => f.write_str("per-spawn"),
        }
    }
}

impl FromStr for ReleaseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "once" => Ok(ReleaseMode::Once),
            "per-spawn" => Ok(ReleaseMode::PerSpawn),
            other => Err(format!("unknown release mode `{}`", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub workers: usize,
    pub increment: i64,
    pub repeats: u64,
    pub counter: CounterKind,
    pub release: ReleaseMode,
    /// Maximum wait for every worker to finish, in milliseconds.
    pub timeout_ms: Option<u64>,
    pub faults: FaultPlan,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS, DEFAULT_INCREMENT, DEFAULT_REPEATS)
    }
}

impl RunConfig {
    pub fn new(workers: usize, increment: i64, repeats: u64) -> Self {
        Self {
            workers,
            increment,
            repeats,
            counter: CounterKind::default(),
            release: ReleaseMode::default(),
            timeout_ms: None,
            faults: FaultPlan::none(),
        }
    }

    pub fn with_counter(mut self, counter: CounterKind) -> Self {
        self.counter = counter;
        self
    }

    pub fn with_release(mut self, release: ReleaseMode) -> Self {
        self.release = release;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = faults;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// `workers * repeats * increment`, or an error if it does not fit an i64.
    pub fn expected_total(&self) -> Result<i64, ConfigError> {
        let overflow = || ConfigError::Overflow {
            workers: self.workers,
            repeats: self.repeats,
            increment: self.increment,
        };
        let workers = i64::try_from(self.workers).map_err(|_| overflow())?;
        let repeats = i64::try_from(self.repeats).map_err(|_| overflow())?;
        workers
            .checked_mul(repeats)
            .and_then(|n| n.checked_mul(self.increment))
            .ok_or_else(overflow)
    }

    /// Checks every parameter and returns the expected total.
    pub fn validate(&self) -> Result<i64, ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NonPositive {
                name: "worker count",
                value: 0,
            });
        }
        if self.increment < 1 {
            return Err(ConfigError::NonPositive {
                name: "increment",
                value: self.increment,
            });
        }
        if self.repeats == 0 {
            return Err(ConfigError::NonPositive {
                name: "repeat count",
                value: 0,
            });
        }
        let expected = self.expected_total()?;
        self.faults.validate(self.workers, self.repeats)?;
        Ok(expected)
    }
}
