//! Shared counters mutated by every worker of a run.
//!
//! The racy variant performs its read-modify-write as two independent
//! accesses, the very shape an atomicity-violation detector flags:
//! ```text
//! let v1 = total.load(Relaxed);
//! total.store(v1 + amount, Relaxed);
//! ```
//! Two workers that load the same `v1` both store `v1 + amount`, and one
//! update is lost. The locked and atomic variants exist for contrast.
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// A running `i64` total that any number of threads may add to.
pub trait Counter: Send + Sync {
    /// Reads the current total, adds `amount` and writes it back.
    fn add(&self, amount: i64);
    fn value(&self) -> i64;
    fn kind(&self) -> CounterKind;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CounterKind {
    /// Unsynchronized read-modify-write. Loses updates under contention.
    Racy,
    /// Read-modify-write under an exclusive lock.
    Locked,
    /// Single atomic fetch-and-add.
    Atomic,
}

impl Default for CounterKind {
    fn default() -> Self {
        CounterKind::Racy
    }
}

impl CounterKind {
    pub const ALL: [&'static str; 3] = ["racy", "locked", "atomic"];

    pub fn as_str(&self) -> &'static str {
        match self {
            CounterKind::Racy => "racy",
            CounterKind::Locked => "locked",
            CounterKind::Atomic => "atomic",
        }
    }

    /// Builds a fresh counter of this kind starting at zero.
    pub fn build(self) -> Arc<dyn Counter> {
        match self {
            CounterKind::Racy => Arc::new(RacyCounter::new()),
            CounterKind::Locked => Arc::new(LockedCounter::new()),
            CounterKind::Atomic => Arc::new(AtomicCounter::new()),
        }
    }
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CounterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "racy" => Ok(CounterKind::Racy),
            "locked" => Ok(CounterKind::Locked),
            "atomic" => Ok(CounterKind::Atomic),
            other => Err(format!(
                "unknown counter kind `{}`, expected one of {:?}",
                other,
                CounterKind::ALL
            )),
        }
    }
}

/// Load and store are each atomic, the pair is not.
#[derive(Debug, Default)]
pub struct RacyCounter {
    total: AtomicI64,
}

impl RacyCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Counter for RacyCounter {
    fn add(&self, amount: i64) {
        let current = self.total.load(Ordering::Relaxed);
        self.total.store(current.wrapping_add(amount), Ordering::Relaxed);
    }

    fn value(&self) -> i64 {
        self.total.load(Ordering::Relaxed)
    }

    fn kind(&self) -> CounterKind {
        CounterKind::Racy
    }
}

#[derive(Debug, Default)]
pub struct LockedCounter {
    total: Mutex<i64>,
}

impl LockedCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Counter for LockedCounter {
    fn add(&self, amount: i64) {
        // A poisoned lock still guards a consistent i64.
        let mut total = self.total.lock().unwrap_or_else(|e| e.into_inner());
        *total = total.wrapping_add(amount);
    }

    fn value(&self) -> i64 {
        *self.total.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn kind(&self) -> CounterKind {
        CounterKind::Locked
    }
}

#[derive(Debug, Default)]
pub struct AtomicCounter {
    total: AtomicI64,
}

impl AtomicCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Counter for AtomicCounter {
    fn add(&self, amount: i64) {
        self.total.fetch_add(amount, Ordering::SeqCst);
    }

    fn value(&self) -> i64 {
        self.total.load(Ordering::SeqCst)
    }

    fn kind(&self) -> CounterKind {
        CounterKind::Atomic
    }
}
