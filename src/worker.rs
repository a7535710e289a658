use std::sync::Arc;

use crate::counter::Counter;
use crate::fault::{FaultKind, InjectedFault, WorkerFault};

/// Adds `increment` to the shared counter `repeats` times in a tight loop.
pub struct Worker {
    index: usize,
    increment: i64,
    counter: Arc<dyn Counter>,
    repeats: u64,
    fault: Option<InjectedFault>,
}

impl Worker {
    pub fn new(index: usize, increment: i64, counter: Arc<dyn Counter>, repeats: u64) -> Self {
        Self {
            index,
            increment,
            counter,
            repeats,
            fault: None,
        }
    }

    pub fn with_fault(mut self, fault: Option<InjectedFault>) -> Self {
        self.fault = fault;
        self
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Runs the loop. An injected fault stops it after `at_iteration`
    /// increments, either with an error or a panic.
    pub fn run(&self) -> Result<(), WorkerFault> {
        let clean = match self.fault {
            Some(fault) => fault.at_iteration.min(self.repeats),
            None => self.repeats,
        };
        for _ in 0..clean {
            self.counter.add(self.increment);
        }
        match self.fault {
            None => Ok(()),
            Some(InjectedFault {
                kind: FaultKind::Error,
                ..
            }) => Err(WorkerFault::Injected {
                worker: self.index,
                iteration: clean,
            }),
            Some(InjectedFault {
                kind: FaultKind::Panic,
                ..
            }) => panic!(
                "injected panic in worker {} after {} increments",
                self.index, clean
            ),
        }
    }
}
