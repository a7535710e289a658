//! Count-down latch used both as the start gate and the completion tracker.
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::debug;

/// Opens once `count_down` has been called `count` times. Waiters block
/// until then; calls past zero are ignored.
#[derive(Debug)]
pub struct Latch {
    remaining: Mutex<usize>,
    opened: Condvar,
}

impl Latch {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            opened: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        // The guarded usize is always consistent, even after a panic.
        self.remaining.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the count left after this call.
    pub fn count_down(&self) -> usize {
        let mut remaining = self.lock();
        if *remaining > 0 {
            *remaining -= 1;
            if *remaining == 0 {
                self.opened.notify_all();
            }
        }
        *remaining
    }

    pub fn count(&self) -> usize {
        *self.lock()
    }

    pub fn wait(&self) {
        let mut remaining = self.lock();
        while *remaining > 0 {
            remaining = self.opened.wait(remaining).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Waits at most `timeout`. Returns `false` if the latch is still closed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut remaining = self.lock();
        while *remaining > 0 {
            let now = Instant::now();
            if now >= deadline {
                debug!("latch wait timed out with {} remaining", *remaining);
                return false;
            }
            remaining = self
                .opened
                .wait_timeout(remaining, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
        true
    }
}
