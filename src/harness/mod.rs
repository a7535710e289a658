//! Spawns workers against one shared counter and checks the total.
//!
//! A run moves through `Initializing -> Spawning -> AwaitingCompletion` and
//! ends with exactly one verdict. Worker threads are all parked on a start
//! gate before any increments happen, so the loops overlap as much as the
//! OS scheduler allows. Faults are caught at the thread boundary and counted;
//! they never reach the orchestrator or sibling workers.
pub mod latch;
pub mod report;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{debug, info, warn};

use crate::config::{ReleaseMode, RunConfig};
use crate::counter::Counter;
use crate::error::HarnessError;
use crate::fault::{FaultRecord, WorkerFault};
use crate::worker::Worker;

use self::latch::Latch;
pub use self::report::{RunResult, Summary, Verdict};

const WORKER_STACK_SIZE: usize = 256 * 1024;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Spawning,
    AwaitingCompletion,
    Finished(Verdict),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Initializing => f.write_str("initializing"),
            Phase::Spawning => f.write_str("spawning"),
            Phase::AwaitingCompletion => f.write_str("awaiting completion"),
            Phase::Finished(verdict) => write!(f, "finished ({})", verdict),
        }
    }
}

/// Failure count and fault log shared by every worker of a run.
#[derive(Debug, Default)]
struct Tally {
    failures: AtomicUsize,
    faults: Mutex<Vec<FaultRecord>>,
}

impl Tally {
    /// Returns the failure number of this fault.
    fn record(&self, worker: usize, fault: WorkerFault) -> usize {
        let number = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        self.faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(FaultRecord { worker, fault });
        number
    }

    fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    fn take_faults(&self) -> Vec<FaultRecord> {
        let mut faults =
            std::mem::take(&mut *self.faults.lock().unwrap_or_else(|e| e.into_inner()));
        faults.sort_by_key(|record| record.worker);
        faults
    }
}

/// Counts the finish latch down when a worker thread exits, however it exits.
struct CompletionGuard {
    finish: Arc<Latch>,
    name: String,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        let remaining = self.finish.count_down();
        debug!("{} finished, {} remaining", self.name, remaining);
    }
}

fn release(gate: &Latch) {
    while gate.count_down() > 0 {}
}

/// Joins every worker thread. A thread that panicked outside its fault
/// boundary still counts as a failed worker.
fn join_workers(handles: Vec<(usize, JoinHandle<()>)>, tally: &Tally) {
    for (index, handle) in handles {
        if let Err(payload) = handle.join() {
            let number = tally.record(index, WorkerFault::from_panic(payload));
            warn!(
                "failure #{} in worker-{}: panicked outside its fault boundary",
                number, index
            );
        }
    }
}

pub struct Harness {
    config: RunConfig,
}

impl Harness {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    /// One run against a fresh counter of the configured kind.
    pub fn run(&self) -> Result<RunResult, HarnessError> {
        self.run_with(self.config.counter.build())
    }

    /// One run against `counter`, which should start at zero.
    pub fn run_with(&self, counter: Arc<dyn Counter>) -> Result<RunResult, HarnessError> {
        let config = &self.config;
        info!("{}: {:?}", Phase::Initializing, config);
        let expected_total = config.validate()?;
        let started = Instant::now();

        let start = Arc::new(Latch::new(match config.release {
            ReleaseMode::Once => 1,
            ReleaseMode::PerSpawn => config.workers,
        }));
        let finish = Arc::new(Latch::new(config.workers));
        let tally = Arc::new(Tally::default());

        info!("{}: preparing {} threads", Phase::Spawning, config.workers);
        let mut handles: Vec<(usize, JoinHandle<()>)> = Vec::with_capacity(config.workers);
        for index in 0..config.workers {
            let worker = Worker::new(index, config.increment, Arc::clone(&counter), config.repeats)
                .with_fault(config.faults.fault_for(index));
            let name = format!("worker-{}", index);
            let guard = CompletionGuard {
                finish: Arc::clone(&finish),
                name: name.clone(),
            };
            let gate = Arc::clone(&start);
            let worker_tally = Arc::clone(&tally);
            let spawned = thread::Builder::new()
                .name(name)
                .stack_size(WORKER_STACK_SIZE)
                .spawn(move || {
                    let guard = guard;
                    debug!("{} started, holding at start gate", guard.name);
                    gate.wait();
                    debug!("{} running", guard.name);
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker.run()))
                        .unwrap_or_else(|payload| Err(WorkerFault::from_panic(payload)));
                    if let Err(fault) = outcome {
                        let number = worker_tally.record(worker.index(), fault.clone());
                        warn!("failure #{} in {}: {}", number, guard.name, fault);
                    }
                });
            match spawned {
                Ok(handle) => handles.push((index, handle)),
                Err(source) => {
                    // Drain what already exists before giving up on the run.
                    release(&start);
                    join_workers(handles, &tally);
                    return Err(HarnessError::Spawn { index, source });
                }
            }
            if config.release == ReleaseMode::PerSpawn {
                start.count_down();
            }
        }
        if config.release == ReleaseMode::Once {
            start.count_down();
        }

        info!("{}: all {} threads released", Phase::AwaitingCompletion, config.workers);
        let finished = match config.timeout() {
            Some(timeout) => finish.wait_timeout(timeout),
            None => {
                finish.wait();
                true
            }
        };
        let completed = config.workers - finish.count();

        let (verdict, observed_total) = if !finished {
            warn!(
                "{} of {} workers never signaled completion",
                config.workers - completed,
                config.workers
            );
            (Verdict::Timeout, None)
        } else {
            join_workers(handles, &tally);
            if tally.failures() > 0 {
                (Verdict::Failures, None)
            } else {
                let actual_total = counter.value();
                if actual_total == expected_total {
                    (Verdict::Success, Some(actual_total))
                } else {
                    (Verdict::Mismatch, Some(actual_total))
                }
            }
        };
        info!("{}", Phase::Finished(verdict));

        Ok(RunResult {
            config: config.clone(),
            expected_total,
            observed_total,
            failures: tally.failures(),
            faults: tally.take_faults(),
            completed,
            verdict,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Runs `workers` workers, each adding `increment` `repeats` times to one
/// unsynchronized counter.
pub fn run(workers: usize, increment: i64, repeats: u64) -> Result<RunResult, HarnessError> {
    Harness::new(RunConfig::new(workers, increment, repeats)).run()
}

/// Independent runs, each with a fresh counter. Stops at the first
/// orchestrator error.
pub fn run_repeated(config: &RunConfig, runs: usize) -> Result<Vec<RunResult>, HarnessError> {
    let harness = Harness::new(config.clone());
    (0..runs)
        .map(|n| {
            debug!("run {} of {}", n + 1, runs);
            harness.run()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::CounterKind;
    use crate::error::ConfigError;
    use crate::fault::{FaultKind, FaultPlan};
    use std::sync::atomic::AtomicI64;
    use std::sync::Weak;
    use std::time::Duration;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_single_racy_worker_is_exact() {
        init();
        let result = run(1, 7, 1000).unwrap();
        assert_eq!(result.verdict, Verdict::Success);
        assert_eq!(result.expected_total, 7000);
        assert_eq!(result.observed_total, Some(7000));
        assert_eq!(result.completed, 1);
        assert_eq!(result.failures, 0);
    }

    #[test]
    fn test_synchronized_counters_always_succeed() {
        init();
        for kind in [CounterKind::Locked, CounterKind::Atomic] {
            for release in [ReleaseMode::Once, ReleaseMode::PerSpawn] {
                let config = RunConfig::new(32, 7, 5000)
                    .with_counter(kind)
                    .with_release(release);
                let result = Harness::new(config).run().unwrap();
                assert_eq!(result.verdict, Verdict::Success, "{} / {}", kind, release);
                assert_eq!(result.observed_total, Some(32 * 7 * 5000));
                assert_eq!(result.lost_updates(), Some(0));
            }
        }
    }

    #[test]
    fn test_racy_counter_only_loses_updates() {
        init();
        let config = RunConfig::new(32, 7, 5000);
        let result = Harness::new(config).run().unwrap();
        assert!(matches!(result.verdict, Verdict::Success | Verdict::Mismatch));
        let observed = result.observed_total.unwrap();
        assert!(observed > 0);
        assert!(observed <= result.expected_total);
        assert_eq!(result.verdict == Verdict::Success, observed == result.expected_total);
    }

    #[test]
    fn test_injected_errors_yield_failures() {
        init();
        let config = RunConfig::new(10, 7, 100)
            .with_counter(CounterKind::Atomic)
            .with_faults(FaultPlan::new([2, 5], FaultKind::Error, 3));
        let result = Harness::new(config).run().unwrap();
        assert_eq!(result.verdict, Verdict::Failures);
        assert_eq!(result.failures, 2);
        assert_eq!(result.completed, 10);
        assert_eq!(result.observed_total, None);
        assert_eq!(
            result.faults,
            vec![
                FaultRecord {
                    worker: 2,
                    fault: WorkerFault::Injected { worker: 2, iteration: 3 },
                },
                FaultRecord {
                    worker: 5,
                    fault: WorkerFault::Injected { worker: 5, iteration: 3 },
                },
            ]
        );
    }

    #[test]
    fn test_panics_are_captured_per_worker() {
        init();
        let config = RunConfig::new(8, 1, 50)
            .with_faults(FaultPlan::new(0..8, FaultKind::Panic, 10));
        let result = Harness::new(config).run().unwrap();
        assert_eq!(result.verdict, Verdict::Failures);
        assert_eq!(result.failures, 8);
        assert_eq!(result.completed, 8);
        for (worker, record) in result.faults.iter().enumerate() {
            assert_eq!(record.worker, worker);
            match &record.fault {
                WorkerFault::Panicked { message } => assert!(message.contains("injected panic")),
                other => panic!("unexpected fault {:?}", other),
            }
        }
    }

    #[test]
    fn test_random_faults_keep_accounting_exact() {
        init();
        let faults = FaultPlan::random(7, 40, FaultKind::Error, 0, 0xdead_beef).unwrap();
        let config = RunConfig::new(40, 3, 200).with_faults(faults);
        let result = Harness::new(config).run().unwrap();
        assert_eq!(result.verdict, Verdict::Failures);
        assert_eq!(result.failures, 7);
        assert_eq!(result.faults.len(), 7);
        assert_eq!(result.completed, 40);
    }

    #[test]
    fn test_invalid_config_is_rejected_before_spawning() {
        init();
        let err = run(0, 7, 1000).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::InvalidConfig(ConfigError::NonPositive { name: "worker count", .. })
        ));
    }

    struct StuckCounter {
        gate: Arc<Latch>,
    }

    impl Counter for StuckCounter {
        fn add(&self, _amount: i64) {
            self.gate.wait();
        }

        fn value(&self) -> i64 {
            0
        }

        fn kind(&self) -> CounterKind {
            CounterKind::Locked
        }
    }

    #[test]
    fn test_stuck_workers_time_out() {
        init();
        let gate = Arc::new(Latch::new(1));
        let config = RunConfig::new(4, 1, 1).with_timeout(Duration::from_millis(50));
        let result = Harness::new(config)
            .run_with(Arc::new(StuckCounter { gate: Arc::clone(&gate) }))
            .unwrap();
        gate.count_down();
        assert_eq!(result.verdict, Verdict::Timeout);
        assert_eq!(result.completed, 0);
        assert_eq!(result.observed_total, None);
    }

    #[test]
    fn test_run_repeated_uses_fresh_counters() {
        init();
        let config = RunConfig::new(4, 7, 100).with_counter(CounterKind::Atomic);
        let results = run_repeated(&config, 5).unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.observed_total == Some(2800)));
        let summary = Summary::from_results(&results);
        assert_eq!(summary.success, 5);
        assert!(!summary.has_faults());
    }

    /// Records the live reference count of its own allocation at the first add.
    struct FirstAddSpy {
        me: Weak<FirstAddSpy>,
        refs_at_first_add: AtomicUsize,
        total: AtomicI64,
    }

    impl FirstAddSpy {
        fn new() -> Arc<Self> {
            Arc::new_cyclic(|me| FirstAddSpy {
                me: me.clone(),
                refs_at_first_add: AtomicUsize::new(usize::MAX),
                total: AtomicI64::new(0),
            })
        }
    }

    impl Counter for FirstAddSpy {
        fn add(&self, amount: i64) {
            let refs = self.me.strong_count();
            let _ = self.refs_at_first_add.compare_exchange(
                usize::MAX,
                refs,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
            self.total.fetch_add(amount, Ordering::SeqCst);
        }

        fn value(&self) -> i64 {
            self.total.load(Ordering::SeqCst)
        }

        fn kind(&self) -> CounterKind {
            CounterKind::Atomic
        }
    }

    #[test]
    fn test_no_worker_adds_before_every_worker_exists() {
        init();
        let workers = 64;
        for release in [ReleaseMode::Once, ReleaseMode::PerSpawn] {
            for _ in 0..10 {
                let spy = FirstAddSpy::new();
                let config = RunConfig::new(workers, 1, 3).with_release(release);
                let counter: Arc<dyn Counter> = spy.clone();
                let result = Harness::new(config).run_with(counter).unwrap();
                assert_eq!(result.verdict, Verdict::Success);
                // This test's handle, the harness's handle, one per worker.
                assert_eq!(
                    spy.refs_at_first_add.load(Ordering::SeqCst),
                    workers + 2,
                    "{} release",
                    release
                );
            }
        }
    }

    #[test]
    fn test_stray_worker_panic_counts_as_failure() {
        init();
        let tally = Tally::default();
        let handles = vec![
            (0, thread::spawn(|| {})),
            (1, thread::spawn(|| panic!("outside the fault boundary"))),
        ];
        join_workers(handles, &tally);
        assert_eq!(tally.failures(), 1);
        assert_eq!(
            tally.take_faults(),
            vec![FaultRecord {
                worker: 1,
                fault: WorkerFault::Panicked {
                    message: "outside the fault boundary".into()
                },
            }]
        );
    }

    #[test]
    #[ignore = "statistical, depends on available cores"]
    fn test_racy_counter_loses_updates_under_contention() {
        init();
        let config = RunConfig::default();
        let lost = (0..20).any(|_| {
            let result = Harness::new(config.clone()).run().unwrap();
            result.verdict == Verdict::Mismatch
        });
        assert!(lost, "no lost update observed in 20 contended runs");
    }
}
