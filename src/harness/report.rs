//! Results of harness runs and their human-readable rendering.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::fault::FaultRecord;

const BANNER: &str = "********************************************";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Observed total equals the expected total.
    Success,
    /// Observed total differs: updates were lost.
    Mismatch,
    /// At least one worker faulted, the observed total is meaningless.
    Failures,
    /// Not every worker signaled completion in time.
    Timeout,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verdict::Success => "SUCCESS",
            Verdict::Mismatch => "MISMATCH",
            Verdict::Failures => "FAILURES",
            Verdict::Timeout => "TIMEOUT",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunResult {
    pub config: RunConfig,
    pub expected_total: i64,
    /// Only present when every worker finished without a fault.
    pub observed_total: Option<i64>,
    pub failures: usize,
    pub faults: Vec<FaultRecord>,
    /// Workers that signaled completion before the harness stopped waiting.
    pub completed: usize,
    pub verdict: Verdict,
    pub elapsed_ms: u64,
}

impl RunResult {
    /// Updates lost to the race, when the total was observed.
    pub fn lost_updates(&self) -> Option<i64> {
        self.observed_total.map(|observed| self.expected_total - observed)
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.verdict {
            Verdict::Failures => {
                writeln!(f, "{}", BANNER)?;
                writeln!(f, "FAILURES: {}", self.failures)?;
                for record in &self.faults {
                    writeln!(f, "  worker {}: {}", record.worker, record.fault)?;
                }
                write!(f, "{}", BANNER)
            }
            Verdict::Timeout => write!(
                f,
                "TIMEOUT after {} ms: {} of {} workers completed, {} failed",
                self.config.timeout_ms.unwrap_or_default(),
                self.completed,
                self.config.workers,
                self.failures
            ),
            Verdict::Success => write!(
                f,
                "SUCCESS ({} counter, total {})",
                self.config.counter, self.expected_total
            ),
            Verdict::Mismatch => write!(
                f,
                "MISMATCH ({} counter) expected count to be {} but was {}, {} lost",
                self.config.counter,
                self.expected_total,
                self.observed_total.unwrap_or_default(),
                self.lost_updates().unwrap_or_default()
            ),
        }
    }
}

/// Verdict tally over repeated runs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub runs: usize,
    pub success: usize,
    pub mismatch: usize,
    pub failures: usize,
    pub timeout: usize,
    pub max_lost_updates: i64,
}

impl Summary {
    pub fn from_results(results: &[RunResult]) -> Self {
        let mut summary = Summary {
            runs: results.len(),
            ..Default::default()
        };
        for result in results {
            match result.verdict {
                Verdict::Success => summary.success += 1,
                Verdict::Mismatch => summary.mismatch += 1,
                Verdict::Failures => summary.failures += 1,
                Verdict::Timeout => summary.timeout += 1,
            }
            if let Some(lost) = result.lost_updates() {
                summary.max_lost_updates = summary.max_lost_updates.max(lost);
            }
        }
        summary
    }

    /// True when any run faulted or hung.
    pub fn has_faults(&self) -> bool {
        self.failures > 0 || self.timeout > 0
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} runs: {{ success: {}, mismatch: {}, failures: {}, timeout: {} }}, most updates lost in one run: {}",
            self.runs, self.success, self.mismatch, self.failures, self.timeout, self.max_lost_updates
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::WorkerFault;

    fn result(verdict: Verdict, observed: Option<i64>) -> RunResult {
        RunResult {
            config: RunConfig::new(2, 7, 10),
            expected_total: 140,
            observed_total: observed,
            failures: 0,
            faults: vec![],
            completed: 2,
            verdict,
            elapsed_ms: 0,
        }
    }

    #[test]
    fn test_lost_updates() {
        assert_eq!(result(Verdict::Mismatch, Some(126)).lost_updates(), Some(14));
        assert_eq!(result(Verdict::Success, Some(140)).lost_updates(), Some(0));
        assert_eq!(result(Verdict::Failures, None).lost_updates(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            result(Verdict::Mismatch, Some(126)).to_string(),
            "MISMATCH (racy counter) expected count to be 140 but was 126, 14 lost"
        );
        let mut failed = result(Verdict::Failures, None);
        failed.failures = 1;
        failed.faults.push(FaultRecord {
            worker: 1,
            fault: WorkerFault::Injected { worker: 1, iteration: 3 },
        });
        let text = failed.to_string();
        assert!(text.contains("FAILURES: 1"));
        assert!(text.contains("worker 1: injected fault in worker 1 after 3 increments"));
    }

    #[test]
    fn test_summary() {
        let results = vec![
            result(Verdict::Success, Some(140)),
            result(Verdict::Mismatch, Some(112)),
            result(Verdict::Mismatch, Some(133)),
            result(Verdict::Failures, None),
        ];
        let summary = Summary::from_results(&results);
        assert_eq!(
            summary,
            Summary {
                runs: 4,
                success: 1,
                mismatch: 2,
                failures: 1,
                timeout: 0,
                max_lost_updates: 28,
            }
        );
        assert!(summary.has_faults());
    }

    #[test]
    fn test_verdict_serializes_upper_case() {
        assert_eq!(serde_json::to_string(&Verdict::Mismatch).unwrap(), "\"MISMATCH\"");
    }
}
