//! Command-line options of the `lostupdate` binary.
use std::ffi::OsString;
use std::time::Duration;

use clap::{Arg, ArgMatches, Command};

use crate::config::{ReleaseMode, RunConfig};
use crate::counter::CounterKind;
use crate::error::ConfigError;
use crate::fault::{FaultKind, FaultPlan};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub workers: usize,
    pub increment: i64,
    pub repeats: u64,
    pub counter: CounterKind,
    pub release: ReleaseMode,
    pub runs: usize,
    pub timeout_ms: Option<u64>,
    pub inject_faults: usize,
    pub fault_kind: FaultKind,
    pub fault_at: u64,
    /// Seeds fault placement. Drawn at random when not given.
    pub seed: u64,
    pub json: bool,
}

fn command() -> Command<'static> {
    Command::new("lostupdate")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Races worker threads on one shared counter and checks the total")
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .value_name("N")
                .takes_value(true)
                .default_value("1000")
                .help("Number of worker threads"),
        )
        .arg(
            Arg::new("increment")
                .short('i')
                .long("increment")
                .value_name("N")
                .takes_value(true)
                .default_value("7")
                .help("Amount each add contributes"),
        )
        .arg(
            Arg::new("repeats")
                .short('r')
                .long("repeats")
                .value_name("N")
                .takes_value(true)
                .default_value("1000")
                .help("Adds per worker"),
        )
        .arg(
            Arg::new("counter")
                .short('c')
                .long("counter")
                .takes_value(true)
                .possible_values(CounterKind::ALL)
                .default_value("racy")
                .help("Counter implementation"),
        )
        .arg(
            Arg::new("release")
                .long("release")
                .takes_value(true)
                .possible_values(["once", "per-spawn"])
                .default_value("once")
                .help("Start gate countdown; either way it opens after the last spawn"),
        )
        .arg(
            Arg::new("runs")
                .short('n')
                .long("runs")
                .value_name("N")
                .takes_value(true)
                .default_value("1")
                .help("Independent runs, each with a fresh counter"),
        )
        .arg(
            Arg::new("timeout-ms")
                .long("timeout-ms")
                .value_name("MS")
                .takes_value(true)
                .help("Give up waiting for workers after this many milliseconds"),
        )
        .arg(
            Arg::new("inject-faults")
                .long("inject-faults")
                .value_name("N")
                .takes_value(true)
                .default_value("0")
                .help("Number of randomly chosen workers that fault"),
        )
        .arg(
            Arg::new("fault-kind")
                .long("fault-kind")
                .takes_value(true)
                .possible_values(["error", "panic"])
                .default_value("error")
                .help("How injected faults surface"),
        )
        .arg(
            Arg::new("fault-at")
                .long("fault-at")
                .value_name("ITERATION")
                .takes_value(true)
                .default_value("0")
                .help("Adds a faulty worker completes before faulting"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .takes_value(true)
                .help("Seed for fault placement"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print results as JSON"),
        )
}

impl Options {
    pub fn parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = command().try_get_matches_from(args)?;
        Self::from_matches(&matches)
    }

    fn from_matches(matches: &ArgMatches) -> Result<Self, clap::Error> {
        let timeout_ms = if matches.is_present("timeout-ms") {
            Some(matches.value_of_t("timeout-ms")?)
        } else {
            None
        };
        let seed = if matches.is_present("seed") {
            matches.value_of_t("seed")?
        } else {
            rand::random()
        };
        Ok(Options {
            workers: matches.value_of_t("workers")?,
            increment: matches.value_of_t("increment")?,
            repeats: matches.value_of_t("repeats")?,
            counter: matches.value_of_t("counter")?,
            release: matches.value_of_t("release")?,
            runs: matches.value_of_t("runs")?,
            timeout_ms,
            inject_faults: matches.value_of_t("inject-faults")?,
            fault_kind: matches.value_of_t("fault-kind")?,
            fault_at: matches.value_of_t("fault-at")?,
            seed,
            json: matches.is_present("json"),
        })
    }

    /// The configuration every run uses. Fault placement is drawn once from
    /// the seed and shared by all runs.
    pub fn run_config(&self) -> Result<RunConfig, ConfigError> {
        if self.runs == 0 {
            return Err(ConfigError::NonPositive {
                name: "run count",
                value: 0,
            });
        }
        let faults = if self.inject_faults > 0 {
            FaultPlan::random(
                self.inject_faults,
                self.workers,
                self.fault_kind,
                self.fault_at,
                self.seed,
            )?
        } else {
            FaultPlan::none()
        };
        let mut config = RunConfig::new(self.workers, self.increment, self.repeats)
            .with_counter(self.counter)
            .with_release(self.release)
            .with_faults(faults);
        if let Some(ms) = self.timeout_ms {
            config = config.with_timeout(Duration::from_millis(ms));
        }
        config.validate()?;
        Ok(config)
    }
}
