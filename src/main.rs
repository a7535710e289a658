//! `lostupdate [options]` runs the counter race and reports the verdict.
//! Logging is controlled by `LOSTUPDATE_LOG`, e.g. `LOSTUPDATE_LOG=debug`
//! shows every worker's lifecycle.
use anyhow::{bail, Context, Result};
use env_logger::Env;
use log::info;
use serde::Serialize;

use lostupdate::options::Options;
use lostupdate::{run_repeated, RunResult, Summary};

#[derive(Serialize)]
struct JsonReport<'a> {
    seed: u64,
    results: &'a [RunResult],
    summary: &'a Summary,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().filter_or("LOSTUPDATE_LOG", "warn")).init();
    let options = Options::parse_from(std::env::args_os()).unwrap_or_else(|e| e.exit());
    let config = options
        .run_config()
        .context("invalid run configuration")?;
    if !config.faults.is_empty() {
        info!("fault placement seed {}", options.seed);
    }

    let results = run_repeated(&config, options.runs)?;
    let summary = Summary::from_results(&results);

    if options.json {
        let report = JsonReport {
            seed: options.seed,
            results: &results,
            summary: &summary,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (n, result) in results.iter().enumerate() {
            if results.len() > 1 {
                println!("run {}: {}", n + 1, result);
            } else {
                println!("{}", result);
            }
        }
        if results.len() > 1 {
            println!("{}", summary);
        }
    }

    if summary.has_faults() {
        bail!(
            "{} of {} runs ended with worker failures or timeouts",
            summary.failures + summary.timeout,
            summary.runs
        );
    }
    Ok(())
}
