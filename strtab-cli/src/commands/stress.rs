//! `strtab stress`: intern from many threads and check the table holds up.
//!
//! Each round interns a word set in parallel with heavy overlap between
//! threads, keeps every other word alive, reports the dead count to the
//! table and lets maintenance run. The table is verified after every round.

use std::collections::HashMap;
use std::time::Instant;

use rayon::prelude::*;
use strtab::{HeapString, StartupOptions, StringTable};
use tracing::{debug, info};

use super::start_table;
use crate::config::Config;
use crate::error::{CliError, Result};

#[derive(Debug, Clone, Default)]
pub struct StressArgs {
    pub verbose: bool,
    pub threads: Option<usize>,
    pub words: Option<usize>,
    pub rounds: Option<usize>,
}

/// What a stress run observed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StressReport {
    pub interned: usize,
    pub kept: usize,
    pub reported_dead: usize,
    pub maintenance_passes: usize,
}

pub fn run_stress(args: StressArgs, config: &Config) -> Result<()> {
    let start = Instant::now();
    let threads = args.threads.unwrap_or(config.stress.threads).max(1);
    let words = args.words.unwrap_or(config.stress.words);
    let rounds = args.rounds.unwrap_or(config.stress.rounds);

    let table = start_table(&config.table, StartupOptions::default())?;
    let report = stress_table(&table, threads, words, rounds)?;

    info!(
        "Stress finished: {} interned, {} kept, {} dead reported, {} maintenance passes",
        report.interned, report.kept, report.reported_dead, report.maintenance_passes
    );
    print!("{}", table.dump(false));
    if args.verbose {
        eprintln!(
            "{} threads x {} rounds in {:.2}s",
            threads,
            rounds,
            start.elapsed().as_secs_f64()
        );
    }
    Ok(())
}

/// Drive `rounds` parallel intern rounds against `table`
pub fn stress_table(
    table: &StringTable,
    threads: usize,
    words: usize,
    rounds: usize,
) -> Result<StressReport> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("strtab-stress-{}", i))
        .build()
        .map_err(|e| CliError::Config(format!("Failed to build thread pool: {}", e)))?;

    let mut report = StressReport::default();
    let mut kept: Vec<HeapString> = Vec::new();
    // Each word is interned by several threads at once
    let distinct = (words / 2).max(1);

    for round in 0..rounds {
        let values: Vec<HeapString> = pool.install(|| {
            (0..words)
                .into_par_iter()
                .map(|i| table.intern(&format!("r{}-w{}", round, i % distinct)))
                .collect()
        });
        report.interned += values.len();
        check_canonical(&values)?;

        kept.extend(values.into_iter().filter(|v| v.len() % 2 == 0));
        report.reported_dead += table.storage().report_num_dead();

        while let Some(kind) = table.run_pending_work()? {
            debug!("Round {}: {:?}", round, kind);
            report.maintenance_passes += 1;
        }

        let failures = table.verify_and_compare_entries();
        if failures > 0 {
            return Err(CliError::Verification(format!(
                "{} problems after round {}",
                failures, round
            )));
        }
    }

    for value in &kept {
        match table.lookup(value) {
            Some(found) if HeapString::ptr_eq(&found, value) => {}
            _ => {
                return Err(CliError::Verification(format!(
                    "kept value {:?} is no longer canonical",
                    value.as_str()
                )))
            }
        }
    }
    report.kept = kept.len();
    Ok(report)
}

fn check_canonical(values: &[HeapString]) -> Result<()> {
    let mut first: HashMap<&str, &HeapString> = HashMap::new();
    for v in values {
        let canonical = first.entry(v.as_str()).or_insert(v);
        if !HeapString::ptr_eq(canonical, v) {
            return Err(CliError::Verification(format!(
                "two objects for {:?}",
                v.as_str()
            )));
        }
    }
    Ok(())
}
