//! `strtab dump`: print the contents or shape of a table.

use std::path::PathBuf;

use serde_json::{json, Map, Value};
use strtab::{ArchiveImage, HeapString, StartupOptions, StringTable};
use tracing::debug;

use super::{split_words, start_table};
use crate::config::Config;
use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct DumpArgs {
    pub verbose: bool,
    /// Snapshot to serve as the overlay.
    pub snapshot: Option<PathBuf>,
    /// Map the snapshot instead of loading it, keeping the overlay.
    pub map: bool,
    /// Print every string rather than statistics.
    pub all: bool,
    pub json: bool,
    /// Words to intern before dumping.
    pub words: Vec<String>,
}

pub fn run_dump(args: DumpArgs, config: &Config) -> Result<()> {
    let out = render_dump(&args, config)?;
    print!("{}", out);
    if args.verbose {
        eprintln!("Dumped {} lines", out.lines().count());
    }
    Ok(())
}

/// Build the table described by `args` and render its dump
pub fn render_dump(args: &DumpArgs, config: &Config) -> Result<String> {
    let snapshot = match &args.snapshot {
        Some(path) if args.map => Some(ArchiveImage::map_file(path)?),
        Some(path) => Some(ArchiveImage::load_file(path)?),
        None => None,
    };
    if let Some(image) = &snapshot {
        debug!("Snapshot with {} entries", image.entries().len());
    }

    let table = start_table(
        &config.table,
        StartupOptions {
            snapshot,
            ..Default::default()
        },
    )?;
    let _held: Vec<HeapString> = split_words(&args.words).map(|w| table.intern(w)).collect();

    if args.json {
        let mut out = serde_json::to_string_pretty(&json_report(&table)?)?;
        out.push('\n');
        return Ok(out);
    }
    Ok(table.dump(args.all))
}

fn json_report(table: &StringTable) -> Result<Value> {
    let diagnostics: Map<String, Value> = table
        .diagnostics()
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();

    Ok(json!({
        "table": serde_json::to_value(table.statistics())?,
        "overlay": serde_json::to_value(table.overlay_statistics())?,
        "diagnostics": diagnostics,
    }))
}
