//! `strtab archive`: build a snapshot image from words.

use std::path::PathBuf;
use std::time::Instant;

use strtab::{HeapString, RefEncoding, StartupOptions};
use tracing::{debug, info};

use super::{split_words, start_table};
use crate::config::Config;
use crate::error::{CliError, Result};

#[derive(Debug, Clone, Default)]
pub struct ArchiveArgs {
    pub verbose: bool,
    /// Words to archive; each argument may hold several.
    pub words: Vec<String>,
    /// File with more whitespace-separated words.
    pub input: Option<PathBuf>,
    pub output: PathBuf,
    /// Store record indices instead of heap offsets.
    pub narrow: bool,
}

pub fn run_archive(args: ArchiveArgs, config: &Config) -> Result<()> {
    let start = Instant::now();

    let mut words = args.words.clone();
    if let Some(input) = &args.input {
        debug!("Reading words from {}", input.display());
        words.push(std::fs::read_to_string(input)?);
    }

    let table = start_table(&config.table, StartupOptions::default())?;
    let held: Vec<HeapString> = split_words(&words).map(|w| table.intern(w)).collect();
    if held.is_empty() {
        return Err(CliError::Validation("no words to archive".to_string()));
    }

    let encoding = if args.narrow {
        RefEncoding::Narrow
    } else {
        RefEncoding::Offset
    };
    let image = table.write_archive(encoding)?;
    std::fs::write(&args.output, &image)?;

    let distinct = table.table().item_count();
    info!(
        "Archived {} strings ({} bytes) to {}",
        distinct,
        image.len(),
        args.output.display()
    );
    if args.verbose {
        eprintln!(
            "Archived {} distinct of {} words in {:.2}s",
            distinct,
            held.len(),
            start.elapsed().as_secs_f64()
        );
    }
    Ok(())
}
