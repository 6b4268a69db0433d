//! Subcommand implementations for the strtab CLI.

pub mod archive;
pub mod dump;
pub mod stress;

pub use archive::{run_archive, ArchiveArgs};
pub use dump::{run_dump, DumpArgs};
pub use stress::{run_stress, StressArgs};

use strtab::{StartupOptions, StringTable, TableConfig};

use crate::error::Result;

/// Start a table for a one-shot command
///
/// Maintenance runs inline; a short-lived process has no use for the
/// service thread.
pub(crate) fn start_table(config: &TableConfig, options: StartupOptions) -> Result<StringTable> {
    let config = TableConfig {
        background_maintenance: false,
        ..config.clone()
    };
    Ok(StringTable::init(config, options)?)
}

/// Whitespace-separated words from every argument
pub(crate) fn split_words(args: &[String]) -> impl Iterator<Item = &str> {
    args.iter().flat_map(|a| a.split_whitespace())
}
