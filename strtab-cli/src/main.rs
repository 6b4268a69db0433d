//! strtab CLI - build, inspect and exercise string tables.
//!
//! Parses arguments with clap, installs a tracing subscriber (which also
//! collects the table's `log` records) and dispatches to a subcommand.

mod commands;
mod config;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{
    archive::{run_archive, ArchiveArgs},
    dump::{run_dump, DumpArgs},
    stress::{run_stress, StressArgs},
};
use config::Config;
use error::{CliError, Result};

/// strtab - concurrent weak string table tooling
#[derive(Parser, Debug)]
#[command(name = "strtab")]
#[command(author = "Strtab Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build, inspect and stress concurrent string tables", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, env = "STRTAB_CLI_VERBOSE")]
    verbose: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "STRTAB_CONFIG")]
    config: Option<PathBuf>,

    /// Disable color output
    #[arg(long, global = true, env = "STRTAB_NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a snapshot image containing the given words
    Archive(ArchiveCommand),

    /// Print a table's strings or statistics
    ///
    /// Optionally starts from a snapshot image, which is mapped (and kept
    /// as an overlay) with --map or loaded and transferred otherwise.
    Dump(DumpCommand),

    /// Intern from many threads and verify the table afterwards
    Stress(StressCommand),
}

#[derive(Parser, Debug)]
struct ArchiveCommand {
    /// Words to archive (whitespace-separated within each argument)
    words: Vec<String>,

    /// Read further words from a file
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output image path
    #[arg(short, long)]
    output: PathBuf,

    /// Store record indices rather than heap offsets
    #[arg(long)]
    narrow: bool,
}

#[derive(Parser, Debug)]
struct DumpCommand {
    /// Words to intern before dumping
    words: Vec<String>,

    /// Snapshot image to start from
    #[arg(short, long)]
    snapshot: Option<PathBuf>,

    /// Map the snapshot file instead of loading it
    #[arg(long, requires = "snapshot")]
    map: bool,

    /// Print every string instead of statistics
    #[arg(short, long)]
    all: bool,

    /// Print statistics and diagnostics as JSON
    #[arg(long, conflicts_with = "all")]
    json: bool,
}

#[derive(Parser, Debug)]
struct StressCommand {
    /// Worker threads (default: from config, else CPU count)
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    threads: Option<u16>,

    /// Strings interned per round
    #[arg(short, long)]
    words: Option<usize>,

    /// Rounds to run
    #[arg(short, long)]
    rounds: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.no_color)?;
    let config = load_config(cli.config.as_deref())?;

    execute_command(cli.command, cli.verbose, &config)?;
    Ok(())
}

fn init_logging(verbose: bool, no_color: bool) -> Result<()> {
    let filter = EnvFilter::try_from_env("STRTAB_LOG").unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    let subscriber = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(!no_color)
        .with_target(false)
        .with_thread_names(verbose);

    tracing_subscriber::registry()
        .with(filter)
        .with(subscriber)
        .try_init()
        .map_err(|e| CliError::Config(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

fn load_config(config_path: Option<&std::path::Path>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
}

fn execute_command(command: Commands, verbose: bool, config: &Config) -> Result<()> {
    let verbose = verbose || config.verbose;
    match command {
        Commands::Archive(args) => run_archive(
            ArchiveArgs {
                verbose,
                words: args.words,
                input: args.input,
                output: args.output,
                narrow: args.narrow,
            },
            config,
        ),
        Commands::Dump(args) => run_dump(
            DumpArgs {
                verbose,
                snapshot: args.snapshot,
                map: args.map,
                all: args.all,
                json: args.json,
                words: args.words,
            },
            config,
        ),
        Commands::Stress(args) => run_stress(
            StressArgs {
                verbose,
                threads: args.threads.map(usize::from),
                words: args.words,
                rounds: args.rounds,
            },
            config,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_archive() {
        let cli = Cli::parse_from(["strtab", "archive", "a", "b c", "-o", "out.stra"]);
        if let Commands::Archive(args) = cli.command {
            assert_eq!(args.words, vec!["a", "b c"]);
            assert_eq!(args.output, PathBuf::from("out.stra"));
            assert!(!args.narrow);
        } else {
            panic!("Expected Archive command");
        }
    }

    #[test]
    fn test_cli_archive_requires_output() {
        assert!(Cli::try_parse_from(["strtab", "archive", "a"]).is_err());
    }

    #[test]
    fn test_cli_parse_dump_flags() {
        let cli = Cli::parse_from(["strtab", "dump", "--snapshot", "s.stra", "--map", "--all"]);
        if let Commands::Dump(args) = cli.command {
            assert_eq!(args.snapshot, Some(PathBuf::from("s.stra")));
            assert!(args.map);
            assert!(args.all);
            assert!(!args.json);
        } else {
            panic!("Expected Dump command");
        }
    }

    #[test]
    fn test_cli_map_requires_snapshot() {
        assert!(Cli::try_parse_from(["strtab", "dump", "--map"]).is_err());
    }

    #[test]
    fn test_cli_json_conflicts_with_all() {
        assert!(Cli::try_parse_from(["strtab", "dump", "--all", "--json"]).is_err());
    }

    #[test]
    fn test_cli_parse_stress() {
        let cli = Cli::parse_from(["strtab", "stress", "--threads", "3", "--rounds", "2"]);
        if let Commands::Stress(args) = cli.command {
            assert_eq!(args.threads, Some(3));
            assert_eq!(args.rounds, Some(2));
            assert_eq!(args.words, None);
        } else {
            panic!("Expected Stress command");
        }
    }

    #[test]
    fn test_cli_stress_rejects_zero_threads() {
        assert!(Cli::try_parse_from(["strtab", "stress", "--threads", "0"]).is_err());
    }

    #[test]
    fn test_cli_parse_global_flags() {
        let cli = Cli::parse_from(["strtab", "--verbose", "--no-color", "stress"]);
        assert!(cli.verbose);
        assert!(cli.no_color);
    }
}
