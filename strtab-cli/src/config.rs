//! Configuration for the strtab CLI.
//!
//! Read from `strtab.toml`. The `[table]` section maps directly onto
//! [`strtab::TableConfig`]; `[stress]` holds defaults for the stress command.

use dirs::{config_dir, home_dir};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strtab::TableConfig;

use crate::error::{CliError, Result};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "strtab.toml";

/// Fallback when the CPU count does not fit.
const DEFAULT_THREAD_COUNT: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub table: TableConfig,

    #[serde(default)]
    pub stress: StressConfig,
}

/// Defaults for `strtab stress`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StressConfig {
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Strings interned per round.
    #[serde(default = "default_words")]
    pub words: usize,

    #[serde(default = "default_rounds")]
    pub rounds: usize,
}

fn default_threads() -> usize {
    match num_cpus::get() {
        0 => DEFAULT_THREAD_COUNT,
        n => n,
    }
}

fn default_words() -> usize {
    10_000
}

fn default_rounds() -> usize {
    4
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbose: false,
            table: TableConfig::from_env(),
            stress: StressConfig::default(),
        }
    }
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            words: default_words(),
            rounds: default_rounds(),
        }
    }
}

impl Config {
    /// Load from the first `strtab.toml` found.
    ///
    /// Looks in the current directory, then `~/.config/strtab/`, then the
    /// system configuration directory. Without a file the table settings
    /// come from `STRTAB_*` environment variables.
    pub fn load() -> Result<Self> {
        match Self::find_config_file() {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CliError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| CliError::Config(format!("Failed to parse configuration: {}", e)))?;

        config
            .table
            .validate()
            .map_err(|e| CliError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    fn check_current_dir_config() -> Option<PathBuf> {
        let path = PathBuf::from(CONFIG_FILE_NAME);
        path.exists().then_some(path)
    }

    fn check_home_config() -> Option<PathBuf> {
        home_dir()
            .map(|dir| dir.join(".config").join("strtab").join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    }

    fn check_system_config() -> Option<PathBuf> {
        config_dir()
            .map(|dir| dir.join("strtab").join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    }

    fn find_config_file() -> Option<PathBuf> {
        Self::check_current_dir_config()
            .or_else(Self::check_home_config)
            .or_else(Self::check_system_config)
    }
}
