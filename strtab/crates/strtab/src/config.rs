//! Configuration Module - String Table Tuning Parameters
//!
//! The policy constants below are the defaults; everything is overridable
//! per table so tests can start tiny tables and force growth or rehashing.

use serde::{Deserialize, Serialize};

/// Preferred average chain length; loads above this trigger growth
pub const PREF_AVG_LIST_LEN: f64 = 2.0;

/// log2 of the maximum bucket count
pub const END_SIZE: u32 = 24;

/// A bucket scan longer than this raises the rehash alarm
pub const REHASH_LEN: usize = 100;

/// Dead-slot density above which a cleaning pass is requested
pub const CLEAN_DEAD_HIGH_WATER_MARK: f64 = 0.5;

/// Default initial bucket count
pub const DEFAULT_TABLE_SIZE: usize = 65536;

/// Buckets processed per incremental task chunk
pub const DEFAULT_CHUNK_BUCKETS: usize = 4096;

/// Hard ceiling for `max_size_log2`
pub const MAX_SIZE_LOG2_LIMIT: u32 = 30;

/// Main configuration for a string table
///
/// # Examples
///
/// ```rust
/// use strtab::TableConfig;
///
/// // A tiny table that grows quickly
/// let config = TableConfig {
///     initial_size: 16,
///     background_maintenance: false,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// assert_eq!(config.initial_size_log2(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Initial bucket count, rounded up to a power of two
    pub initial_size: usize,

    /// log2 of the largest bucket count growth may reach
    pub max_size_log2: u32,

    /// Chain length that raises the rehash alarm
    pub rehash_chain_len: usize,

    /// Average chain length above which the table grows
    pub preferred_avg_chain_len: f64,

    /// Dead entries per bucket above which a cleaning pass runs
    pub clean_dead_high_water_mark: f64,

    /// Buckets per incremental task chunk
    pub task_chunk_buckets: usize,

    /// Run maintenance on a dedicated `strtab-service` thread
    ///
    /// When disabled, requested work runs only through
    /// `StringTable::run_pending_work`.
    pub background_maintenance: bool,

    /// Echo table events to the log at info level
    pub verbose: bool,

    /// Render recorded events as JSON
    pub json_events: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            // Sizing
            initial_size: DEFAULT_TABLE_SIZE,
            max_size_log2: END_SIZE,

            // Maintenance policy
            rehash_chain_len: REHASH_LEN,
            preferred_avg_chain_len: PREF_AVG_LIST_LEN,
            clean_dead_high_water_mark: CLEAN_DEAD_HIGH_WATER_MARK,
            task_chunk_buckets: DEFAULT_CHUNK_BUCKETS,
            background_maintenance: true,

            // Logging
            verbose: false,
            json_events: false,
        }
    }
}

impl TableConfig {
    /// log2 of `initial_size` rounded up to a power of two
    pub fn initial_size_log2(&self) -> u32 {
        self.initial_size.max(1).next_power_of_two().trailing_zeros()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_size == 0 {
            return Err(ConfigError::InvalidSize(
                "initial_size must be > 0".to_string(),
            ));
        }

        if self.max_size_log2 > MAX_SIZE_LOG2_LIMIT {
            return Err(ConfigError::InvalidSize(format!(
                "max_size_log2 must be <= {}",
                MAX_SIZE_LOG2_LIMIT
            )));
        }

        if self.initial_size_log2() > self.max_size_log2 {
            return Err(ConfigError::InvalidSize(
                "initial_size cannot exceed 2^max_size_log2".to_string(),
            ));
        }

        if self.rehash_chain_len == 0 {
            return Err(ConfigError::InvalidThreshold(
                "rehash_chain_len must be > 0".to_string(),
            ));
        }

        if !(self.preferred_avg_chain_len > 0.0) {
            return Err(ConfigError::InvalidThreshold(
                "preferred_avg_chain_len must be > 0".to_string(),
            ));
        }

        if !(self.clean_dead_high_water_mark > 0.0) {
            return Err(ConfigError::InvalidThreshold(
                "clean_dead_high_water_mark must be > 0".to_string(),
            ));
        }

        if self.task_chunk_buckets == 0 {
            return Err(ConfigError::InvalidChunk(
                "task_chunk_buckets must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Create configuration from environment variables
    ///
    /// Reads `STRTAB_SIZE`, `STRTAB_MAX_SIZE_LOG2`, `STRTAB_CHUNK_BUCKETS`,
    /// `STRTAB_BACKGROUND` and `STRTAB_VERBOSE`. Unparseable values are
    /// ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("STRTAB_SIZE") {
            if let Ok(size) = val.parse::<usize>() {
                config.initial_size = size;
            }
        }

        if let Ok(val) = std::env::var("STRTAB_MAX_SIZE_LOG2") {
            if let Ok(log2) = val.parse::<u32>() {
                config.max_size_log2 = log2;
            }
        }

        if let Ok(val) = std::env::var("STRTAB_CHUNK_BUCKETS") {
            if let Ok(chunk) = val.parse::<usize>() {
                config.task_chunk_buckets = chunk;
            }
        }

        if let Ok(val) = std::env::var("STRTAB_BACKGROUND") {
            config.background_maintenance = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("STRTAB_VERBOSE") {
            config.verbose = parse_flag(&val);
        }

        config
    }
}

fn parse_flag(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid table size: {0}")]
    InvalidSize(String),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Invalid chunk size: {0}")]
    InvalidChunk(String),
}
