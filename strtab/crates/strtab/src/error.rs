//! Error Module - String Table Error Types
//!
//! # Error Categories
//!
//! ## Startup Errors
//! - `Configuration` - Invalid table configuration
//! - `MalformedSnapshot` - Snapshot image failed validation
//! - `Io` - Snapshot file could not be read or mapped
//!
//! ## Build-time Errors
//! - `SnapshotTooLarge` - Snapshot heap region exceeds 32-bit offsets
//!
//! ## Internal Errors
//! - `InvalidState` - Incremental task driven out of order
//! - `Internal` - Broken internal invariant
//!
//! Losing an insert race, a task that cannot start, a dead slot met during
//! lookup and an over-long chain are all ordinary outcomes and never surface
//! as errors. Only two conditions are fatal: running out of memory while
//! creating slot storage (the global allocator aborts) and a snapshot that
//! cannot be decoded while it is being transferred into the table, which
//! goes through [`fatal`].

use crate::config::ConfigError;
use thiserror::Error;

/// Main error type for all string table operations
///
/// # Examples
///
/// ```rust
/// use strtab::error::StrtabError;
///
/// fn describe(err: &StrtabError) -> &'static str {
///     match err {
///         StrtabError::MalformedSnapshot(_) => "rebuild the snapshot",
///         StrtabError::Configuration(_) => "fix the configuration",
///         _ => "report a bug",
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum StrtabError {
    /// Invalid configuration
    ///
    /// **When returned:** `StringTable::init` with a config that fails
    /// `TableConfig::validate`
    ///
    /// **Recovery strategy:** Correct the parameter and re-initialize
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Snapshot image failed validation
    ///
    /// **When returned:** Bad magic, unsupported version, truncated regions,
    /// unsorted entries or an entry that does not decode
    ///
    /// **Recovery strategy:** Start without an overlay or rebuild the snapshot
    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// Snapshot heap region does not fit 32-bit offsets
    ///
    /// **When returned:** `ArchiveWriter::finish` with too much string data
    ///
    /// **Recovery strategy:** Archive fewer strings
    #[error("Snapshot too large: heap region of {bytes} bytes exceeds the 32-bit offset range")]
    SnapshotTooLarge { bytes: usize },

    /// Incremental task driven in the wrong order
    ///
    /// **When returned:** e.g. `do_chunk` before `prepare`, `commit` twice
    ///
    /// **Recovery strategy:** None, this is a caller bug
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Snapshot file I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal invariant violated
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StrtabError {
    /// Whether the caller can reasonably carry on after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StrtabError::MalformedSnapshot(_) | StrtabError::Io(_) | StrtabError::SnapshotTooLarge { .. }
        )
    }

    /// Whether this error indicates a bug in the table itself
    pub fn is_bug(&self) -> bool {
        matches!(self, StrtabError::InvalidState { .. } | StrtabError::Internal(_))
    }
}

pub type Result<T> = std::result::Result<T, StrtabError>;

/// Return a `MalformedSnapshot` error built from a format string
#[macro_export]
macro_rules! malformed {
    ($($arg:tt)*) => {
        return Err($crate::error::StrtabError::MalformedSnapshot(format!($($arg)*)))
    };
}

/// Log and abort the process
///
/// Reserved for states the table cannot continue from.
#[cold]
pub fn fatal(msg: &str) -> ! {
    log::error!("fatal: {}", msg);
    std::process::abort()
}
