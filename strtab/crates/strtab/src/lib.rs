//! # strtab - Concurrent Weak String Interning
//!
//! Maps string content to one shared instance. The table holds its strings
//! weakly: once nothing else refers to a canonical string it dies, and the
//! slot pointing at it is reaped by background maintenance.
//!
//! ## Overview
//!
//! - **Lock-free reads**: lookups never block, even while the table is
//!   being resized or rehashed
//! - **Per-bucket writers**: inserts contend only on their own bucket
//! - **Incremental maintenance**: grow, bulk delete and rehash run in
//!   chunks with pause points between them
//! - **Hash-flood defense**: a chain longer than the alarm length moves the
//!   table to a randomly seeded hash, once
//! - **Snapshot overlay**: a read-only table loaded from a prebuilt image is
//!   probed first
//!
//! ## Quick Start
//!
//! ```rust
//! use strtab::{HeapString, StartupOptions, StringTable, TableConfig};
//!
//! fn main() -> Result<(), strtab::StrtabError> {
//!     let config = TableConfig {
//!         initial_size: 1024,
//!         ..Default::default()
//!     };
//!     let table = StringTable::init(config, StartupOptions::default())?;
//!
//!     let a = table.intern("main");
//!     let b = table.intern(&String::from("main"));
//!     assert!(HeapString::ptr_eq(&a, &b));
//!
//!     table.shutdown()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Mutator Threads                       │
//! │   intern / lookup                                         │
//! │        │                                                  │
//! │        ▼                                                  │
//! │  ┌───────────────┐  miss   ┌───────────────────────────┐  │
//! │  │ Overlay table │ ──────▶ │ InternTable (ArcSwap'd    │  │
//! │  │ (snapshot)    │         │ bucket array, weak slots) │  │
//! │  └───────────────┘         └─────────────┬─────────────┘  │
//! └──────────────────────────────────────────┼────────────────┘
//!                            chain alarm      │  dead counts
//!                                  ▼          ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                 strtab-service thread                     │
//! │  RehashGuard ──▶ IncrementalTask::rehash                  │
//! │  MaintenanceCoordinator ──▶ IncrementalTask::grow         │
//! │                         └─▶ IncrementalTask::bulk_delete  │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod archive;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod heap;
pub mod logging;
pub mod overlay;
pub mod pause;
pub mod rehash;
pub mod service;
pub mod stats;
pub mod table;
pub mod weak;

pub use archive::{ArchiveImage, ArchiveWriter, HeapMapping, RefEncoding};
pub use config::{ConfigError, TableConfig};
pub use coordinator::{MaintenanceCoordinator, WorkKind};
pub use error::{Result, StrtabError};
pub use heap::HeapString;
pub use logging::{EventRecord, TableEvent, TableLogger, TableLoggerConfig};
pub use overlay::{ArchiveOverlayTable, OverlayStatistics};
pub use pause::{NoPause, PauseHook, Safepoint};
pub use rehash::{RehashGuard, RehashOutcome};
pub use service::{ServiceState, StartupOptions, StringTable};
pub use stats::TableStatistics;
pub use table::{InternTable, LookupKey, WeakSlot};
pub use weak::{WeakHandle, WeakStorage};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(TableConfig::default().validate().is_ok());
    }
}
