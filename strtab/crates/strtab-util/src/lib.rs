//! strtab-util - Hashing and Text Utilities for the String Table
//!
//! ============================================================================
//! MODULE OVERVIEW
//! ============================================================================
//!
//! Foundation pieces shared by the table, the snapshot codec and the CLI:
//!
//! - [`hash`] - the default string hash, the seeded alternate hash used after
//!   a defensive rehash, and the [`HashEpoch`] that picks between them.
//! - [`text`] - escaping for the verbose text dump.
//!
//! HASH EPOCHS:
//! ------------
//! ```text
//!   Default ──(chain alarm, rehash)──▶ Alternate(seed)
//!      │                                    │
//!      ▼                                    ▼
//!   java_hash(s)                       alt_hash(seed, s)
//! ```
//!
//! A table lives in exactly one epoch for its whole lifetime. Changing the
//! epoch means building a new table and migrating every slot into it.
//!
//! The default hash is stable across processes so snapshots can store it;
//! the alternate hash is process-local and never written to a snapshot.

pub mod hash;
pub mod text;

pub use hash::{alt_hash, java_hash, AltHashSeed, HashEpoch};
pub use text::{dump_line, put_utf8};
