//! Test utilities for the string table suite
//!
//! Fixtures build a service with an explicit configuration so that every
//! threshold a test relies on is visible at the call site.

#![allow(dead_code)]

use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};
use strtab::{HeapString, StartupOptions, StringTable, TableConfig};

/// Maximum time a test waits for the maintenance thread
pub const TEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll interval for [`wait_until`]
pub const POLL_INTERVAL: Duration = Duration::from_millis(5);

// ============================================================================
// TABLE FIXTURE
// ============================================================================

pub struct TableFixture {
    pub table: StringTable,
    pub config: TableConfig,
}

impl TableFixture {
    /// Table with no maintenance thread; work runs only when the test asks
    ///
    /// **Bug this finds:** maintenance that happens without being requested
    pub fn quiet(initial_size: usize) -> Self {
        Self::with_config(TableConfig {
            initial_size,
            background_maintenance: false,
            ..Default::default()
        })
    }

    /// Table whose maintenance runs on the service thread
    ///
    /// **Bug this finds:** lost wakeups between notification and worker
    pub fn background(initial_size: usize) -> Self {
        Self::with_config(TableConfig {
            initial_size,
            background_maintenance: true,
            ..Default::default()
        })
    }

    pub fn with_config(config: TableConfig) -> Self {
        Self::with_options(config, StartupOptions::default())
    }

    pub fn with_options(config: TableConfig, options: StartupOptions) -> Self {
        let table = StringTable::init(config.clone(), options)
            .expect("table initialization should succeed with valid config");
        Self { table, config }
    }

    /// Intern `prefix-0 .. prefix-(n-1)` and keep them alive
    pub fn intern_words(&self, prefix: &str, n: usize) -> Vec<HeapString> {
        (0..n)
            .map(|i| self.table.intern(&format!("{}-{}", prefix, i)))
            .collect()
    }
}

// ============================================================================
// INPUT GENERATORS
// ============================================================================

/// 2^blocks distinct strings that all share one default hash
///
/// "Aa" and "BB" collide under the default hash, and so does every
/// concatenation of the same number of them.
pub fn colliding_strings(blocks: u32) -> Vec<String> {
    (0..1usize << blocks)
        .map(|bits| {
            (0..blocks)
                .map(|i| if bits >> i & 1 == 0 { "Aa" } else { "BB" })
                .collect::<String>()
        })
        .collect()
}

// ============================================================================
// ASSERTIONS
// ============================================================================

/// Equal content implies the identical object
pub fn assert_all_canonical(values: &[HeapString]) {
    let mut first: HashMap<&str, &HeapString> = HashMap::new();
    for v in values {
        let canonical = first.entry(v.as_str()).or_insert(v);
        assert!(
            HeapString::ptr_eq(canonical, v),
            "two distinct objects for {:?}",
            v.as_str()
        );
    }
}

/// Poll `pred` until it holds or [`TEST_TIMEOUT`] expires
pub fn wait_until(mut pred: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TEST_TIMEOUT;
    while Instant::now() < deadline {
        if pred() {
            return true;
        }
        thread::sleep(POLL_INTERVAL);
    }
    pred()
}
