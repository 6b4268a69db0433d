//! Table Event Logging
//!
//! Maintenance decisions are rare and worth keeping: every trigger, grow,
//! clean and rehash decision is recorded as a [`TableEvent`] with a
//! wall-clock timestamp, and echoed through the `log` facade.
//!
//! Log Levels:
//! - ERROR: Verification anomalies
//! - WARN: Repeated rehash requests
//! - INFO: Completed grow, clean, rehash and overlay transfer
//! - DEBUG: Work triggers and skipped tasks

use chrono::{DateTime, Local};
use log::Level;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

/// Maintenance and diagnostic events
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TableEvent {
    /// `gc_notify` requested concurrent work
    WorkTriggered {
        load_factor: f64,
        dead_factor: f64,
        num_dead: usize,
    },

    /// Bucket array doubled
    Grown {
        old_size: usize,
        new_size: usize,
        moved: usize,
        reclaimed: usize,
        duration_ms: f64,
    },

    /// Dead slots unlinked in place
    Cleaned {
        examined: usize,
        reclaimed: usize,
        duration_ms: f64,
    },

    /// A structural task could not start
    TaskSkipped { task: String, reason: String },

    /// A chain exceeded the alarm length
    RehashRequested { size: usize },

    /// Growth preferred over rehashing
    RehashDeferredToGrow { load_factor: f64 },

    /// Rehash requested after the one automatic rehash
    RehashRepeated,

    /// Table migrated to a new hash seed
    Rehashed {
        size: usize,
        seed: u64,
        duration_ms: f64,
    },

    /// Rehash could not start
    RehashFailed,

    /// Snapshot entries transferred into the table
    OverlayDrained { entries: usize },

    /// Verification found a problem
    VerificationFailure { kind: String, detail: String },
}

impl TableEvent {
    /// Level the event is recorded and echoed at
    pub fn level(&self) -> Level {
        match self {
            TableEvent::VerificationFailure { .. } => Level::Error,
            TableEvent::RehashRepeated => Level::Warn,
            TableEvent::Grown { .. }
            | TableEvent::Cleaned { .. }
            | TableEvent::Rehashed { .. }
            | TableEvent::RehashFailed
            | TableEvent::RehashDeferredToGrow { .. }
            | TableEvent::OverlayDrained { .. } => Level::Info,
            TableEvent::WorkTriggered { .. }
            | TableEvent::TaskSkipped { .. }
            | TableEvent::RehashRequested { .. } => Level::Debug,
        }
    }

    /// Human-readable rendering
    pub fn describe(&self) -> String {
        match self {
            TableEvent::WorkTriggered {
                load_factor,
                dead_factor,
                num_dead,
            } => format!(
                "Concurrent work triggered: load factor {:.3}, dead factor {:.3} ({} dead)",
                load_factor, dead_factor, num_dead
            ),
            TableEvent::Grown {
                old_size,
                new_size,
                moved,
                reclaimed,
                duration_ms,
            } => format!(
                "Grown to size {} from {} ({} moved, {} dead reclaimed, {:.2}ms)",
                new_size, old_size, moved, reclaimed, duration_ms
            ),
            TableEvent::Cleaned {
                examined,
                reclaimed,
                duration_ms,
            } => format!(
                "Cleaned {} of {} ({:.2}ms)",
                reclaimed, examined, duration_ms
            ),
            TableEvent::TaskSkipped { task, reason } => {
                format!("{} skipped: {}", task, reason)
            }
            TableEvent::RehashRequested { size } => {
                format!("Chain alarm at size {}, rehash requested", size)
            }
            TableEvent::RehashDeferredToGrow { load_factor } => format!(
                "Growing instead of rehashing (load factor {:.3})",
                load_factor
            ),
            TableEvent::RehashRepeated => {
                "Rehash already happened, not rehashing again".to_string()
            }
            TableEvent::Rehashed {
                size,
                seed,
                duration_ms,
            } => format!(
                "Rehashed at size {} with seed {:#018x} ({:.2}ms)",
                size, seed, duration_ms
            ),
            TableEvent::RehashFailed => "Resizes in progress rehashing skipped".to_string(),
            TableEvent::OverlayDrained { entries } => {
                format!("Transferred {} shared strings to the local table", entries)
            }
            TableEvent::VerificationFailure { kind, detail } => {
                format!("Verification failure ({}): {}", kind, detail)
            }
        }
    }
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct TableLoggerConfig {
    /// Least severe level that is recorded
    pub level: Level,

    /// Echo recorded events through the `log` facade
    pub echo: bool,

    /// Echo as JSON instead of text
    pub json: bool,
}

impl Default for TableLoggerConfig {
    fn default() -> Self {
        Self {
            level: Level::Debug,
            echo: true,
            json: false,
        }
    }
}

/// One recorded event
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub at: DateTime<Local>,
    pub event: TableEvent,
}

impl EventRecord {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "timestamp": self.at.to_rfc3339(),
            "level": self.event.level().as_str(),
            "event": self.event,
        })
    }
}

/// Event recorder for one string table
pub struct TableLogger {
    config: TableLoggerConfig,
    events: Mutex<Vec<EventRecord>>,
    enabled: AtomicBool,
}

impl TableLogger {
    pub fn new(config: TableLoggerConfig) -> Self {
        Self {
            config,
            events: Mutex::new(Vec::new()),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Record an event
    pub fn log(&self, event: TableEvent) {
        if !self.is_enabled() {
            return;
        }

        let level = event.level();
        if level > self.config.level {
            return;
        }

        let record = EventRecord {
            at: Local::now(),
            event,
        };

        if self.config.echo {
            if self.config.json {
                log::log!(target: "strtab::events", level, "{}", record.to_json());
            } else {
                log::log!(target: "strtab::events", level, "{}", record.event.describe());
            }
        }

        self.events.lock().push(record);
    }

    /// Snapshot of every recorded event
    pub fn records(&self) -> Vec<EventRecord> {
        self.events.lock().clone()
    }

    /// Recorded events matching `pred`
    pub fn count(&self, pred: impl Fn(&TableEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|r| pred(&r.event)).count()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// One JSON object per line
    pub fn to_json_lines(&self) -> String {
        self.events
            .lock()
            .iter()
            .map(|r| r.to_json().to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for TableLogger {
    fn default() -> Self {
        Self::new(TableLoggerConfig::default())
    }
}
