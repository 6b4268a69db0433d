//! Maintenance Coordinator
//!
//! Decides when the table needs structural work and which kind, and makes
//! sure at most one piece of work is outstanding. The collector's dead-count
//! notification is the only external trigger; the chain alarm raised by
//! mutators is the other, internal one.
//!
//! ```text
//!   gc_notify(num_dead) ──▶ needs_maintenance? ──▶ has_work = true ──▶ wake
//!                                                                      │
//!   maintenance context ◀──────────────────────────────────────────────┘
//!     select_work: load > pref && !at_max ? Grow : Clean
//!     run task, then has_work = false
//! ```

use crate::config::TableConfig;
use crate::error::Result;
use crate::logging::{TableEvent, TableLogger};
use crate::pause::PauseHook;
use crate::table::{run_task, IncrementalTask, InternTable, TaskSummary};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Structural work the coordinator can schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkKind {
    Grow,
    Clean,
}

/// Should a notification with these factors request work
///
/// All comparisons are strict.
pub fn needs_maintenance(load_factor: f64, dead_factor: f64, config: &TableConfig) -> bool {
    dead_factor > load_factor
        || load_factor > config.preferred_avg_chain_len
        || dead_factor > config.clean_dead_high_water_mark
}

/// Grow when overloaded and growth is still possible, otherwise clean
pub fn select_work(load_factor: f64, at_max_size: bool, config: &TableConfig) -> WorkKind {
    if load_factor > config.preferred_avg_chain_len && !at_max_size {
        WorkKind::Grow
    } else {
        WorkKind::Clean
    }
}

pub struct MaintenanceCoordinator {
    config: TableConfig,
    has_work: AtomicBool,
    wake_pending: Mutex<bool>,
    wake: Condvar,
    shutdown: AtomicBool,
    logger: Arc<TableLogger>,
}

impl MaintenanceCoordinator {
    pub fn new(config: TableConfig, logger: Arc<TableLogger>) -> Self {
        Self {
            config,
            has_work: AtomicBool::new(false),
            wake_pending: Mutex::new(false),
            wake: Condvar::new(),
            shutdown: AtomicBool::new(false),
            logger,
        }
    }

    /// Collector notification after a collection
    ///
    /// Returns true if this call requested work.
    pub fn gc_notify(&self, table: &InternTable, num_dead: usize) -> bool {
        if self.has_work() {
            return false;
        }

        let load_factor = table.load_factor();
        let dead_factor = table.dead_factor(num_dead);
        log::trace!(
            "Load factor {:.3}, dead factor {:.3} ({} dead)",
            load_factor,
            dead_factor,
            num_dead
        );

        if !needs_maintenance(load_factor, dead_factor, &self.config) {
            return false;
        }

        self.logger.log(TableEvent::WorkTriggered {
            load_factor,
            dead_factor,
            num_dead,
        });
        self.trigger_concurrent_work();
        true
    }

    /// Flag outstanding work and wake the maintenance context
    pub fn trigger_concurrent_work(&self) {
        self.has_work.store(true, Ordering::Release);
        let mut pending = self.wake_pending.lock();
        *pending = true;
        self.wake.notify_one();
    }

    pub fn has_work(&self) -> bool {
        self.has_work.load(Ordering::Acquire)
    }

    /// Run the selected task; clears the work flag afterwards
    pub fn do_concurrent_work(&self, table: &InternTable, hook: &dyn PauseHook) -> Result<WorkKind> {
        let kind = select_work(table.load_factor(), table.is_max_size_reached(), &self.config);
        let result = match kind {
            WorkKind::Grow => self.grow(table, hook),
            WorkKind::Clean => self.clean(table, hook),
        };
        self.has_work.store(false, Ordering::Release);
        result.map(|_| kind)
    }

    fn grow(&self, table: &InternTable, hook: &dyn PauseHook) -> Result<Option<TaskSummary>> {
        let mut task = IncrementalTask::grow(table);
        let summary = run_task(&mut task, hook)?;
        match &summary {
            Some(s) => self.logger.log(TableEvent::Grown {
                old_size: s.old_size,
                new_size: s.new_size,
                moved: s.moved,
                reclaimed: s.reclaimed,
                duration_ms: s.duration_ms(),
            }),
            None => self.logger.log(TableEvent::TaskSkipped {
                task: "Grow".into(),
                reason: "another task in flight or maximum size reached".into(),
            }),
        }
        Ok(summary)
    }

    fn clean(&self, table: &InternTable, hook: &dyn PauseHook) -> Result<Option<TaskSummary>> {
        let mut task = IncrementalTask::bulk_delete(table);
        let summary = run_task(&mut task, hook)?;
        match &summary {
            Some(s) => self.logger.log(TableEvent::Cleaned {
                examined: s.examined,
                reclaimed: s.reclaimed,
                duration_ms: s.duration_ms(),
            }),
            None => self.logger.log(TableEvent::TaskSkipped {
                task: "BulkDelete".into(),
                reason: "another task in flight".into(),
            }),
        }
        Ok(summary)
    }

    /// Block until work is triggered; false once shutdown is requested
    pub fn wait_for_work(&self) -> bool {
        let mut pending = self.wake_pending.lock();
        while !*pending && !self.is_shutdown() {
            self.wake.wait(&mut pending);
        }
        if self.is_shutdown() {
            return false;
        }
        *pending = false;
        true
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        let _pending = self.wake_pending.lock();
        self.wake.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }
}
