//! Rehash Guard
//!
//! The default hash is predictable, so crafted input can pile thousands of
//! strings into one bucket. A bucket walk longer than the chain alarm sets
//! `needs_rehashing`; the maintenance context then either grows (if the
//! table is simply overloaded) or migrates everything to a fresh table keyed
//! with a random seed. That migration happens at most once per table. If
//! long chains show up again after it, the input is not a hash flood the
//! seed can fix, and ordinary maintenance is all that is requested.

use crate::coordinator::MaintenanceCoordinator;
use crate::logging::{TableEvent, TableLogger};
use crate::pause::PauseHook;
use crate::table::{run_task, IncrementalTask, InternTable};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strtab_util::AltHashSeed;

/// What a rehash request ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RehashOutcome {
    /// Table is overloaded; growth was requested instead
    PreferGrow,
    /// The one automatic rehash already happened
    AlreadyRehashed,
    /// Migrated to a new seed
    Rehashed,
    /// Another structural task was in flight
    Busy,
}

pub struct RehashGuard {
    needs_rehashing: AtomicBool,
    rehashed: AtomicBool,
    logger: Arc<TableLogger>,
}

impl RehashGuard {
    pub fn new(logger: Arc<TableLogger>) -> Self {
        Self {
            needs_rehashing: AtomicBool::new(false),
            rehashed: AtomicBool::new(false),
            logger,
        }
    }

    /// Feed the chain alarm from a lookup or insert
    pub fn update_needs_rehash(&self, alarm: bool, table: &InternTable, coordinator: &MaintenanceCoordinator) {
        if alarm && !self.needs_rehashing.swap(true, Ordering::AcqRel) {
            self.logger.log(TableEvent::RehashRequested { size: table.size() });
            coordinator.trigger_concurrent_work();
        }
    }

    pub fn needs_rehashing(&self) -> bool {
        self.needs_rehashing.load(Ordering::Acquire)
    }

    pub fn has_rehashed(&self) -> bool {
        self.rehashed.load(Ordering::Acquire)
    }

    /// Respond to an outstanding chain alarm
    ///
    /// Always clears `needs_rehashing`; a rehash that could not start is
    /// retried on the next alarm.
    pub fn rehash_table(
        &self,
        table: &InternTable,
        coordinator: &MaintenanceCoordinator,
        hook: &dyn PauseHook,
    ) -> RehashOutcome {
        log::debug!("Table imbalanced, rehashing called");
        let config = coordinator.config();
        let load_factor = table.load_factor();

        let outcome = if load_factor > config.preferred_avg_chain_len && !table.is_max_size_reached() {
            self.logger.log(TableEvent::RehashDeferredToGrow { load_factor });
            coordinator.trigger_concurrent_work();
            RehashOutcome::PreferGrow
        } else if self.has_rehashed() {
            self.logger.log(TableEvent::RehashRepeated);
            coordinator.trigger_concurrent_work();
            RehashOutcome::AlreadyRehashed
        } else {
            self.do_rehash(table, hook)
        };

        self.needs_rehashing.store(false, Ordering::Release);
        outcome
    }

    fn do_rehash(&self, table: &InternTable, hook: &dyn PauseHook) -> RehashOutcome {
        let seed = AltHashSeed::compute();
        let seed_value = seed.seed();
        let mut task = IncrementalTask::rehash(table, seed);

        match run_task(&mut task, hook) {
            Ok(Some(summary)) => {
                self.rehashed.store(true, Ordering::Release);
                self.logger.log(TableEvent::Rehashed {
                    size: summary.new_size,
                    seed: seed_value,
                    duration_ms: summary.duration_ms(),
                });
                RehashOutcome::Rehashed
            }
            Ok(None) => {
                self.logger.log(TableEvent::RehashFailed);
                RehashOutcome::Busy
            }
            Err(e) => {
                log::error!("Rehash task failed: {}", e);
                self.logger.log(TableEvent::RehashFailed);
                RehashOutcome::Busy
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableConfig;
    use crate::heap::HeapString;
    use crate::pause::NoPause;
    use crate::weak::WeakStorage;

    fn setup(size: usize, max_log2: u32) -> (InternTable, MaintenanceCoordinator, RehashGuard) {
        let config = TableConfig {
            initial_size: size,
            max_size_log2: max_log2,
            background_maintenance: false,
            ..Default::default()
        };
        let logger = Arc::new(TableLogger::default());
        let table = InternTable::new(&config, Arc::new(WeakStorage::new("test")));
        let coordinator = MaintenanceCoordinator::new(config, Arc::clone(&logger));
        (table, coordinator, RehashGuard::new(logger))
    }

    fn fill(table: &InternTable, n: usize) -> Vec<HeapString> {
        (0..n)
            .map(|i| {
                let v = HeapString::new(&format!("r{}", i));
                let candidate = table.storage().acquire(&v);
                table.insert_if_absent(&v, candidate).value
            })
            .collect()
    }

    #[test]
    fn test_alarm_sets_flag_and_triggers() {
        let (table, coordinator, guard) = setup(4, 10);
        guard.update_needs_rehash(false, &table, &coordinator);
        assert!(!guard.needs_rehashing());
        assert!(!coordinator.has_work());

        guard.update_needs_rehash(true, &table, &coordinator);
        assert!(guard.needs_rehashing());
        assert!(coordinator.has_work());
    }

    #[test]
    fn test_prefers_growth_when_overloaded() {
        let (table, coordinator, guard) = setup(1, 10);
        let _held = fill(&table, 3);
        guard.update_needs_rehash(true, &table, &coordinator);

        assert_eq!(guard.rehash_table(&table, &coordinator, &NoPause), RehashOutcome::PreferGrow);
        assert!(!guard.needs_rehashing());
        assert!(!guard.has_rehashed());
        assert!(coordinator.has_work());
        assert!(!table.alt_hash_active());
    }

    #[test]
    fn test_rehash_once_then_escalate() {
        let (table, coordinator, guard) = setup(1, 0);
        let held = fill(&table, 3);

        assert_eq!(guard.rehash_table(&table, &coordinator, &NoPause), RehashOutcome::Rehashed);
        assert!(guard.has_rehashed());
        assert!(table.alt_hash_active());
        for v in &held {
            assert!(table.get(crate::table::LookupKey::Value(v)).value.is_some());
        }

        assert_eq!(
            guard.rehash_table(&table, &coordinator, &NoPause),
            RehashOutcome::AlreadyRehashed
        );
        assert!(coordinator.has_work());
    }

    #[test]
    fn test_busy_when_task_in_flight() {
        let (table, coordinator, guard) = setup(4, 10);
        let mut other = IncrementalTask::bulk_delete(&table);
        assert!(other.prepare());

        guard.update_needs_rehash(true, &table, &coordinator);
        assert_eq!(guard.rehash_table(&table, &coordinator, &NoPause), RehashOutcome::Busy);
        assert!(!guard.needs_rehashing());
        assert!(!guard.has_rehashed());
        assert!(!table.alt_hash_active());
    }
}
