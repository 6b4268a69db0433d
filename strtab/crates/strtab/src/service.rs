//! String Table Service
//!
//! Owns every piece of process-wide state: the mutable table, the overlay,
//! the coordinator and rehash flags, the weak storage category and the
//! maintenance thread.
//!
//! ```text
//!   intern(s) ──▶ overlay.lookup ──hit──▶ shared string
//!                    │ miss
//!                    ▼
//!                 table.get ──hit──▶ canonical string
//!                    │ miss
//!                    ▼
//!                 insert_if_absent ──▶ canonical string (ours or the winner's)
//!
//!   storage.report_num_dead ──▶ gc_notify ──▶ coordinator ──▶ strtab-service
//! ```

use crate::archive::{ArchiveImage, ArchiveWriter, RefEncoding};
use crate::config::TableConfig;
use crate::coordinator::{MaintenanceCoordinator, WorkKind};
use crate::error::{Result, StrtabError};
use crate::heap::HeapString;
use crate::logging::{TableEvent, TableLogger, TableLoggerConfig};
use crate::overlay::{ArchiveOverlayTable, OverlayStatistics};
use crate::pause::{NoPause, PauseHook};
use crate::rehash::{RehashGuard, RehashOutcome};
use crate::stats::TableStatistics;
use crate::table::{InternTable, LookupKey};
use crate::weak::WeakStorage;
use indexmap::IndexMap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use strtab_util::{dump_line, java_hash};

/// Name of the weak storage category backing table slots
pub const WEAK_STORAGE_NAME: &str = "StringTable Weak";

/// Name of the maintenance thread
pub const SERVICE_THREAD_NAME: &str = "strtab-service";

/// Collaborators handed to [`StringTable::init`]
pub struct StartupOptions {
    /// Snapshot to serve as the overlay
    pub snapshot: Option<ArchiveImage>,
    /// Pause cooperation for maintenance tasks
    pub pause_hook: Arc<dyn PauseHook>,
    /// Weak storage to use instead of a fresh one
    pub storage: Option<Arc<WeakStorage>>,
}

impl Default for StartupOptions {
    fn default() -> Self {
        Self {
            snapshot: None,
            pause_hook: Arc::new(NoPause),
            storage: None,
        }
    }
}

/// Service lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Running,
    Stopped,
}

struct Inner {
    config: TableConfig,
    table: InternTable,
    overlay: ArchiveOverlayTable,
    coordinator: MaintenanceCoordinator,
    rehash: RehashGuard,
    pause: Arc<dyn PauseHook>,
    logger: Arc<TableLogger>,
}

impl Inner {
    fn lookup_shared(&self, s: &str) -> Option<HeapString> {
        if self.overlay.is_empty() {
            return None;
        }
        self.overlay.lookup(s, java_hash(s))
    }

    fn update_needs_rehash(&self, alarm: bool) {
        self.rehash
            .update_needs_rehash(alarm, &self.table, &self.coordinator);
    }

    fn do_intern(&self, value: &HeapString) -> HeapString {
        let candidate = self.table.storage().acquire(value);
        let probe = self.table.insert_if_absent(value, candidate);
        self.update_needs_rehash(probe.rehash_warning);
        probe.value
    }

    fn intern(&self, s: &str) -> HeapString {
        if let Some(shared) = self.lookup_shared(s) {
            return shared;
        }
        let probe = self.table.get(LookupKey::Chars(s));
        self.update_needs_rehash(probe.rehash_warning);
        match probe.value {
            Some(found) => found,
            None => self.do_intern(&HeapString::new(s)),
        }
    }

    fn intern_value(&self, value: &HeapString) -> HeapString {
        if let Some(shared) = self.lookup_shared(value) {
            return shared;
        }
        let probe = self.table.get(LookupKey::Value(value));
        self.update_needs_rehash(probe.rehash_warning);
        match probe.value {
            Some(found) => found,
            None => self.do_intern(value),
        }
    }

    fn gc_notify(&self, num_dead: usize) -> bool {
        self.coordinator.gc_notify(&self.table, num_dead)
    }

    fn run_pending_work(&self) -> Result<Option<WorkKind>> {
        if self.rehash.needs_rehashing() {
            self.rehash
                .rehash_table(&self.table, &self.coordinator, self.pause.as_ref());
        }

        if !self.coordinator.has_work() {
            return Ok(None);
        }

        let kind = self
            .coordinator
            .do_concurrent_work(&self.table, self.pause.as_ref())?;

        if self.config.verbose {
            let stats = self.table.statistics();
            log::info!(
                "After {:?}: {} buckets, {} entries ({} live), max chain {}",
                kind,
                stats.bucket_count,
                stats.entry_count,
                stats.live_count,
                stats.max_bucket_len
            );
        }
        Ok(Some(kind))
    }
}

/// The string interning service
///
/// # Examples
///
/// ```rust
/// use strtab::{StartupOptions, StringTable, TableConfig};
///
/// let config = TableConfig {
///     initial_size: 16,
///     background_maintenance: false,
///     ..Default::default()
/// };
/// let table = StringTable::init(config, StartupOptions::default()).unwrap();
///
/// let a = table.intern("hello");
/// let b = table.intern("hello");
/// assert!(strtab::HeapString::ptr_eq(&a, &b));
///
/// table.shutdown().unwrap();
/// ```
pub struct StringTable {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
    state: Mutex<ServiceState>,
}

impl StringTable {
    /// Build the table, load the overlay and start maintenance
    pub fn init(config: TableConfig, options: StartupOptions) -> Result<Self> {
        config.validate()?;

        let logger = Arc::new(TableLogger::new(TableLoggerConfig {
            json: config.json_events,
            ..Default::default()
        }));
        let storage = options
            .storage
            .unwrap_or_else(|| Arc::new(WeakStorage::new(WEAK_STORAGE_NAME)));
        let overlay = match options.snapshot {
            Some(image) => ArchiveOverlayTable::from_image(image),
            None => ArchiveOverlayTable::empty(),
        };

        let inner = Arc::new(Inner {
            table: InternTable::new(&config, Arc::clone(&storage)),
            overlay,
            coordinator: MaintenanceCoordinator::new(config.clone(), Arc::clone(&logger)),
            rehash: RehashGuard::new(Arc::clone(&logger)),
            pause: options.pause_hook,
            logger,
            config,
        });

        let notify_target: Weak<Inner> = Arc::downgrade(&inner);
        storage.register_num_dead_callback(Arc::new(move |num_dead| {
            if let Some(inner) = notify_target.upgrade() {
                inner.gc_notify(num_dead);
            }
        }));

        let service = Self {
            inner,
            worker: Mutex::new(None),
            state: Mutex::new(ServiceState::Running),
        };

        if service.inner.overlay.requires_transfer() {
            service.transfer_overlay_to_table();
        }

        if service.inner.config.background_maintenance {
            service.start_worker()?;
        }

        log::debug!(
            "String table started: {} buckets, {} shared strings",
            service.inner.table.size(),
            service.inner.overlay.entry_count()
        );
        Ok(service)
    }

    fn start_worker(&self) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name(SERVICE_THREAD_NAME.to_string())
            .spawn(move || {
                while inner.coordinator.wait_for_work() {
                    if let Err(e) = inner.run_pending_work() {
                        log::error!("String table maintenance failed: {}", e);
                    }
                }
                log::trace!("{} exiting", SERVICE_THREAD_NAME);
            })?;
        *self.worker.lock() = Some(handle);
        Ok(())
    }

    /// Stop and join the maintenance thread
    ///
    /// Idempotent. The table stays usable afterwards; requested work then
    /// only runs through [`StringTable::run_pending_work`].
    pub fn shutdown(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state == ServiceState::Stopped {
                return Ok(());
            }
            *state = ServiceState::Stopped;
        }

        self.inner.coordinator.request_shutdown();
        self.inner.table.storage().clear_num_dead_callback();

        if let Some(handle) = self.worker.lock().take() {
            handle
                .join()
                .map_err(|_| StrtabError::Internal("maintenance thread panicked".into()))?;
        }
        Ok(())
    }

    pub fn state(&self) -> ServiceState {
        *self.state.lock()
    }

    /// Canonical string for `s`
    pub fn intern(&self, s: &str) -> HeapString {
        self.inner.intern(s)
    }

    /// Canonical string for an existing string object
    ///
    /// Returns `value` itself if it becomes the canonical instance.
    pub fn intern_value(&self, value: &HeapString) -> HeapString {
        self.inner.intern_value(value)
    }

    /// Canonical string for `s`, if one exists
    pub fn lookup(&self, s: &str) -> Option<HeapString> {
        if let Some(shared) = self.inner.lookup_shared(s) {
            return Some(shared);
        }
        let probe = self.inner.table.get(LookupKey::Chars(s));
        self.inner.update_needs_rehash(probe.rehash_warning);
        probe.value
    }

    /// Collector notification: `num_dead` slots refer to collected strings
    pub fn gc_notify(&self, num_dead: usize) -> bool {
        self.inner.gc_notify(num_dead)
    }

    /// Run outstanding rehash and maintenance work on the calling thread
    pub fn run_pending_work(&self) -> Result<Option<WorkKind>> {
        self.inner.run_pending_work()
    }

    /// Respond to the chain alarm on the calling thread
    pub fn rehash_table(&self) -> RehashOutcome {
        self.inner.rehash.rehash_table(
            &self.inner.table,
            &self.inner.coordinator,
            self.inner.pause.as_ref(),
        )
    }

    /// Move every overlay string into the mutable table
    ///
    /// Only the first call has an effect.
    pub fn transfer_overlay_to_table(&self) -> usize {
        let inner = &self.inner;
        let entries = inner.overlay.drain(|shared| {
            inner.do_intern(shared);
        });
        if entries > 0 {
            inner.logger.log(TableEvent::OverlayDrained { entries });
        }
        entries
    }

    /// Statistics, or with `verbose` every live string
    pub fn dump(&self, verbose: bool) -> String {
        let mut out = String::new();

        if !verbose {
            self.statistics().print_to(&mut out, "StringTable");
            if !self.inner.overlay.is_empty() {
                self.overlay_statistics()
                    .print_to(&mut out, "Shared String Table");
            }
            return out;
        }

        out.push_str("VERSION: 1.1\n");
        let scanned = self.inner.table.try_scan(|value| {
            out.push_str(&dump_line(value));
            out.push('\n');
        });
        if !scanned {
            out.push_str("dump unavailable at this moment\n");
        }

        if !self.inner.overlay.is_empty() {
            out.push_str("#----------------\n");
            out.push_str("# Shared strings:\n");
            out.push_str("#----------------\n");
            self.inner.overlay.for_each(|value| {
                out.push_str(&dump_line(value));
                out.push('\n');
            });
        }
        out
    }

    pub fn statistics(&self) -> TableStatistics {
        self.inner.table.statistics()
    }

    pub fn overlay_statistics(&self) -> OverlayStatistics {
        self.inner.overlay.statistics()
    }

    /// Structural check of the mutable table
    ///
    /// Returns the number of problems found; each is logged.
    pub fn verify(&self) -> usize {
        let issues = self.inner.table.verify();
        for issue in &issues {
            self.inner.logger.log(TableEvent::VerificationFailure {
                kind: issue.kind().to_string(),
                detail: format!("{:?}", issue),
            });
        }
        issues.len()
    }

    /// [`verify`](Self::verify) plus a search for equal live strings across
    /// the overlay and the table
    ///
    /// Returns problems found; each duplicate copy counts once.
    pub fn verify_and_compare_entries(&self) -> usize {
        let mut failures = self.verify();

        let mut seen: FxHashMap<String, usize> = FxHashMap::default();
        self.inner.overlay.for_each(|v| *seen.entry(v.to_string()).or_default() += 1);
        self.inner.table.scan(|v| *seen.entry(v.to_string()).or_default() += 1);

        for (content, copies) in seen.into_iter().filter(|(_, n)| *n > 1) {
            self.inner.logger.log(TableEvent::VerificationFailure {
                kind: "duplicate".to_string(),
                detail: format!("{:?} present {} times", content, copies),
            });
            failures += copies - 1;
        }
        failures
    }

    /// Encode every live string, overlay included, as a snapshot image
    pub fn write_archive(&self, encoding: RefEncoding) -> Result<Vec<u8>> {
        let mut writer = ArchiveWriter::new(encoding);
        self.inner.overlay.for_each(|v| writer.add(v));
        self.inner.table.scan(|v| writer.add(v));
        writer.finish()
    }

    /// Key/value snapshot of the service state
    pub fn diagnostics(&self) -> IndexMap<String, String> {
        let inner = &self.inner;
        let mut diag = IndexMap::new();

        diag.insert("state".to_string(), format!("{:?}", self.state()));
        diag.insert("size".to_string(), inner.table.size().to_string());
        diag.insert("item_count".to_string(), inner.table.item_count().to_string());
        diag.insert(
            "load_factor".to_string(),
            format!("{:.3}", inner.table.load_factor()),
        );
        diag.insert(
            "alt_hash".to_string(),
            inner.table.alt_hash_active().to_string(),
        );
        diag.insert(
            "needs_rehashing".to_string(),
            inner.rehash.needs_rehashing().to_string(),
        );
        diag.insert(
            "rehashed".to_string(),
            inner.rehash.has_rehashed().to_string(),
        );
        diag.insert(
            "has_work".to_string(),
            inner.coordinator.has_work().to_string(),
        );
        diag.insert(
            "task_in_flight".to_string(),
            inner.table.is_task_in_flight().to_string(),
        );
        diag.insert(
            "shared_entries".to_string(),
            inner.overlay.entry_count().to_string(),
        );
        diag.insert(
            "weak_cells".to_string(),
            inner.table.storage().allocated().to_string(),
        );
        diag.insert("events".to_string(), inner.logger.len().to_string());

        diag
    }

    pub fn table(&self) -> &InternTable {
        &self.inner.table
    }

    pub fn overlay(&self) -> &ArchiveOverlayTable {
        &self.inner.overlay
    }

    pub fn storage(&self) -> &Arc<WeakStorage> {
        self.inner.table.storage()
    }

    pub fn events(&self) -> &TableLogger {
        &self.inner.logger
    }

    pub fn config(&self) -> &TableConfig {
        &self.inner.config
    }

    pub fn has_work(&self) -> bool {
        self.inner.coordinator.has_work()
    }

    pub fn needs_rehashing(&self) -> bool {
        self.inner.rehash.needs_rehashing()
    }

    pub fn has_rehashed(&self) -> bool {
        self.inner.rehash.has_rehashed()
    }
}

impl Drop for StringTable {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("String table shutdown failed: {}", e);
        }
    }
}

impl std::fmt::Debug for StringTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StringTable")
            .field("table", &self.inner.table)
            .field("overlay", &self.inner.overlay)
            .field("state", &self.state())
            .finish()
    }
}
