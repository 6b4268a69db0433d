//! Concurrent Intern Table
//!
//! A power-of-two array of buckets, each an ordered list of [`WeakSlot`]s.
//!
//! ```text
//!   current ──▶ Table (size 2^n, epoch)
//!                ├─ Bucket 0: [slot, slot]      slots: ArcSwap<Vec<WeakSlot>>
//!                ├─ Bucket 1: []                lock:  Mutex<()>   (writers)
//!                ├─ ...                         redirected: AtomicBool
//!                └─ next ──▶ Table (migration target, while a task runs)
//! ```
//!
//! Readers load a bucket's slot vector and scan it without taking any lock.
//! Writers take the bucket lock, copy the vector, append and publish the
//! copy. Dead slots stay linked until a maintenance task reaps them.
//!
//! Growth and rehashing build a second table and migrate bucket by bucket.
//! A migrated bucket is flagged *redirected* under its lock; from then on
//! mutators that land on it follow `next` and redo the operation there,
//! recomputing the hash under the target's epoch. Migration locks the old
//! bucket before the new one, mutators never hold two bucket locks, so
//! there is no lock cycle. Every copy of a given content lives in the old
//! bucket its hash selects, so once that bucket is redirected all of them
//! are in the target, and an insert that follows the redirect sees them.
//! Commit is a single `ArcSwap::store` of the active table.

mod lookup;
pub mod task;

pub use lookup::LookupKey;
pub use task::{run_task, IncrementalTask, TaskKind, TaskState, TaskSummary};

use crate::config::TableConfig;
use crate::heap::HeapString;
use crate::stats::{StatisticsBuilder, TableStatistics};
use crate::weak::{WeakHandle, WeakStorage};
use arc_swap::{ArcSwap, ArcSwapOption};
use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use strtab_util::HashEpoch;

/// A table entry: hash plus a weak reference to the string
///
/// Copies made during migration share the same handle, so the backing
/// cell is still released exactly once.
#[derive(Clone, Debug)]
pub struct WeakSlot {
    hash: u32,
    handle: Arc<WeakHandle>,
}

impl WeakSlot {
    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub fn handle(&self) -> &WeakHandle {
        &self.handle
    }

    #[inline]
    pub fn peek(&self) -> Option<HeapString> {
        self.handle.peek()
    }

    #[inline]
    pub fn resolve(&self) -> Option<HeapString> {
        self.handle.resolve()
    }

    #[inline]
    pub fn is_dead(&self) -> bool {
        self.handle.is_dead()
    }

    pub fn mark_dead(&self) {
        self.handle.mark_dead()
    }

    /// Return the backing cell; only at removal
    pub fn release(&self, storage: &WeakStorage) -> bool {
        storage.release(&self.handle)
    }

    fn rehashed(&self, hash: u32) -> WeakSlot {
        WeakSlot {
            hash,
            handle: Arc::clone(&self.handle),
        }
    }
}

/// A structural problem found by [`InternTable::verify`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyIssue {
    HashMismatch {
        content: String,
        stored: u32,
        expected: u32,
    },
    MisplacedSlot {
        content: String,
        bucket: usize,
        expected: usize,
    },
    ReleasedSlotLinked {
        id: u64,
    },
}

impl VerifyIssue {
    pub fn kind(&self) -> &'static str {
        match self {
            VerifyIssue::HashMismatch { .. } => "hash_mismatch",
            VerifyIssue::MisplacedSlot { .. } => "misplaced_slot",
            VerifyIssue::ReleasedSlotLinked { .. } => "released_slot_linked",
        }
    }
}

/// Result of a table operation plus the chain alarm
#[derive(Debug, Clone)]
pub struct Probe<T> {
    pub value: T,
    /// The bucket walked was longer than the rehash chain length
    pub rehash_warning: bool,
}

pub(crate) struct Bucket {
    slots: ArcSwap<Vec<WeakSlot>>,
    lock: Mutex<()>,
    redirected: AtomicBool,
}

impl Bucket {
    fn new(empty: &Arc<Vec<WeakSlot>>) -> Self {
        Self {
            slots: ArcSwap::new(Arc::clone(empty)),
            lock: Mutex::new(()),
            redirected: AtomicBool::new(false),
        }
    }

    #[inline]
    fn is_redirected(&self) -> bool {
        self.redirected.load(Ordering::Acquire)
    }
}

pub(crate) struct Table {
    buckets: Box<[Bucket]>,
    size_log2: u32,
    mask: usize,
    epoch: HashEpoch,
    next: ArcSwapOption<Table>,
}

impl Table {
    pub(crate) fn new(size_log2: u32, epoch: HashEpoch) -> Self {
        let size = 1usize << size_log2;
        let empty = Arc::new(Vec::new());
        let buckets = (0..size).map(|_| Bucket::new(&empty)).collect();

        Self {
            buckets,
            size_log2,
            mask: size - 1,
            epoch,
            next: ArcSwapOption::empty(),
        }
    }

    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    fn bucket_for(&self, hash: u32) -> &Bucket {
        &self.buckets[hash as usize & self.mask]
    }

    fn next_table(&self) -> Option<Arc<Table>> {
        self.next.load_full()
    }
}

/// Walk one bucket snapshot
///
/// Returns the match (strengthened) and the number of slots visited.
fn scan_bucket(slots: &[WeakSlot], hash: u32, key: LookupKey<'_>) -> (Option<HeapString>, usize) {
    let mut visited = 0;
    for slot in slots {
        visited += 1;
        if slot.hash != hash {
            continue;
        }
        let matched = match slot.peek() {
            Some(candidate) => key.matches(&candidate),
            None => {
                slot.mark_dead();
                false
            }
        };
        if matched {
            match slot.resolve() {
                Some(value) => return (Some(value), visited),
                None => slot.mark_dead(),
            }
        }
    }
    (None, visited)
}

/// The mutable string table
pub struct InternTable {
    current: ArcSwap<Table>,
    storage: Arc<WeakStorage>,
    items: CachePadded<AtomicUsize>,
    resize_lock: Mutex<()>,
    max_size_log2: u32,
    rehash_chain_len: usize,
    chunk_buckets: usize,
}

impl InternTable {
    /// Create an empty table sized from `config`
    pub fn new(config: &TableConfig, storage: Arc<WeakStorage>) -> Self {
        let size_log2 = config.initial_size_log2();
        log::trace!("Start size: {} ({})", 1usize << size_log2, size_log2);

        Self {
            current: ArcSwap::from_pointee(Table::new(size_log2, HashEpoch::Default)),
            storage,
            items: CachePadded::new(AtomicUsize::new(0)),
            resize_lock: Mutex::new(()),
            max_size_log2: config.max_size_log2,
            rehash_chain_len: config.rehash_chain_len,
            chunk_buckets: config.task_chunk_buckets,
        }
    }

    /// Find a live string equal to `key`
    pub fn get(&self, key: LookupKey<'_>) -> Probe<Option<HeapString>> {
        let mut table = self.current.load_full();
        let mut warning = false;

        loop {
            let hash = table.epoch.hash(key.as_str());
            let (found, visited, redirected) = {
                let bucket = table.bucket_for(hash);
                let slots = bucket.slots.load();
                let (found, visited) = scan_bucket(&slots, hash, key);
                // Checked after the scan: a redirect seen here covers
                // every insert the scan missed
                (found, visited, bucket.is_redirected())
            };
            warning |= visited > self.rehash_chain_len;

            if found.is_some() || !redirected {
                return Probe {
                    value: found,
                    rehash_warning: warning,
                };
            }

            match table.next_table() {
                Some(next) => table = next,
                None => {
                    return Probe {
                        value: found,
                        rehash_warning: warning,
                    }
                }
            }
        }
    }

    /// Link `candidate` for `value` unless an equal string is already present
    ///
    /// Returns the canonical string: the existing one if present, otherwise
    /// `value`. The table owns `candidate` from here on; a losing candidate
    /// is released before returning.
    pub fn insert_if_absent(&self, value: &HeapString, candidate: WeakHandle) -> Probe<HeapString> {
        self.item_added();
        let key = LookupKey::Value(value);
        let mut table = self.current.load_full();

        loop {
            let hash = table.epoch.hash(value);
            let bucket = table.bucket_for(hash);
            let guard = bucket.lock.lock();

            if bucket.is_redirected() {
                drop(guard);
                match table.next_table() {
                    Some(next) => {
                        table = next;
                        continue;
                    }
                    None => crate::error::fatal("redirected bucket without a migration target"),
                }
            }

            let slots = bucket.slots.load_full();
            let (found, visited) = scan_bucket(&slots, hash, key);

            if let Some(existing) = found {
                drop(guard);
                self.item_removed();
                self.storage.release(&candidate);
                return Probe {
                    value: existing,
                    rehash_warning: visited > self.rehash_chain_len,
                };
            }

            let mut linked = Vec::with_capacity(slots.len() + 1);
            linked.extend(slots.iter().cloned());
            linked.push(WeakSlot {
                hash,
                handle: Arc::new(candidate),
            });
            let len = linked.len();
            bucket.slots.store(Arc::new(linked));
            drop(guard);

            return Probe {
                value: value.clone(),
                rehash_warning: len > self.rehash_chain_len,
            };
        }
    }

    #[inline]
    fn item_added(&self) {
        self.items.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn item_removed(&self) {
        let prev = self.items.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(prev > 0, "item count underflow");
    }

    /// Approximate number of slots, live or not yet reaped
    pub fn item_count(&self) -> usize {
        self.items.load(Ordering::Relaxed)
    }

    pub fn size(&self) -> usize {
        self.current.load().size()
    }

    pub fn size_log2(&self) -> u32 {
        self.current.load().size_log2
    }

    pub fn max_size_log2(&self) -> u32 {
        self.max_size_log2
    }

    pub fn is_max_size_reached(&self) -> bool {
        self.size_log2() >= self.max_size_log2
    }

    /// `item_count / size`; over-estimates the live load
    pub fn load_factor(&self) -> f64 {
        self.item_count() as f64 / self.size() as f64
    }

    /// `num_dead / size`
    pub fn dead_factor(&self, num_dead: usize) -> f64 {
        num_dead as f64 / self.size() as f64
    }

    pub fn hash_epoch(&self) -> HashEpoch {
        self.current.load().epoch.clone()
    }

    pub fn alt_hash_active(&self) -> bool {
        self.current.load().epoch.is_alternate()
    }

    pub fn rehash_chain_len(&self) -> usize {
        self.rehash_chain_len
    }

    pub fn storage(&self) -> &Arc<WeakStorage> {
        &self.storage
    }

    /// Whether a grow, rehash or bulk-delete task currently owns the table
    pub fn is_task_in_flight(&self) -> bool {
        self.resize_lock.is_locked()
    }

    /// Visit every live string, unless a structural task is running
    pub fn try_scan(&self, f: impl FnMut(&HeapString)) -> bool {
        match self.resize_lock.try_lock() {
            Some(_guard) => {
                self.scan_current(f);
                true
            }
            None => false,
        }
    }

    /// Visit every live string, waiting out any structural task
    pub fn scan(&self, f: impl FnMut(&HeapString)) {
        let _guard = self.resize_lock.lock();
        self.scan_current(f);
    }

    fn scan_current(&self, mut f: impl FnMut(&HeapString)) {
        let table = self.current.load_full();
        for bucket in table.buckets.iter() {
            for slot in bucket.slots.load().iter() {
                if let Some(value) = slot.resolve() {
                    f(&value);
                }
            }
        }
    }

    /// Check every slot of the active table
    ///
    /// Waits out any structural task. Reports slots whose stored hash does
    /// not match their content under the table's epoch, slots linked in the
    /// wrong bucket and slots whose cell was already released.
    pub fn verify(&self) -> Vec<VerifyIssue> {
        let _guard = self.resize_lock.lock();
        let table = self.current.load_full();
        let mut issues = Vec::new();

        for (index, bucket) in table.buckets.iter().enumerate() {
            for slot in bucket.slots.load().iter() {
                if slot.handle.is_released() {
                    issues.push(VerifyIssue::ReleasedSlotLinked {
                        id: slot.handle.id(),
                    });
                    continue;
                }
                let value = match slot.peek() {
                    Some(value) => value,
                    None => continue,
                };
                let expected = table.epoch.hash(&value);
                if expected != slot.hash {
                    issues.push(VerifyIssue::HashMismatch {
                        content: value.to_string(),
                        stored: slot.hash,
                        expected,
                    });
                } else if slot.hash as usize & table.mask != index {
                    issues.push(VerifyIssue::MisplacedSlot {
                        content: value.to_string(),
                        bucket: index,
                        expected: slot.hash as usize & table.mask,
                    });
                }
            }
        }
        issues
    }

    /// Bucket and literal statistics for the active table
    pub fn statistics(&self) -> TableStatistics {
        let table = self.current.load_full();
        let mut builder = StatisticsBuilder::default();

        for bucket in table.buckets.iter() {
            let slots = bucket.slots.load();
            builder.record_bucket(slots.len());
            for slot in slots.iter() {
                if let Some(value) = slot.peek() {
                    builder.record_live(value.literal_size());
                }
            }
        }

        builder.finish(
            std::mem::size_of::<Bucket>(),
            std::mem::size_of::<WeakSlot>() + std::mem::size_of::<WeakHandle>(),
        )
    }

    pub(crate) fn active(&self) -> Arc<Table> {
        self.current.load_full()
    }

    pub(crate) fn install(&self, table: Arc<Table>) {
        self.current.store(table);
    }

    pub(crate) fn resize_lock(&self) -> &Mutex<()> {
        &self.resize_lock
    }

    pub(crate) fn chunk_buckets(&self) -> usize {
        self.chunk_buckets
    }
}

impl std::fmt::Debug for InternTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternTable")
            .field("size", &self.size())
            .field("items", &self.item_count())
            .field("alt_hash", &self.alt_hash_active())
            .finish()
    }
}
