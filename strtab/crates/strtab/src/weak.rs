//! Weak Storage
//!
//! Table slots never keep their strings alive. Each slot holds a
//! [`WeakHandle`] backed by a cell in a [`WeakStorage`] category owned by
//! the collector. When the string is collected the cell stops resolving;
//! the slot is then *dead* until a maintenance pass unlinks it and hands the
//! cell back with [`WeakStorage::release`].
//!
//! ```text
//!   slot ──▶ WeakHandle ──▶ cell (WeakStorage) ──weak──▶ HeapString
//!                                                          ▲
//!   mutators ─────────────────────────────────strong───────┘
//! ```
//!
//! The storage also carries the collector's dead-count notification: after
//! a collection the collector calls [`WeakStorage::report_num_dead`], which
//! counts cleared cells and forwards the number to the registered callback.

use crate::heap::HeapString;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Callback invoked with the number of dead cells after a collection
pub type NumDeadCallback = Arc<dyn Fn(usize) + Send + Sync>;

/// Weak back-reference from a table slot to its string
///
/// Only [`peek`](WeakHandle::peek) and [`resolve`](WeakHandle::resolve) give
/// access to the referent.
pub struct WeakHandle {
    id: u64,
    referent: Weak<str>,
    released: AtomicBool,
    marked_dead: AtomicBool,
}

impl WeakHandle {
    /// Observe the referent without keeping it alive past the call site
    ///
    /// Used for comparisons during lookup. The caller must drop the result
    /// before returning.
    #[inline]
    pub fn peek(&self) -> Option<HeapString> {
        self.referent.upgrade().map(HeapString::from_arc)
    }

    /// Strengthen the referent so it can be handed out
    #[inline]
    pub fn resolve(&self) -> Option<HeapString> {
        self.referent.upgrade().map(HeapString::from_arc)
    }

    /// Whether the referent has been collected
    #[inline]
    pub fn is_dead(&self) -> bool {
        self.referent.strong_count() == 0
    }

    /// Record that a lookup found the referent gone
    ///
    /// Advisory only; removal still waits for a maintenance pass.
    pub fn mark_dead(&self) {
        self.marked_dead.store(true, Ordering::Relaxed);
    }

    pub fn is_marked_dead(&self) -> bool {
        self.marked_dead.load(Ordering::Relaxed)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl std::fmt::Debug for WeakHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakHandle")
            .field("id", &self.id)
            .field("dead", &self.is_dead())
            .field("released", &self.is_released())
            .finish()
    }
}

/// A named category of weak cells
pub struct WeakStorage {
    name: &'static str,
    cells: Mutex<IndexMap<u64, Weak<str>>>,
    next_id: AtomicU64,
    released_total: AtomicUsize,
    double_releases: AtomicUsize,
    num_dead_callback: RwLock<Option<NumDeadCallback>>,
}

impl WeakStorage {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            cells: Mutex::new(IndexMap::new()),
            next_id: AtomicU64::new(1),
            released_total: AtomicUsize::new(0),
            double_releases: AtomicUsize::new(0),
            num_dead_callback: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Allocate a cell weakly referring to `value`
    pub fn acquire(&self, value: &HeapString) -> WeakHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let referent = value.downgrade();
        self.cells.lock().insert(id, referent.clone());

        WeakHandle {
            id,
            referent,
            released: AtomicBool::new(false),
            marked_dead: AtomicBool::new(false),
        }
    }

    /// Return a handle's cell to the storage
    ///
    /// Returns false, and logs, if the handle was already released.
    pub fn release(&self, handle: &WeakHandle) -> bool {
        if handle.released.swap(true, Ordering::AcqRel) {
            self.double_releases.fetch_add(1, Ordering::Relaxed);
            log::error!("{}: weak cell {} released twice", self.name, handle.id);
            return false;
        }

        self.cells.lock().swap_remove(&handle.id);
        self.released_total.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Cells currently allocated
    pub fn allocated(&self) -> usize {
        self.cells.lock().len()
    }

    /// Cells released over the storage's lifetime
    pub fn released_total(&self) -> usize {
        self.released_total.load(Ordering::Relaxed)
    }

    /// Release calls rejected because the cell was already released
    pub fn double_releases(&self) -> usize {
        self.double_releases.load(Ordering::Relaxed)
    }

    /// Count cells whose referent has been collected
    pub fn num_dead(&self) -> usize {
        self.cells
            .lock()
            .values()
            .filter(|w| w.strong_count() == 0)
            .count()
    }

    /// Install the dead-count notification target
    pub fn register_num_dead_callback(&self, callback: NumDeadCallback) {
        *self.num_dead_callback.write() = Some(callback);
    }

    pub fn clear_num_dead_callback(&self) {
        *self.num_dead_callback.write() = None;
    }

    /// Collector hook: count dead cells and notify
    ///
    /// Returns the count that was reported.
    pub fn report_num_dead(&self) -> usize {
        let num_dead = self.num_dead();
        let callback = self.num_dead_callback.read().clone();
        if let Some(callback) = callback {
            callback(num_dead);
        }
        log::trace!("{}: reported {} dead cells", self.name, num_dead);
        num_dead
    }
}

impl std::fmt::Debug for WeakStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakStorage")
            .field("name", &self.name)
            .field("allocated", &self.allocated())
            .field("released_total", &self.released_total())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_peek_resolve() {
        let storage = WeakStorage::new("test");
        let value = HeapString::new("abc");
        let handle = storage.acquire(&value);

        assert_eq!(storage.allocated(), 1);
        let peeked = handle.peek().expect("alive");
        assert!(HeapString::ptr_eq(&peeked, &value));
        assert!(handle.resolve().is_some());
        assert!(!handle.is_dead());
    }

    #[test]
    fn test_dead_after_collection() {
        let storage = WeakStorage::new("test");
        let value = HeapString::new("abc");
        let handle = storage.acquire(&value);
        drop(value);

        assert!(handle.is_dead());
        assert!(handle.peek().is_none());
        assert!(handle.resolve().is_none());
        assert_eq!(storage.num_dead(), 1);
    }

    #[test]
    fn test_release_exactly_once() {
        let storage = WeakStorage::new("test");
        let value = HeapString::new("abc");
        let handle = storage.acquire(&value);

        assert!(storage.release(&handle));
        assert!(handle.is_released());
        assert_eq!(storage.allocated(), 0);
        assert_eq!(storage.released_total(), 1);

        assert!(!storage.release(&handle));
        assert_eq!(storage.released_total(), 1);
        assert_eq!(storage.double_releases(), 1);
    }

    #[test]
    fn test_report_num_dead_invokes_callback() {
        let storage = WeakStorage::new("test");
        let seen = Arc::new(AtomicUsize::new(usize::MAX));
        let seen_cb = Arc::clone(&seen);
        storage.register_num_dead_callback(Arc::new(move |n| {
            seen_cb.store(n, Ordering::SeqCst);
        }));

        let keep = HeapString::new("keep");
        let _h1 = storage.acquire(&keep);
        let _h2 = storage.acquire(&HeapString::new("drop-1"));
        let _h3 = storage.acquire(&HeapString::new("drop-2"));

        assert_eq!(storage.report_num_dead(), 2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        storage.clear_num_dead_callback();
        seen.store(0, Ordering::SeqCst);
        storage.report_num_dead();
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_mark_dead_is_advisory() {
        let storage = WeakStorage::new("test");
        let value = HeapString::new("abc");
        let handle = storage.acquire(&value);
        handle.mark_dead();
        assert!(handle.is_marked_dead());
        assert!(handle.peek().is_some());
    }
}
