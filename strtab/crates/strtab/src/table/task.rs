//! Incremental structural tasks
//!
//! Grow, rehash and bulk-delete walk the bucket array a chunk at a time so
//! the maintenance context can stop at a pause point between chunks.
//!
//! ```text
//!            prepare()            do_chunk() == false      commit()
//!   Idle ───────────────▶ Running ─────────────────────────────────▶ Done
//!                          │  ▲
//!            yield_point() │  │ resume()
//!                          ▼  │
//!                         Paused
//! ```
//!
//! Only one task can own a table at a time; `prepare` returns false when
//! another one already does. Grow and rehash migrate into a new table and
//! publish it at commit; bulk-delete edits buckets in place.

use super::{InternTable, Table, WeakSlot};
use crate::error::{Result, StrtabError};
use crate::pause::PauseHook;
use parking_lot::MutexGuard;
use std::sync::Arc;
use std::time::{Duration, Instant};
use strtab_util::{AltHashSeed, HashEpoch};

/// Lifecycle of an incremental task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
    Paused,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    /// Double the bucket count
    Grow,
    /// Same size, alternate hash with the given seed
    Rehash(AltHashSeed),
    /// Unlink and release dead slots in place
    BulkDelete,
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Grow => "Grow",
            TaskKind::Rehash(_) => "Rehash",
            TaskKind::BulkDelete => "BulkDelete",
        }
    }
}

/// What a committed task did
#[derive(Debug, Clone)]
pub struct TaskSummary {
    pub kind: TaskKind,
    pub old_size: usize,
    pub new_size: usize,
    /// Slots looked at
    pub examined: usize,
    /// Live slots copied to the new table
    pub moved: usize,
    /// Dead slots unlinked and released
    pub reclaimed: usize,
    pub duration: Duration,
}

impl TaskSummary {
    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }
}

/// A resumable pass over every bucket of the active table
pub struct IncrementalTask<'a> {
    table: &'a InternTable,
    kind: TaskKind,
    state: TaskState,
    guard: Option<MutexGuard<'a, ()>>,
    source: Option<Arc<Table>>,
    target: Option<Arc<Table>>,
    cursor: usize,
    chunk: usize,
    examined: usize,
    moved: usize,
    reclaimed: usize,
    started: Option<Instant>,
}

impl<'a> IncrementalTask<'a> {
    fn new(table: &'a InternTable, kind: TaskKind) -> Self {
        Self {
            table,
            kind,
            state: TaskState::Idle,
            guard: None,
            source: None,
            target: None,
            cursor: 0,
            chunk: table.chunk_buckets().max(1),
            examined: 0,
            moved: 0,
            reclaimed: 0,
            started: None,
        }
    }

    pub fn grow(table: &'a InternTable) -> Self {
        Self::new(table, TaskKind::Grow)
    }

    pub fn rehash(table: &'a InternTable, seed: AltHashSeed) -> Self {
        Self::new(table, TaskKind::Rehash(seed))
    }

    pub fn bulk_delete(table: &'a InternTable) -> Self {
        Self::new(table, TaskKind::BulkDelete)
    }

    /// Override the buckets processed per chunk
    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk.max(1);
        self
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    /// Take ownership of the table
    ///
    /// False when another task is in flight or, for growth, the table is
    /// already at its maximum size. A task that fails to prepare stays
    /// `Idle` and can simply be dropped.
    pub fn prepare(&mut self) -> bool {
        if self.state != TaskState::Idle {
            return false;
        }

        let guard = match self.table.resize_lock().try_lock() {
            Some(guard) => guard,
            None => return false,
        };

        let source = self.table.active();
        let target = match &self.kind {
            TaskKind::Grow => {
                if source.size_log2 >= self.table.max_size_log2() {
                    return false;
                }
                Some(Table::new(source.size_log2 + 1, source.epoch.clone()))
            }
            TaskKind::Rehash(seed) => {
                Some(Table::new(source.size_log2, HashEpoch::Alternate(seed.clone())))
            }
            TaskKind::BulkDelete => None,
        };

        if let Some(target) = target {
            let target = Arc::new(target);
            source.next.store(Some(Arc::clone(&target)));
            self.target = Some(target);
        }

        self.guard = Some(guard);
        self.source = Some(source);
        self.started = Some(Instant::now());
        self.state = TaskState::Running;
        true
    }

    /// Process the next chunk of buckets; true while more remain
    pub fn do_chunk(&mut self) -> Result<bool> {
        self.expect(TaskState::Running)?;
        let source = self.source_table()?;

        let target = self.target.clone();
        let end = (self.cursor + self.chunk).min(source.size());
        for index in self.cursor..end {
            match &target {
                Some(target) => self.migrate_bucket(&source, target, index),
                None => self.reap_bucket(&source, index),
            }
        }
        self.cursor = end;

        Ok(self.cursor < source.size())
    }

    /// Let a pending pause proceed between chunks
    pub fn yield_point(&mut self, hook: &dyn PauseHook) -> Result<()> {
        self.expect(TaskState::Running)?;
        self.state = TaskState::Paused;
        hook.pause_point();
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        self.expect(TaskState::Paused)?;
        self.state = TaskState::Running;
        Ok(())
    }

    /// Publish the result and give up ownership of the table
    pub fn commit(&mut self) -> Result<TaskSummary> {
        self.expect(TaskState::Running)?;
        let source = self.source_table()?;
        if self.cursor < source.size() {
            return Err(StrtabError::InvalidState {
                expected: format!("all {} buckets processed", source.size()),
                actual: format!("{} processed", self.cursor),
            });
        }

        let new_size = match self.target.take() {
            Some(target) => {
                let size = target.size();
                self.table.install(target);
                size
            }
            None => source.size(),
        };

        self.guard = None;
        self.state = TaskState::Done;

        Ok(TaskSummary {
            kind: self.kind.clone(),
            old_size: source.size(),
            new_size,
            examined: self.examined,
            moved: self.moved,
            reclaimed: self.reclaimed,
            duration: self.started.map(|s| s.elapsed()).unwrap_or_default(),
        })
    }

    fn expect(&self, expected: TaskState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(StrtabError::InvalidState {
                expected: format!("{:?}", expected),
                actual: format!("{:?}", self.state),
            })
        }
    }

    fn source_table(&self) -> Result<Arc<Table>> {
        self.source
            .clone()
            .ok_or_else(|| StrtabError::Internal("running task without a source table".into()))
    }

    fn migrate_bucket(&mut self, source: &Table, target: &Table, index: usize) {
        let storage = self.table.storage();
        let bucket = &source.buckets[index];
        let _old = bucket.lock.lock();
        let same_epoch = source.epoch == target.epoch;

        for slot in bucket.slots.load().iter() {
            self.examined += 1;
            let value = match slot.resolve() {
                Some(value) => value,
                None => {
                    slot.release(storage);
                    self.table.item_removed();
                    self.reclaimed += 1;
                    continue;
                }
            };

            let hash = if same_epoch {
                slot.hash
            } else {
                target.epoch.hash(&value)
            };
            let dest = target.bucket_for(hash);
            let _new = dest.lock.lock();
            let current = dest.slots.load();
            let mut moved = Vec::with_capacity(current.len() + 1);
            moved.extend(current.iter().cloned());
            moved.push(slot.rehashed(hash));
            dest.slots.store(Arc::new(moved));
            self.moved += 1;
        }

        bucket.redirected.store(true, std::sync::atomic::Ordering::Release);
    }

    fn reap_bucket(&mut self, source: &Table, index: usize) {
        let bucket = &source.buckets[index];
        let _guard = bucket.lock.lock();
        let slots = bucket.slots.load_full();
        self.examined += slots.len();

        if !slots.iter().any(WeakSlot::is_dead) {
            return;
        }

        let (dead, live): (Vec<WeakSlot>, Vec<WeakSlot>) =
            slots.iter().cloned().partition(WeakSlot::is_dead);
        bucket.slots.store(Arc::new(live));

        let storage = self.table.storage();
        for slot in dead {
            slot.release(storage);
            self.table.item_removed();
            self.reclaimed += 1;
        }
    }
}

impl Drop for IncrementalTask<'_> {
    fn drop(&mut self) {
        if !matches!(self.state, TaskState::Running | TaskState::Paused) {
            return;
        }

        log::warn!(
            "{} task dropped before commit, finishing at bucket {}",
            self.kind.name(),
            self.cursor
        );
        self.state = TaskState::Running;
        while let Ok(true) = self.do_chunk() {}
        if let Err(e) = self.commit() {
            log::error!("{} task could not finish: {}", self.kind.name(), e);
        }
    }
}

/// Drive a task to completion
///
/// Returns `None` when the task could not start.
pub fn run_task(task: &mut IncrementalTask<'_>, hook: &dyn PauseHook) -> Result<Option<TaskSummary>> {
    if !task.prepare() {
        return Ok(None);
    }
    while task.do_chunk()? {
        task.yield_point(hook)?;
        task.resume()?;
    }
    task.commit().map(Some)
}
