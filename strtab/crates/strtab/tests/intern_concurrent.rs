//! Concurrency tests for interning
//!
//! Many threads race on the same content, with and without maintenance
//! running underneath them. Every test checks identity, not just equality.

mod common;

use common::{assert_all_canonical, TableFixture};
use std::sync::{Arc, Barrier};
use std::thread;
use strtab::{
    HeapString, LookupKey, NoPause, Safepoint, StartupOptions, StringTable, TableConfig, TableEvent,
    WorkKind,
};

// ============================================================================
// CANONICALIZATION
// ============================================================================

/// Every caller interning the same content gets the same object
///
/// **Bug this finds:** two winners in insert_if_absent
#[test]
fn test_concurrent_intern_same_content() {
    let fixture = Arc::new(TableFixture::quiet(16));
    let thread_count = 8;
    let barrier = Arc::new(Barrier::new(thread_count));

    let handles: Vec<_> = (0..thread_count)
        .map(|_| {
            let fixture = Arc::clone(&fixture);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..200)
                    .map(|i| fixture.table.intern(&format!("shared-{}", i)))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.join().expect("intern thread panicked"));
    }

    assert_all_canonical(&all);
    assert_eq!(fixture.table.table().item_count(), 200);
    assert_eq!(fixture.table.storage().allocated(), 200);
    assert_eq!(fixture.table.storage().double_releases(), 0);
    assert_eq!(fixture.table.verify_and_compare_entries(), 0);
}

/// Exactly one candidate is linked; the loser's cell is released once
///
/// **Bug this finds:** leaked or double-released weak cells on the race path
#[test]
fn test_race_loser_released_exactly_once() {
    let fixture = Arc::new(TableFixture::quiet(64));

    for round in 0..100 {
        let barrier = Arc::new(Barrier::new(2));
        let content = format!("race-{}", round);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let fixture = Arc::clone(&fixture);
                let barrier = Arc::clone(&barrier);
                let content = content.clone();
                thread::spawn(move || {
                    let table = fixture.table.table();
                    let value = HeapString::new(&content);
                    let candidate = table.storage().acquire(&value);
                    barrier.wait();
                    table.insert_if_absent(&value, candidate).value
                })
            })
            .collect();

        let results: Vec<HeapString> = handles
            .into_iter()
            .map(|h| h.join().expect("insert thread panicked"))
            .collect();
        assert!(HeapString::ptr_eq(&results[0], &results[1]));
    }

    let storage = fixture.table.storage();
    assert_eq!(storage.allocated(), 100);
    assert_eq!(storage.released_total(), 100);
    assert_eq!(storage.double_releases(), 0);
    assert_eq!(fixture.table.table().item_count(), 100);
}

// ============================================================================
// INTERNING DURING MAINTENANCE
// ============================================================================

/// Interning while the table grows never yields duplicates
///
/// **Bug this finds:** inserts lost into a bucket that was already migrated
#[test]
fn test_intern_during_grow() {
    let config = TableConfig {
        initial_size: 1,
        task_chunk_buckets: 1,
        background_maintenance: false,
        ..Default::default()
    };
    let table = Arc::new(
        StringTable::init(config, StartupOptions::default()).expect("valid config"),
    );
    let seeded: Vec<HeapString> = (0..64).map(|i| table.intern(&format!("seed-{}", i))).collect();

    let barrier = Arc::new(Barrier::new(5));
    let writers: Vec<_> = (0..4)
        .map(|t| {
            let table = Arc::clone(&table);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..500)
                    .map(|i| table.intern(&format!("w{}-{}", t % 2, i)))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    barrier.wait();
    let mut passes = Vec::new();
    for _ in 0..4 {
        table.gc_notify(0);
        passes.push(table.run_pending_work().expect("maintenance runs"));
    }
    assert!(passes.contains(&Some(WorkKind::Grow)));

    let mut all = seeded.clone();
    for writer in writers {
        all.extend(writer.join().expect("writer panicked"));
    }

    assert_all_canonical(&all);
    assert!(table.table().size() > 1);
    for value in &all {
        let found = table
            .table()
            .get(LookupKey::Value(value))
            .value
            .expect("live value reachable");
        assert!(HeapString::ptr_eq(&found, value));
    }
    assert_eq!(table.verify_and_compare_entries(), 0);
}

/// A task paused between chunks still lets mutators make progress
///
/// **Bug this finds:** writers blocked for the whole migration
#[test]
fn test_paused_task_allows_inserts() {
    let fixture = TableFixture::quiet(8);
    let held = fixture.intern_words("pre", 32);

    let table = fixture.table.table();
    let mut task = strtab::table::IncrementalTask::grow(table).with_chunk(2);
    assert!(task.prepare());
    assert!(task.do_chunk().expect("first chunk"));
    task.yield_point(&NoPause).expect("yield");

    let during = fixture.intern_words("during", 32);

    task.resume().expect("resume");
    while task.do_chunk().expect("chunk") {}
    let summary = task.commit().expect("commit");
    assert_eq!(summary.new_size, 16);

    let mut all = held;
    all.extend(during);
    all.extend(fixture.intern_words("pre", 32));
    all.extend(fixture.intern_words("during", 32));
    assert_all_canonical(&all);
    assert_eq!(fixture.table.table().item_count(), 64);
}

/// A maintenance pass blocked at a pause point resumes after release
///
/// **Bug this finds:** migration running through a requested pause, or
/// mutators stalled while the migrating context is parked
#[test]
fn test_grow_waits_at_safepoint() {
    let safepoint = Arc::new(Safepoint::new());
    let config = TableConfig {
        initial_size: 4,
        task_chunk_buckets: 1,
        background_maintenance: false,
        ..Default::default()
    };
    let options = StartupOptions {
        pause_hook: Arc::clone(&safepoint) as Arc<dyn strtab::PauseHook>,
        ..Default::default()
    };
    let table = Arc::new(StringTable::init(config, options).expect("valid config"));
    let held: Vec<HeapString> = (0..32).map(|i| table.intern(&format!("held-{}", i))).collect();
    assert!(table.gc_notify(0));

    safepoint.request();
    let worker = {
        let table = Arc::clone(&table);
        thread::spawn(move || table.run_pending_work().expect("maintenance runs"))
    };

    safepoint.wait_for_arrivals(1);
    assert!(table.table().is_task_in_flight());
    assert_eq!(table.table().size(), 4);

    let during: Vec<HeapString> = (0..32).map(|i| table.intern(&format!("paused-{}", i))).collect();
    for value in &held {
        let found = table.lookup(value).expect("live value visible");
        assert!(HeapString::ptr_eq(&found, value));
    }

    safepoint.release();
    let kind = worker.join().expect("worker panicked");
    assert_eq!(kind, Some(WorkKind::Grow));
    assert_eq!(safepoint.pauses_taken(), 1);
    assert!(!table.table().is_task_in_flight());
    assert_eq!(table.table().size(), 8);

    let mut all = held;
    all.extend(during);
    all.extend((0..32).map(|i| table.intern(&format!("held-{}", i))));
    all.extend((0..32).map(|i| table.intern(&format!("paused-{}", i))));
    assert_all_canonical(&all);
    assert_eq!(table.verify_and_compare_entries(), 0);
}

/// Reads run alongside a background worker without losing values
///
/// **Bug this finds:** readers missing values at the table swap
#[test]
fn test_lookup_during_background_maintenance() {
    let fixture = Arc::new(TableFixture::background(2));
    let held = Arc::new(fixture.intern_words("live", 256));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let fixture = Arc::clone(&fixture);
            let held = Arc::clone(&held);
            thread::spawn(move || {
                for _ in 0..20 {
                    for value in held.iter() {
                        let found = fixture.table.lookup(value).expect("live value visible");
                        assert!(HeapString::ptr_eq(&found, value));
                    }
                }
            })
        })
        .collect();

    fixture.table.storage().report_num_dead();
    for reader in readers {
        reader.join().expect("reader panicked");
    }

    assert!(common::wait_until(|| {
        fixture.table.table().size() > 2 && !fixture.table.has_work()
    }));
    assert!(
        fixture
            .table
            .events()
            .count(|e| matches!(e, TableEvent::Grown { .. }))
            >= 1
    );
    assert_eq!(fixture.table.verify_and_compare_entries(), 0);
}
