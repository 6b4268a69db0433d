//! Archive Overlay Table
//!
//! Read-only view over a snapshot's sorted entries, probed before the
//! mutable table. Entries are never added or removed; the only change an
//! overlay ever sees is being drained, after which it is permanently empty.
//!
//! The archived strings themselves stay resident after a drain: they are
//! part of the heap region and other code may still hold them. Only the
//! index goes away.

use crate::archive::{ArchiveEntry, ArchiveHeap, ArchiveImage, HeapMapping, RefEncoding};
use crate::error::fatal;
use crate::heap::HeapString;
use arc_swap::ArcSwapOption;
use serde::Serialize;
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shape of the overlay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayStatistics {
    pub entry_count: usize,
    pub literal_bytes: usize,
    pub encoding: Option<RefEncoding>,
    pub mapping: Option<HeapMapping>,
}

impl OverlayStatistics {
    pub fn print_to(&self, out: &mut String, name: &str) {
        let _ = writeln!(out, "{} statistics:", name);
        let _ = writeln!(out, "Number of entries       : {:>9}", self.entry_count);
        let _ = writeln!(out, "Literal bytes           : {:>9}", self.literal_bytes);
        if let (Some(encoding), Some(mapping)) = (self.encoding, self.mapping) {
            let _ = writeln!(out, "Encoding                : {:?}, {:?}", encoding, mapping);
        }
    }
}

/// The immutable snapshot-backed string table
pub struct ArchiveOverlayTable {
    index: ArcSwapOption<Vec<ArchiveEntry>>,
    heap: Option<Arc<ArchiveHeap>>,
    encoding: RefEncoding,
    drained: AtomicBool,
}

impl ArchiveOverlayTable {
    /// An overlay with nothing in it
    pub fn empty() -> Self {
        Self {
            index: ArcSwapOption::empty(),
            heap: None,
            encoding: RefEncoding::Offset,
            drained: AtomicBool::new(false),
        }
    }

    pub fn from_image(image: ArchiveImage) -> Self {
        let (encoding, entries, heap) = image.into_parts();
        log::debug!(
            "Shared string table: {} entries, {:?} heap",
            entries.len(),
            heap.mapping()
        );
        Self {
            index: ArcSwapOption::from_pointee(entries),
            heap: Some(Arc::new(heap)),
            encoding,
            drained: AtomicBool::new(false),
        }
    }

    /// Find `s`, whose default hash is `hash`
    pub fn lookup(&self, s: &str, hash: u32) -> Option<HeapString> {
        let index = self.index.load_full()?;
        let heap = self.heap.as_ref()?;

        let start = index.partition_point(|e| e.hash < hash);
        index[start..]
            .iter()
            .take_while(|e| e.hash == hash)
            .filter_map(|e| heap.decode(e.value, self.encoding))
            .find(|v| v.as_str() == s)
    }

    pub fn entry_count(&self) -> usize {
        self.index.load_full().map_or(0, |i| i.len())
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    /// Non-empty and backed by a heap region that may move
    pub fn requires_transfer(&self) -> bool {
        !self.is_empty()
            && self
                .heap
                .as_ref()
                .map_or(false, |h| h.mapping() == HeapMapping::Loaded)
    }

    pub fn is_drained(&self) -> bool {
        self.drained.load(Ordering::Acquire)
    }

    /// Visit every string the overlay currently answers for
    pub fn for_each(&self, mut f: impl FnMut(&HeapString)) {
        let (index, heap) = match (self.index.load_full(), self.heap.as_ref()) {
            (Some(index), Some(heap)) => (index, heap),
            _ => return,
        };
        for entry in index.iter() {
            if let Some(v) = heap.decode(entry.value, self.encoding) {
                f(&v);
            }
        }
    }

    /// Hand every entry to `f` and become permanently empty
    ///
    /// Runs at most once; later calls return 0. An entry that fails to
    /// decode here is fatal: half the strings would already be in the
    /// mutable table.
    pub fn drain(&self, mut f: impl FnMut(&HeapString)) -> usize {
        if self.drained.swap(true, Ordering::AcqRel) {
            return 0;
        }

        let index = match self.index.swap(None) {
            Some(index) => index,
            None => return 0,
        };
        let heap = match self.heap.as_ref() {
            Some(heap) => heap,
            None => fatal("shared string index without a heap region"),
        };

        for entry in index.iter() {
            match heap.decode(entry.value, self.encoding) {
                Some(v) => f(&v),
                None => fatal(&format!(
                    "shared string entry {:#x} does not decode",
                    entry.value
                )),
            }
        }
        index.len()
    }

    pub fn statistics(&self) -> OverlayStatistics {
        let mut literal_bytes = 0;
        self.for_each(|v| literal_bytes += v.literal_size());
        OverlayStatistics {
            entry_count: self.entry_count(),
            literal_bytes,
            encoding: self.heap.as_ref().map(|_| self.encoding),
            mapping: self.heap.as_ref().map(|h| h.mapping()),
        }
    }
}

impl Default for ArchiveOverlayTable {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for ArchiveOverlayTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveOverlayTable")
            .field("entries", &self.entry_count())
            .field("drained", &self.is_drained())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveWriter;
    use strtab_util::java_hash;

    fn overlay(words: &[&str], encoding: RefEncoding) -> ArchiveOverlayTable {
        let mut writer = ArchiveWriter::new(encoding);
        for w in words {
            writer.add(w);
        }
        let image = ArchiveImage::from_bytes(writer.finish().expect("encodes")).expect("valid");
        ArchiveOverlayTable::from_image(image)
    }

    #[test]
    fn test_lookup_hits_and_misses() {
        for encoding in [RefEncoding::Offset, RefEncoding::Narrow] {
            let o = overlay(&["hello", "world"], encoding);
            let hit = o.lookup("hello", java_hash("hello")).expect("present");
            assert_eq!(hit.as_str(), "hello");
            assert!(o.lookup("nope", java_hash("nope")).is_none());
            // Right content, wrong hash
            assert!(o.lookup("hello", java_hash("hello").wrapping_add(1)).is_none());
        }
    }

    #[test]
    fn test_lookup_returns_same_object() {
        let o = overlay(&["same"], RefEncoding::Offset);
        let a = o.lookup("same", java_hash("same")).expect("present");
        let b = o.lookup("same", java_hash("same")).expect("present");
        assert!(HeapString::ptr_eq(&a, &b));
    }

    #[test]
    fn test_colliding_hashes_resolved_by_content() {
        let o = overlay(&["Aa", "BB"], RefEncoding::Narrow);
        let h = java_hash("Aa");
        assert_eq!(o.lookup("Aa", h).expect("present").as_str(), "Aa");
        assert_eq!(o.lookup("BB", h).expect("present").as_str(), "BB");
    }

    #[test]
    fn test_drain_once() {
        let o = overlay(&["a", "b", "c"], RefEncoding::Offset);
        assert!(o.requires_transfer());

        let mut seen = Vec::new();
        assert_eq!(o.drain(|v| seen.push(v.to_string())), 3);
        seen.sort();
        assert_eq!(seen, vec!["a", "b", "c"]);

        assert!(o.is_empty());
        assert!(o.is_drained());
        assert!(!o.requires_transfer());
        assert!(o.lookup("a", java_hash("a")).is_none());
        assert_eq!(o.drain(|_| panic!("second drain visited an entry")), 0);
    }

    #[test]
    fn test_empty_overlay() {
        let o = ArchiveOverlayTable::empty();
        assert!(o.is_empty());
        assert!(!o.requires_transfer());
        assert!(o.lookup("x", java_hash("x")).is_none());
        assert_eq!(o.statistics().entry_count, 0);
    }

    #[test]
    fn test_statistics() {
        let o = overlay(&["abc"], RefEncoding::Narrow);
        let stats = o.statistics();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.literal_bytes, HeapString::new("abc").literal_size());
        assert_eq!(stats.encoding, Some(RefEncoding::Narrow));
        assert_eq!(stats.mapping, Some(HeapMapping::Loaded));
    }
}
