//! Snapshot images
//!
//! A snapshot is a precomputed, immutable string table written at build
//! time and loaded at startup. Layout, all integers little-endian:
//!
//! ```text
//! +0   magic         "STRA"
//! +4   version       u32 (1)
//! +8   encoding      u8  (0 = offset, 1 = narrow), 3 bytes padding
//! +12  entry_count   u32
//! +16  hash_seed     u64 (0 = default hash)
//! +24  heap_len      u32
//! +28  object_count  u32
//! +32  entries       entry_count x { hash: u32, value: u32 }, sorted by hash
//! ...  heap region   object_count x { len: u32, utf8 bytes }
//! ```
//!
//! With the offset encoding an entry's value is the byte offset of its
//! record inside the heap region; with the narrow encoding it is the
//! record's index. Hashes are always the default hash so that any process
//! can probe the image without knowing a seed.
//!
//! An image read from a file through `memmap2` is *mapped*: its heap region
//! is fixed for the process lifetime. An image built from bytes in memory is
//! *loaded* and treated as relocatable, which means its strings must be
//! transferred into the mutable table at startup.
//!
//! Either way every record is decoded into an owned [`HeapString`] while
//! parsing, and the mapping is dropped once parsing is done. [`HeapMapping`]
//! only decides whether the overlay keeps the strings or hands them to the
//! mutable table.

use crate::error::{Result, StrtabError};
use crate::heap::HeapString;
use crate::malformed;
use indexmap::IndexSet;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use strtab_util::java_hash;

pub const ARCHIVE_MAGIC: [u8; 4] = *b"STRA";
pub const ARCHIVE_VERSION: u32 = 1;
pub const HEADER_LEN: usize = 32;
pub const ENTRY_LEN: usize = 8;

/// How entry values refer to heap records
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefEncoding {
    /// Base-relative byte offset
    Offset,
    /// Compressed reference: record index
    Narrow,
}

impl RefEncoding {
    fn to_byte(self) -> u8 {
        match self {
            RefEncoding::Offset => 0,
            RefEncoding::Narrow => 1,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(RefEncoding::Offset),
            1 => Some(RefEncoding::Narrow),
            _ => None,
        }
    }
}

/// Whether the heap region can move
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeapMapping {
    Mapped,
    Loaded,
}

/// One entry of the sorted index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub hash: u32,
    pub value: u32,
}

/// The decoded heap region
#[derive(Debug)]
pub struct ArchiveHeap {
    objects: Vec<HeapString>,
    offsets: Vec<u32>,
    mapping: HeapMapping,
}

impl ArchiveHeap {
    /// Resolve an entry value to its string
    pub fn decode(&self, raw: u32, encoding: RefEncoding) -> Option<HeapString> {
        let index = match encoding {
            RefEncoding::Narrow => raw as usize,
            RefEncoding::Offset => self.offsets.binary_search(&raw).ok()?,
        };
        self.objects.get(index).cloned()
    }

    pub fn mapping(&self) -> HeapMapping {
        self.mapping
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn objects(&self) -> &[HeapString] {
        &self.objects
    }
}

/// A validated snapshot
pub struct ArchiveImage {
    encoding: RefEncoding,
    hash_seed: u64,
    entries: Vec<ArchiveEntry>,
    heap: ArchiveHeap,
}

impl ArchiveImage {
    /// Parse an image held in memory; the result is relocatable
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let (encoding, hash_seed, entries, heap) = parse(&bytes, HeapMapping::Loaded)?;
        Ok(Self {
            encoding,
            hash_seed,
            entries,
            heap,
        })
    }

    /// Map an image file; the result is fixed
    pub fn map_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        // SAFETY: the mapping is read-only and lives only until `parse` has
        // copied every record out; the file must not change in that window.
        let map = unsafe { Mmap::map(&file)? };
        let (encoding, hash_seed, entries, heap) = parse(&map, HeapMapping::Mapped)?;
        drop(map);
        log::debug!(
            "Mapped snapshot {} ({} entries)",
            path.as_ref().display(),
            entries.len()
        );
        Ok(Self {
            encoding,
            hash_seed,
            entries,
            heap,
        })
    }

    /// Read an image file into memory; the result is relocatable
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_bytes(std::fs::read(path)?)
    }

    pub fn encoding(&self) -> RefEncoding {
        self.encoding
    }

    pub fn hash_seed(&self) -> u64 {
        self.hash_seed
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn heap(&self) -> &ArchiveHeap {
        &self.heap
    }

    pub(crate) fn into_parts(self) -> (RefEncoding, Vec<ArchiveEntry>, ArchiveHeap) {
        (self.encoding, self.entries, self.heap)
    }
}

impl std::fmt::Debug for ArchiveImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveImage")
            .field("encoding", &self.encoding)
            .field("entries", &self.entries.len())
            .field("mapping", &self.heap.mapping)
            .finish()
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}

fn parse(
    bytes: &[u8],
    mapping: HeapMapping,
) -> Result<(RefEncoding, u64, Vec<ArchiveEntry>, ArchiveHeap)> {
    if bytes.len() < HEADER_LEN {
        malformed!("image of {} bytes is shorter than the header", bytes.len());
    }
    if bytes[0..4] != ARCHIVE_MAGIC {
        malformed!("bad magic {:?}", &bytes[0..4]);
    }
    let version = read_u32(bytes, 4);
    if version != ARCHIVE_VERSION {
        malformed!("unsupported version {}", version);
    }
    let encoding = match RefEncoding::from_byte(bytes[8]) {
        Some(e) => e,
        None => malformed!("unknown reference encoding {}", bytes[8]),
    };
    let entry_count = read_u32(bytes, 12) as usize;
    let hash_seed = read_u64(bytes, 16);
    if hash_seed != 0 {
        malformed!("entries hashed with seed {:#x}, expected the default hash", hash_seed);
    }
    let heap_len = read_u32(bytes, 24) as usize;
    let object_count = read_u32(bytes, 28) as usize;

    let entries_end = HEADER_LEN + entry_count * ENTRY_LEN;
    if bytes.len() != entries_end + heap_len {
        malformed!(
            "expected {} bytes for {} entries and a {} byte heap, found {}",
            entries_end + heap_len,
            entry_count,
            heap_len,
            bytes.len()
        );
    }

    let heap_bytes = &bytes[entries_end..];
    // Every record takes at least its 4-byte length
    let capacity = object_count.min(heap_len / 4);
    let mut objects = Vec::with_capacity(capacity);
    let mut offsets = Vec::with_capacity(capacity);
    let mut at = 0usize;
    while at < heap_bytes.len() {
        if at + 4 > heap_bytes.len() {
            malformed!("truncated record header at heap offset {}", at);
        }
        let len = read_u32(heap_bytes, at) as usize;
        let start = at + 4;
        if start + len > heap_bytes.len() {
            malformed!("record at heap offset {} overruns the heap region", at);
        }
        let s = match std::str::from_utf8(&heap_bytes[start..start + len]) {
            Ok(s) => s,
            Err(e) => malformed!("record at heap offset {} is not UTF-8: {}", at, e),
        };
        offsets.push(at as u32);
        objects.push(HeapString::new(s));
        at = start + len;
    }
    if objects.len() != object_count {
        malformed!("header promises {} objects, heap holds {}", object_count, objects.len());
    }

    let heap = ArchiveHeap {
        objects,
        offsets,
        mapping,
    };

    let mut entries: Vec<ArchiveEntry> = Vec::with_capacity(entry_count);
    for i in 0..entry_count {
        let at = HEADER_LEN + i * ENTRY_LEN;
        let entry = ArchiveEntry {
            hash: read_u32(bytes, at),
            value: read_u32(bytes, at + 4),
        };
        if let Some(prev) = entries.last() {
            if prev.hash > entry.hash {
                malformed!("entry {} is out of hash order", i);
            }
        }
        let value = match heap.decode(entry.value, encoding) {
            Some(v) => v,
            None => malformed!("entry {} refers to nothing ({:#x})", i, entry.value),
        };
        if java_hash(&value) != entry.hash {
            malformed!("entry {} hash {:#x} does not match its string", i, entry.hash);
        }
        entries.push(entry);
    }

    Ok((encoding, hash_seed, entries, heap))
}

/// Builds a snapshot image from a set of strings
///
/// # Examples
///
/// ```rust
/// use strtab::archive::{ArchiveImage, ArchiveWriter, RefEncoding};
///
/// let mut writer = ArchiveWriter::new(RefEncoding::Offset);
/// writer.add("hello");
/// writer.add("world");
/// let image = ArchiveImage::from_bytes(writer.finish().unwrap()).unwrap();
/// assert_eq!(image.entries().len(), 2);
/// ```
#[derive(Debug)]
pub struct ArchiveWriter {
    encoding: RefEncoding,
    strings: IndexSet<String>,
}

impl ArchiveWriter {
    pub fn new(encoding: RefEncoding) -> Self {
        Self {
            encoding,
            strings: IndexSet::new(),
        }
    }

    /// Add one string; duplicates are ignored
    pub fn add(&mut self, s: &str) {
        if !self.strings.contains(s) {
            self.strings.insert(s.to_owned());
        }
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Encode the image
    pub fn finish(self) -> Result<Vec<u8>> {
        let mut heap = Vec::new();
        let mut entries = Vec::with_capacity(self.strings.len());

        for (index, s) in self.strings.iter().enumerate() {
            let offset = heap.len();
            let len = u32::try_from(s.len())
                .map_err(|_| StrtabError::SnapshotTooLarge { bytes: s.len() })?;
            heap.extend_from_slice(&len.to_le_bytes());
            heap.extend_from_slice(s.as_bytes());

            let value = match self.encoding {
                RefEncoding::Offset => offset,
                RefEncoding::Narrow => index,
            };
            let value = u32::try_from(value)
                .map_err(|_| StrtabError::SnapshotTooLarge { bytes: heap.len() })?;
            entries.push(ArchiveEntry {
                hash: java_hash(s),
                value,
            });
        }

        let heap_len =
            u32::try_from(heap.len()).map_err(|_| StrtabError::SnapshotTooLarge { bytes: heap.len() })?;
        let count = entries.len() as u32;
        entries.sort_by_key(|e| (e.hash, e.value));

        let mut out = Vec::with_capacity(HEADER_LEN + entries.len() * ENTRY_LEN + heap.len());
        out.extend_from_slice(&ARCHIVE_MAGIC);
        out.extend_from_slice(&ARCHIVE_VERSION.to_le_bytes());
        out.extend_from_slice(&[self.encoding.to_byte(), 0, 0, 0]);
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
        out.extend_from_slice(&heap_len.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        for e in &entries {
            out.extend_from_slice(&e.hash.to_le_bytes());
            out.extend_from_slice(&e.value.to_le_bytes());
        }
        out.extend_from_slice(&heap);

        log::debug!(
            "Encoded snapshot: {} strings, {} heap bytes",
            entries.len(),
            heap.len()
        );
        Ok(out)
    }
}
