//! Heap values
//!
//! A [`HeapString`] is a strong reference to an immutable string object
//! owned by the collector. The collector is modelled by reference counting:
//! once the last `HeapString` for an object is dropped the object is gone,
//! and every weak handle to it stops resolving.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Size of a string object header, in bytes
pub const STRING_HEADER_BYTES: usize = 24;

/// Size of the backing array header, in bytes
pub const ARRAY_HEADER_BYTES: usize = 16;

/// Strong reference to a collector-managed string
///
/// Cloning copies the reference, not the string. Identity comparisons go
/// through [`HeapString::ptr_eq`]; `==` compares content.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapString(Arc<str>);

impl HeapString {
    /// Allocate a new string object
    pub fn new(s: &str) -> Self {
        HeapString(Arc::from(s))
    }

    /// Identity comparison
    #[inline]
    pub fn ptr_eq(a: &HeapString, b: &HeapString) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Approximate bytes retained by this object
    pub fn literal_size(&self) -> usize {
        STRING_HEADER_BYTES + ARRAY_HEADER_BYTES + align_up(self.0.len(), 8)
    }

    pub(crate) fn downgrade(&self) -> std::sync::Weak<str> {
        Arc::downgrade(&self.0)
    }

    pub(crate) fn from_arc(inner: Arc<str>) -> Self {
        HeapString(inner)
    }
}

#[inline]
fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

impl Deref for HeapString {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for HeapString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for HeapString {
    fn from(s: &str) -> Self {
        HeapString::new(s)
    }
}

impl From<String> for HeapString {
    fn from(s: String) -> Self {
        HeapString(Arc::from(s))
    }
}

impl fmt::Debug for HeapString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HeapString({:?} @ {:p})", &*self.0, Arc::as_ptr(&self.0))
    }
}

impl fmt::Display for HeapString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
