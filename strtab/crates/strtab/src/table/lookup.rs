//! Lookup keys
//!
//! A bucket scan compares candidates with one of two strategies: against
//! raw characters (the caller has no string object yet) or against an
//! existing string object (interning a value someone already allocated).

use crate::heap::HeapString;

/// What a bucket scan is looking for
#[derive(Debug, Clone, Copy)]
pub enum LookupKey<'a> {
    /// Content given as characters
    Chars(&'a str),
    /// Content of an existing string object
    Value(&'a HeapString),
}

impl<'a> LookupKey<'a> {
    #[inline]
    pub fn as_str(&self) -> &'a str {
        match *self {
            LookupKey::Chars(s) => s,
            LookupKey::Value(v) => v.as_str(),
        }
    }

    /// Does `candidate` hold the content this key describes
    #[inline]
    pub fn matches(&self, candidate: &HeapString) -> bool {
        match *self {
            LookupKey::Chars(s) => candidate.as_str() == s,
            LookupKey::Value(v) => HeapString::ptr_eq(v, candidate) || v.as_str() == candidate.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chars_matches_by_content() {
        let s = HeapString::new("abc");
        assert!(LookupKey::Chars("abc").matches(&s));
        assert!(!LookupKey::Chars("abd").matches(&s));
    }

    #[test]
    fn test_value_matches_identity_or_content() {
        let a = HeapString::new("abc");
        let b = HeapString::new("abc");
        assert!(LookupKey::Value(&a).matches(&a));
        assert!(LookupKey::Value(&a).matches(&b));
        assert!(!LookupKey::Value(&a).matches(&HeapString::new("x")));
        assert_eq!(LookupKey::Value(&a).as_str(), "abc");
    }
}
