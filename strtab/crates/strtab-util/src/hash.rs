//! String hashing
//!
//! Two hash functions are in play:
//!
//! - [`java_hash`]: `h = 31 * h + unit` over UTF-16 code units. Cheap,
//!   deterministic and stable across runs, which is what lets snapshots
//!   persist it. Also trivially attackable: `"Aa"` and `"BB"` collide, and
//!   so does every concatenation of them.
//! - [`alt_hash`]: a keyed `ahash` over the UTF-8 bytes. Used only once a
//!   table has seen a pathological chain and has been rehashed.

use ahash::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hasher};

/// Default string hash over UTF-16 code units.
///
/// # Examples
///
/// ```rust
/// use strtab_util::java_hash;
///
/// assert_eq!(java_hash(""), 0);
/// assert_eq!(java_hash("Aa"), java_hash("BB"));
/// ```
#[inline]
pub fn java_hash(s: &str) -> u32 {
    s.encode_utf16()
        .fold(0u32, |h, unit| h.wrapping_mul(31).wrapping_add(u32::from(unit)))
}

/// Seed for the alternate hash
///
/// Carries the derived `ahash` state so hashing does not rebuild keys on
/// every call. Equality is by seed.
#[derive(Clone)]
pub struct AltHashSeed {
    seed: u64,
    state: RandomState,
}

impl AltHashSeed {
    /// Build from an explicit seed (tests and diagnostics)
    pub fn from_seed(seed: u64) -> Self {
        let state = RandomState::with_seeds(
            seed,
            seed.rotate_left(17) ^ 0x9e37_79b9_7f4a_7c15,
            seed.rotate_left(31) ^ 0xc2b2_ae3d_27d4_eb4f,
            seed.rotate_left(47) ^ 0x1656_67b1_9e37_79f9,
        );
        Self { seed, state }
    }

    /// Draw a fresh, non-zero random seed
    pub fn compute() -> Self {
        loop {
            let seed = rand::random::<u64>();
            if seed != 0 {
                return Self::from_seed(seed);
            }
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl PartialEq for AltHashSeed {
    fn eq(&self, other: &Self) -> bool {
        self.seed == other.seed
    }
}

impl Eq for AltHashSeed {}

impl fmt::Debug for AltHashSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AltHashSeed({:#018x})", self.seed)
    }
}

/// Seeded alternate hash, truncated to 32 bits
#[inline]
pub fn alt_hash(seed: &AltHashSeed, s: &str) -> u32 {
    let mut hasher = seed.state.build_hasher();
    hasher.write(s.as_bytes());
    let h = hasher.finish();
    (h ^ (h >> 32)) as u32
}

/// Which hash function a table was built with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashEpoch {
    /// [`java_hash`]
    Default,
    /// [`alt_hash`] with the given seed
    Alternate(AltHashSeed),
}

impl HashEpoch {
    #[inline]
    pub fn hash(&self, s: &str) -> u32 {
        match self {
            HashEpoch::Default => java_hash(s),
            HashEpoch::Alternate(seed) => alt_hash(seed, s),
        }
    }

    pub fn is_alternate(&self) -> bool {
        matches!(self, HashEpoch::Alternate(_))
    }

    /// Seed value, 0 for the default epoch
    pub fn seed(&self) -> u64 {
        match self {
            HashEpoch::Default => 0,
            HashEpoch::Alternate(seed) => seed.seed(),
        }
    }
}

impl Default for HashEpoch {
    fn default() -> Self {
        HashEpoch::Default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_java_hash_known_values() {
        assert_eq!(java_hash(""), 0);
        assert_eq!(java_hash("a"), 97);
        assert_eq!(java_hash("abc"), 96354);
        assert_eq!(java_hash("hello"), 99162322);
    }

    #[test]
    fn test_java_hash_uses_utf16_units() {
        // U+1F600 is a surrogate pair: 0xD83D 0xDE00
        let expected = 0xD83Du32.wrapping_mul(31).wrapping_add(0xDE00);
        assert_eq!(java_hash("\u{1F600}"), expected);
    }

    #[test]
    fn test_java_hash_collision_family() {
        assert_eq!(java_hash("Aa"), java_hash("BB"));
        assert_eq!(java_hash("AaAa"), java_hash("BBBB"));
        assert_eq!(java_hash("AaBB"), java_hash("BBAa"));
    }

    #[test]
    fn test_alt_hash_breaks_collision_family() {
        let seed = AltHashSeed::from_seed(0x5eed);
        let words = ["AaAaAa", "AaAaBB", "AaBBAa", "AaBBBB", "BBAaAa", "BBAaBB"];
        let mut hashes: Vec<u32> = words.iter().map(|w| alt_hash(&seed, w)).collect();
        hashes.sort_unstable();
        hashes.dedup();
        assert!(hashes.len() > 1);
    }

    #[test]
    fn test_alt_hash_seed_dependent() {
        let a = AltHashSeed::from_seed(1);
        let b = AltHashSeed::from_seed(2);
        let differs = (0..32)
            .map(|i| format!("key-{}", i))
            .any(|k| alt_hash(&a, &k) != alt_hash(&b, &k));
        assert!(differs);
    }

    #[test]
    fn test_compute_seed_non_zero() {
        for _ in 0..16 {
            assert_ne!(AltHashSeed::compute().seed(), 0);
        }
    }

    #[test]
    fn test_epoch_dispatch() {
        assert_eq!(HashEpoch::Default.hash("hello"), java_hash("hello"));
        assert_eq!(HashEpoch::Default.seed(), 0);
        assert!(!HashEpoch::Default.is_alternate());

        let seed = AltHashSeed::from_seed(42);
        let epoch = HashEpoch::Alternate(seed.clone());
        assert_eq!(epoch.hash("hello"), alt_hash(&seed, "hello"));
        assert_eq!(epoch.seed(), 42);
        assert!(epoch.is_alternate());
    }

    #[quickcheck]
    fn prop_java_hash_deterministic(s: String) -> bool {
        java_hash(&s) == java_hash(&s.clone())
    }

    #[quickcheck]
    fn prop_alt_hash_deterministic(seed: u64, s: String) -> bool {
        let a = AltHashSeed::from_seed(seed);
        let b = AltHashSeed::from_seed(seed);
        alt_hash(&a, &s) == alt_hash(&b, &s)
    }
}
