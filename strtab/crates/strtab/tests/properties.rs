//! Property tests over random workloads

mod common;

use common::{assert_all_canonical, TableFixture};
use proptest::prelude::*;
use std::collections::HashSet;
use strtab::{ArchiveImage, ArchiveWriter, HeapString, RefEncoding};
use strtab_util::java_hash;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Interning any sequence yields one object per distinct content
    #[test]
    fn prop_intern_canonical(words in prop::collection::vec("[a-z]{0,6}", 1..200)) {
        let fixture = TableFixture::quiet(4);
        let values: Vec<HeapString> = words.iter().map(|w| fixture.table.intern(w)).collect();

        assert_all_canonical(&values);
        let distinct: HashSet<&str> = words.iter().map(String::as_str).collect();
        prop_assert_eq!(fixture.table.table().item_count(), distinct.len());
        prop_assert_eq!(fixture.table.verify_and_compare_entries(), 0);
    }

    /// Maintenance never loses a live value nor revives a dead one
    #[test]
    fn prop_maintenance_preserves_live_set(
        live in prop::collection::hash_set("[a-z]{1,8}", 1..100),
        dead in prop::collection::hash_set("[A-Z]{1,8}", 0..100),
        rounds in 1usize..4,
    ) {
        let fixture = TableFixture::quiet(1);
        let held: Vec<HeapString> = live.iter().map(|w| fixture.table.intern(w)).collect();
        drop(dead.iter().map(|w| fixture.table.intern(w)).collect::<Vec<_>>());

        for _ in 0..rounds {
            let num_dead = fixture.table.storage().num_dead();
            fixture.table.gc_notify(num_dead);
            fixture.table.run_pending_work().expect("maintenance runs");
        }

        for value in &held {
            let found = fixture.table.lookup(value).expect("live value present");
            prop_assert!(HeapString::ptr_eq(&found, value));
        }
        for word in &dead {
            prop_assert!(fixture.table.lookup(word).is_none());
        }
        prop_assert!(fixture.table.table().item_count() >= held.len());
        prop_assert_eq!(fixture.table.verify(), 0);
    }

    /// Every string written to an image is found again by content
    #[test]
    fn prop_image_lookup(words in prop::collection::hash_set("\\PC{0,12}", 0..64), narrow in any::<bool>()) {
        let encoding = if narrow { RefEncoding::Narrow } else { RefEncoding::Offset };
        let mut writer = ArchiveWriter::new(encoding);
        for w in &words {
            writer.add(w);
        }
        let image = ArchiveImage::from_bytes(writer.finish().expect("encodes")).expect("valid");
        prop_assert_eq!(image.entries().len(), words.len());

        let overlay = strtab::ArchiveOverlayTable::from_image(image);
        for w in &words {
            let found = overlay.lookup(w, java_hash(w));
            prop_assert_eq!(found.as_deref(), Some(w.as_str()));
        }
    }
}
