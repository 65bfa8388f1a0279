//! Fuzz target for the association tag codec.
//!
//! Run with: cargo +nightly fuzz run fuzz_tag_codec
//!
//! Splits the input into tags on newlines, then checks that every decoded
//! tag re-encodes to itself and that add/remove keep their guarantees.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tether_core::EntityType;
use tether_core::keyword::{self, AssociationTag};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let tags: Vec<String> = s.lines().map(str::to_string).collect();

    for tag in &tags {
        if let Some(parsed) = AssociationTag::parse(tag) {
            assert_eq!(&parsed.to_string(), tag);
        }
    }

    let all = keyword::extract_ids(&tags, None);
    let initiatives = keyword::extract_ids(&tags, Some(EntityType::Initiative));
    assert!(initiatives.iter().all(|id| all.contains(id)));

    if let Some(id) = tags.first().filter(|t| !t.is_empty() && !t.contains('|')) {
        let added = keyword::add(&tags, EntityType::Initiative, id);
        assert_eq!(keyword::add(&added, EntityType::Initiative, id), added);
        let removed = keyword::remove(&added, EntityType::Initiative, id);
        assert!(!removed.contains(&keyword::encode_reference(EntityType::Initiative, id)));
    }
});
