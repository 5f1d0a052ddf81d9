//! Property-based testing for difftree
//!
//! Uses proptest to check the snapshot table and the file format against
//! randomly generated keys and records.

use ::difftree::codec::{write_snapshot, SnapshotReader};
use ::difftree::table::Insert;
use ::difftree::*;
use chrono::Local;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;

/// Generate relative keys the way a walk would produce them
fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    let component = prop_oneof![
        "[a-z]{1,10}",
        "dir[0-9]{1,3}",
        "[a-z]{1,8}\\.(txt|rs|md|gz)",
        "[a-zA-Z0-9 _|=-]{1,12}",
    ];
    prop::collection::vec(component, 1..=4).prop_map(|parts| parts.join("/").into_bytes())
}

fn kind_strategy() -> impl Strategy<Value = EntryKind> {
    prop_oneof![
        Just(EntryKind::Regular),
        Just(EntryKind::Directory),
        Just(EntryKind::Symlink),
        Just(EntryKind::Fifo),
        Just(EntryKind::CharDevice),
        Just(EntryKind::BlockDevice),
        Just(EntryKind::Socket),
        Just(EntryKind::Unknown),
    ]
}

/// Content a regular file may carry: nothing, either digest, or counts
fn content_strategy() -> impl Strategy<Value = ContentSummary> {
    prop_oneof![
        Just(ContentSummary::None),
        prop::collection::vec(any::<u8>(), 16).prop_map(|bytes| {
            ContentSummary::Digest(ContentDigest::new(DigestKind::Legacy16, bytes).unwrap())
        }),
        prop::collection::vec(any::<u8>(), 32).prop_map(|bytes| {
            ContentSummary::Digest(ContentDigest::new(DigestKind::Strong32, bytes).unwrap())
        }),
        (any::<u64>(), any::<u64>()).prop_map(|(bytes, lines)| ContentSummary::Counts { bytes, lines }),
    ]
}

/// Generate a record; only regular files carry content
fn record_strategy() -> impl Strategy<Value = FileRecord> {
    (
        kind_strategy(),
        any::<u64>(),
        any::<u32>(),
        any::<u32>(),
        0u16..0o10000,
        any::<i64>(),
        any::<i64>(),
        any::<i64>(),
        (any::<u64>(), any::<u32>(), any::<u64>()),
        content_strategy(),
    )
        .prop_map(
            |(kind, size, uid, gid, permissions, mtime, atime, ctime, (inode, hardlinks, blocks), content)| {
                let content = if kind == EntryKind::Regular {
                    content
                } else {
                    ContentSummary::None
                };
                FileRecord {
                    kind,
                    size,
                    uid,
                    gid,
                    permissions,
                    mtime,
                    atime,
                    ctime,
                    inode,
                    hardlinks,
                    blocks,
                    content,
                }
            },
        )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_table_keys_unique(keys in prop::collection::vec(key_strategy(), 0..300)) {
        let mut table: HashTable<usize> = HashTable::init(4);
        let mut model = BTreeMap::new();

        for (i, key) in keys.iter().enumerate() {
            let inserted = table.insert_unique(key, i);
            match model.entry(key.clone()) {
                std::collections::btree_map::Entry::Vacant(slot) => {
                    prop_assert_eq!(inserted, Insert::Inserted);
                    slot.insert(i);
                }
                std::collections::btree_map::Entry::Occupied(_) => {
                    prop_assert_eq!(inserted, Insert::Duplicate(i));
                }
            }
            table = table.grow_if_needed();
        }

        prop_assert_eq!(table.record_count(), model.len());
        prop_assert!(!table.needs_growth());
        for (key, value) in &model {
            prop_assert_eq!(table.lookup(key), Some(value));
        }

        let mut seen = 0usize;
        table.traverse(|_, _| {
            seen += 1;
            std::ops::ControlFlow::Continue(())
        });
        prop_assert_eq!(seen, model.len());
    }

    #[test]
    fn prop_snapshot_survives_write_and_read(
        entries in prop::collection::btree_map(key_strategy(), record_strategy(), 0..60)
    ) {
        let mut snapshot = Snapshot::init(8);
        for (key, record) in &entries {
            let _ = snapshot.insert_unique(key, record.clone());
            snapshot = snapshot.grow_if_needed();
        }

        let mut out = Vec::new();
        let written = write_snapshot(
            &mut out,
            &snapshot,
            Path::new("/srv/prop"),
            ScanMode::Hash,
            &Local::now(),
        ).unwrap();
        prop_assert_eq!(written, entries.len());

        let mut reader = SnapshotReader::new(Cursor::new(out)).unwrap();
        let mut read = 0usize;
        while let Some(loaded) = reader.next_record().unwrap() {
            prop_assert_eq!(entries.get(&loaded.key), Some(&loaded.record));
            read += 1;
        }
        prop_assert_eq!(read, entries.len());
    }
}
