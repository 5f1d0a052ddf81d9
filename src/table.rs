//! Growable snapshot table
//!
//! [`HashTable`] maps a byte-string key (a path relative to the snapshot
//! root) to a record. It is a separate-chaining table with a prime bucket
//! count and grows explicitly through [`HashTable::grow_if_needed`], which
//! consumes the old table and returns the rehashed one. Callers insert many
//! entries in one pass and grow between inserts, so the growth point is under
//! their control.
//!
//! Keys are unique: [`HashTable::insert_unique`] hands the value back instead
//! of overwriting when the key already exists.
//!
//! ## Example
//!
//! ```rust
//! use difftree::table::{HashTable, Insert};
//! use std::ops::ControlFlow;
//!
//! let mut table = HashTable::init(16);
//! assert!(matches!(table.insert_unique(b"etc/passwd", 1u32), Insert::Inserted));
//! assert!(matches!(table.insert_unique(b"etc/passwd", 2u32), Insert::Duplicate(2)));
//! assert_eq!(table.lookup(b"etc/passwd"), Some(&1));
//!
//! let table = table.grow_if_needed();
//! let mut seen = 0;
//! let completed = table.traverse(|_, _| {
//!     seen += 1;
//!     ControlFlow::Continue(())
//! });
//! assert!(completed);
//! assert_eq!(seen, 1);
//! ```

use crate::collections::KeyHasher;
use crate::types::FileRecord;
use std::hash::BuildHasher;
use std::ops::ControlFlow;
use tracing::debug;

/// A snapshot: relative path bytes to file metadata
pub type Snapshot = HashTable<FileRecord>;

/// Bucket count used when no better hint is available
pub const DEFAULT_BUCKETS: usize = 52;

/// Records per bucket above which the table grows
const MAX_LOAD_FACTOR: f64 = 0.8;

/// Bucket counts the table moves through as it grows
const PRIMES: &[usize] = &[
    53, 97, 193, 389, 769, 1543, 3079, 6151, 12289, 24593, 49157, 98317, 196613, 393241,
    786433, 1572869, 3145739, 6291469, 12582917, 25165843, 50331653, 100663319, 201326611,
    402653189, 805306457, 1610612741,
];

/// Smallest tabulated prime at or above `n`, or `n` rounded up to odd past the table
fn bucket_count_for(n: usize) -> usize {
    PRIMES
        .iter()
        .copied()
        .find(|&p| p >= n)
        .unwrap_or(n | 1)
}

/// Result of [`HashTable::insert_unique`]
#[derive(Debug, PartialEq, Eq)]
#[must_use]
pub enum Insert<V> {
    /// The key was new and the value was stored
    Inserted,
    /// The key already existed; the table is untouched and the value is returned
    Duplicate(V),
}

struct Entry<V> {
    key: Box<[u8]>,
    value: V,
}

/// Separate-chaining hash table keyed by byte strings
pub struct HashTable<V> {
    buckets: Vec<Vec<Entry<V>>>,
    record_count: usize,
    hasher: KeyHasher,
}

impl<V> HashTable<V> {
    /// Allocate a table with at least `size_hint` buckets
    pub fn init(size_hint: usize) -> Self {
        let bucket_count = bucket_count_for(size_hint.max(1));
        let mut buckets = Vec::with_capacity(bucket_count);
        buckets.resize_with(bucket_count, Vec::new);

        Self {
            buckets,
            record_count: 0,
            hasher: KeyHasher::default(),
        }
    }

    fn bucket_index(&self, key: &[u8]) -> usize {
        (self.hasher.hash_one(key) % self.buckets.len() as u64) as usize
    }

    /// Insert `value` under `key` unless the key is already present
    pub fn insert_unique(&mut self, key: &[u8], value: V) -> Insert<V> {
        let index = self.bucket_index(key);
        let bucket = &mut self.buckets[index];
        if bucket.iter().any(|e| &*e.key == key) {
            return Insert::Duplicate(value);
        }

        bucket.push(Entry {
            key: key.into(),
            value,
        });
        self.record_count += 1;
        Insert::Inserted
    }

    /// Find the record stored under `key`
    pub fn lookup(&self, key: &[u8]) -> Option<&V> {
        self.buckets[self.bucket_index(key)]
            .iter()
            .find(|e| &*e.key == key)
            .map(|e| &e.value)
    }

    /// Check if `key` is present
    pub fn contains(&self, key: &[u8]) -> bool {
        self.lookup(key).is_some()
    }

    /// Visit every record until the visitor breaks
    ///
    /// Returns `true` if every record was visited, `false` if the visitor
    /// stopped the traversal early.
    pub fn traverse<F>(&self, mut visitor: F) -> bool
    where
        F: FnMut(&[u8], &V) -> ControlFlow<()>,
    {
        for bucket in &self.buckets {
            for entry in bucket {
                if visitor(&entry.key, &entry.value).is_break() {
                    return false;
                }
            }
        }
        true
    }

    /// Check if the load factor has crossed the growth threshold
    pub fn needs_growth(&self) -> bool {
        self.load_factor() > MAX_LOAD_FACTOR
    }

    /// Rehash into a larger table when the load factor is too high
    ///
    /// The returned table replaces `self`; every key/record association is
    /// carried over unchanged.
    pub fn grow_if_needed(self) -> Self {
        if !self.needs_growth() {
            return self;
        }

        let target = bucket_count_for(self.buckets.len() * 2);
        debug!(
            "Growing table from {} to {} buckets ({} records)",
            self.buckets.len(),
            target,
            self.record_count
        );

        let mut grown = Self {
            buckets: Vec::with_capacity(target),
            record_count: 0,
            hasher: self.hasher,
        };
        grown.buckets.resize_with(target, Vec::new);

        for bucket in self.buckets {
            for entry in bucket {
                let index = grown.bucket_index(&entry.key);
                grown.buckets[index].push(entry);
                grown.record_count += 1;
            }
        }

        grown
    }

    /// Current bucket count
    pub fn size(&self) -> usize {
        self.buckets.len()
    }

    /// Number of records stored
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// Check if the table holds no records
    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    /// Records per bucket
    pub fn load_factor(&self) -> f64 {
        self.record_count as f64 / self.buckets.len() as f64
    }
}

impl<V> Default for HashTable<V> {
    fn default() -> Self {
        Self::init(DEFAULT_BUCKETS)
    }
}

impl<V> std::fmt::Debug for HashTable<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashTable")
            .field("buckets", &self.buckets.len())
            .field("record_count", &self.record_count)
            .finish()
    }
}
