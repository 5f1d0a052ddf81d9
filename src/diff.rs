//! Record comparison
//!
//! [`compare_records`] decides what changed between a baseline record and a
//! freshly observed one. Attributes are checked in a fixed order and every
//! mismatch becomes a [`Change`] fragment:
//!
//! 1. size (always)
//! 2. digest, or byte/line counts in count mode, only when the entry is a
//!    regular file and the sizes match
//! 3. unless quick mode: uid, gid, kind, permission bits, mtime
//! 4. atime, only when explicitly requested and not in quick mode
//!
//! A size mismatch already proves the content differs, so the digest is not
//! compared in that case.
//!
//! The rendered form of a [`ChangeSet`] is the concatenation of its fragments,
//! each followed by a space:
//!
//! ```text
//! s[5->7] u[0->1000] p[rw-r--r-->rwxr-xr-x]
//! ```

use crate::digest::ContentDigest;
use crate::types::{EntryKind, FileRecord};
use crate::utils::{format_permissions, format_timestamp};
use std::fmt;

/// Which comparisons are enabled for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompareOptions {
    /// Compare digests of regular files
    pub hash: bool,
    /// Compare byte/line counts of regular files
    pub count: bool,
    /// Only compare existence and size
    pub quick: bool,
    /// Also compare access times
    pub atime: bool,
}

/// One attribute that differs between two records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Size in bytes
    Size(u64, u64),
    /// Content digest; `None` when a side has no digest
    Digest(Option<ContentDigest>, Option<ContentDigest>),
    /// Decompressed byte count
    Bytes(u64, u64),
    /// Newline count
    Lines(u64, u64),
    /// Owner uid
    Uid(u32, u32),
    /// Owner gid
    Gid(u32, u32),
    /// Entry type
    Kind(EntryKind, EntryKind),
    /// Permission bits
    Permissions(u16, u16),
    /// Modification time
    Mtime(i64, i64),
    /// Access time
    Atime(i64, i64),
}

fn digest_text(digest: &Option<ContentDigest>) -> String {
    match digest {
        Some(d) => d.to_hex(),
        None => "none".to_string(),
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Size(a, b) => write!(f, "s[{}->{}]", a, b),
            Change::Digest(Some(a), Some(b)) if a.kind() != b.kind() => write!(
                f,
                "digest[{}:{}->{}:{}]",
                a.kind().label(),
                a.to_hex(),
                b.kind().label(),
                b.to_hex()
            ),
            Change::Digest(a, b) => {
                let label = a
                    .as_ref()
                    .or(b.as_ref())
                    .map(|d| d.kind().label())
                    .unwrap_or("digest");
                write!(f, "{}[{}->{}]", label, digest_text(a), digest_text(b))
            }
            Change::Bytes(a, b) => write!(f, "b[{}->{}]", a, b),
            Change::Lines(a, b) => write!(f, "l[{}->{}]", a, b),
            Change::Uid(a, b) => write!(f, "u[{}->{}]", a, b),
            Change::Gid(a, b) => write!(f, "g[{}->{}]", a, b),
            Change::Kind(a, b) => write!(f, "t[{}->{}]", a, b),
            Change::Permissions(a, b) => {
                write!(f, "p[{}->{}]", format_permissions(*a), format_permissions(*b))
            }
            Change::Mtime(a, b) => {
                write!(f, "mt[{}->{}]", format_timestamp(*a), format_timestamp(*b))
            }
            Change::Atime(a, b) => {
                write!(f, "at[{}->{}]", format_timestamp(*a), format_timestamp(*b))
            }
        }
    }
}

/// Ordered list of differences for one entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    /// Check if nothing differs
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of differing attributes
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Differences in comparison order
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    fn push(&mut self, change: Change) {
        self.changes.push(change);
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for change in &self.changes {
            write!(f, "{} ", change)?;
        }
        Ok(())
    }
}

/// Compare a baseline record against the current one
pub fn compare_records(old: &FileRecord, new: &FileRecord, opts: &CompareOptions) -> ChangeSet {
    let mut set = ChangeSet::default();

    if old.size != new.size {
        set.push(Change::Size(old.size, new.size));
    } else if new.kind.is_regular() && old.kind.is_regular() {
        if opts.hash {
            compare_digests(old, new, &mut set);
        } else if opts.count {
            if let (Some((ob, ol)), Some((nb, nl))) = (old.content.counts(), new.content.counts()) {
                if ob != nb {
                    set.push(Change::Bytes(ob, nb));
                }
                if ol != nl {
                    set.push(Change::Lines(ol, nl));
                }
            }
        }
    }

    if opts.quick {
        return set;
    }

    if old.uid != new.uid {
        set.push(Change::Uid(old.uid, new.uid));
    }
    if old.gid != new.gid {
        set.push(Change::Gid(old.gid, new.gid));
    }
    if old.kind != new.kind {
        set.push(Change::Kind(old.kind, new.kind));
    }
    if old.permissions != new.permissions {
        set.push(Change::Permissions(old.permissions, new.permissions));
    }
    if old.mtime != new.mtime {
        set.push(Change::Mtime(old.mtime, new.mtime));
    }
    if opts.atime && old.atime != new.atime {
        set.push(Change::Atime(old.atime, new.atime));
    }

    set
}

fn compare_digests(old: &FileRecord, new: &FileRecord, set: &mut ChangeSet) {
    let (a, b) = (old.content.digest(), new.content.digest());
    // Digests of different algorithms never compare equal
    match (a, b) {
        (Some(a), Some(b)) if a == b => {}
        (None, None) => {}
        _ => set.push(Change::Digest(a.cloned(), b.cloned())),
    }
}
