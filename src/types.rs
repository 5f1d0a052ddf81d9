//! Core types and data structures for difftree
//!
//! This module contains the per-entry metadata record kept in a snapshot, the
//! entry-kind enumeration shared by the walker, engine and codec, and the small
//! control/outcome enums that flow between them.
//!
//! ## Key Types
//!
//! - [`FileRecord`] - Metadata observed for one filesystem entry
//! - [`EntryKind`] - Closed set of entry types with their short report codes
//! - [`ContentSummary`] - Either a digest, byte/line counts, or nothing
//! - [`VisitControl`] - Four-way result returned by a walk visitor
//! - [`Outcome`] - Whether an operation ran to completion or was cancelled
//! - [`CancelToken`] - Shared cancellation flag polled by the core

use crate::digest::ContentDigest;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::Metadata;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Type of a filesystem entry
///
/// The short codes returned by [`EntryKind::code`] are the ones used in report
/// lines and in the `TYPE=` field of serialized snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Regular file
    Regular,
    /// Directory
    Directory,
    /// Symbolic link (never followed)
    Symlink,
    /// Block device node
    BlockDevice,
    /// Character device node
    CharDevice,
    /// Named pipe
    Fifo,
    /// Unix domain socket
    Socket,
    /// Entry whose type could not be determined
    Unknown,
}

impl EntryKind {
    /// Short code used in reports and snapshot files
    pub fn code(&self) -> &'static str {
        match self {
            EntryKind::Regular => "f",
            EntryKind::Directory => "d",
            EntryKind::Symlink => "sl",
            EntryKind::BlockDevice => "blk",
            EntryKind::CharDevice => "chr",
            EntryKind::Fifo => "fifo",
            EntryKind::Socket => "sok",
            EntryKind::Unknown => "???",
        }
    }

    /// Decode a `TYPE=` value
    ///
    /// Matching is on the leading characters, so `fifo` and `f` are told
    /// apart by the second byte and `sl`/`sok` likewise. Anything
    /// unrecognized decodes to [`EntryKind::Unknown`].
    pub fn from_code(code: &str) -> Self {
        let bytes = code.as_bytes();
        match (bytes.first(), bytes.get(1)) {
            (Some(b'f'), Some(b'i')) => EntryKind::Fifo,
            (Some(b'f'), _) => EntryKind::Regular,
            (Some(b'd'), _) => EntryKind::Directory,
            (Some(b'b'), _) => EntryKind::BlockDevice,
            (Some(b'c'), _) => EntryKind::CharDevice,
            (Some(b's'), Some(b'l')) => EntryKind::Symlink,
            (Some(b's'), _) => EntryKind::Socket,
            _ => EntryKind::Unknown,
        }
    }

    /// Classify a `std::fs::FileType` obtained without following links
    pub fn from_file_type(file_type: std::fs::FileType) -> Self {
        if file_type.is_symlink() {
            return EntryKind::Symlink;
        }
        if file_type.is_dir() {
            return EntryKind::Directory;
        }
        if file_type.is_file() {
            return EntryKind::Regular;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;
            if file_type.is_block_device() {
                return EntryKind::BlockDevice;
            }
            if file_type.is_char_device() {
                return EntryKind::CharDevice;
            }
            if file_type.is_fifo() {
                return EntryKind::Fifo;
            }
            if file_type.is_socket() {
                return EntryKind::Socket;
            }
        }

        EntryKind::Unknown
    }

    /// Check if this is a regular file
    pub fn is_regular(&self) -> bool {
        matches!(self, EntryKind::Regular)
    }

    /// Check if this is a directory
    pub fn is_dir(&self) -> bool {
        matches!(self, EntryKind::Directory)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Content-derived data attached to a regular file record
///
/// Digest mode and count mode are mutually exclusive, so a record carries at
/// most one of the two.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ContentSummary {
    /// No content data was computed
    #[default]
    None,
    /// Cryptographic digest of the file bytes
    Digest(ContentDigest),
    /// Byte and newline counts of the (decompressed) file content
    Counts {
        /// Number of content bytes
        bytes: u64,
        /// Number of newline characters
        lines: u64,
    },
}

impl ContentSummary {
    /// Digest if one was computed
    pub fn digest(&self) -> Option<&ContentDigest> {
        match self {
            ContentSummary::Digest(d) => Some(d),
            _ => None,
        }
    }

    /// Byte and line counts if computed
    pub fn counts(&self) -> Option<(u64, u64)> {
        match self {
            ContentSummary::Counts { bytes, lines } => Some((*bytes, *lines)),
            _ => None,
        }
    }
}

/// Metadata for a single entry in a snapshot
///
/// Timestamps are whole seconds since the Unix epoch. `permissions` holds the
/// low twelve mode bits (setuid, setgid, sticky and rwx triplets) with the
/// file-type bits removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Entry type
    pub kind: EntryKind,
    /// Size in bytes
    pub size: u64,
    /// Owner user id
    pub uid: u32,
    /// Owner group id
    pub gid: u32,
    /// Permission bits
    pub permissions: u16,
    /// Last modification time
    pub mtime: i64,
    /// Last access time
    pub atime: i64,
    /// Last status change time
    pub ctime: i64,
    /// Inode number
    pub inode: u64,
    /// Hard link count
    pub hardlinks: u32,
    /// Allocated 512-byte blocks
    pub blocks: u64,
    /// Digest or counts, when computed
    pub content: ContentSummary,
}

impl FileRecord {
    /// Record for an entry whose metadata could not be read
    pub fn unknown() -> Self {
        Self {
            kind: EntryKind::Unknown,
            size: 0,
            uid: 0,
            gid: 0,
            permissions: 0,
            mtime: 0,
            atime: 0,
            ctime: 0,
            inode: 0,
            hardlinks: 0,
            blocks: 0,
            content: ContentSummary::None,
        }
    }

    /// Build a record from `lstat`-style metadata
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            kind: EntryKind::from_file_type(metadata.file_type()),
            size: metadata.size(),
            uid: metadata.uid(),
            gid: metadata.gid(),
            permissions: (metadata.mode() & 0o7777) as u16,
            mtime: metadata.mtime(),
            atime: metadata.atime(),
            ctime: metadata.ctime(),
            inode: metadata.ino(),
            hardlinks: metadata.nlink().min(u32::MAX as u64) as u32,
            blocks: metadata.blocks(),
            content: ContentSummary::None,
        }
    }

    /// Build a record from metadata (non-Unix platforms carry fewer fields)
    #[cfg(not(unix))]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let epoch = |t: std::io::Result<std::time::SystemTime>| {
            t.ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0)
        };
        let permissions = if metadata.permissions().readonly() { 0o444 } else { 0o644 };

        Self {
            kind: EntryKind::from_file_type(metadata.file_type()),
            size: metadata.len(),
            uid: 0,
            gid: 0,
            permissions,
            mtime: epoch(metadata.modified()),
            atime: epoch(metadata.accessed()),
            ctime: epoch(metadata.created()),
            inode: 0,
            hardlinks: 1,
            blocks: 0,
            content: ContentSummary::None,
        }
    }

    /// Attach computed content data
    pub fn with_content(mut self, content: ContentSummary) -> Self {
        self.content = content;
        self
    }
}

/// Result returned by a walk visitor for each entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitControl {
    /// Keep walking normally
    Continue,
    /// Abort the whole walk
    Stop,
    /// Do not descend into the current directory
    SkipSubtree,
    /// Skip the rest of the current directory level
    SkipSiblings,
}

/// How an operation ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Ran to completion
    Completed,
    /// Stopped early because cancellation was requested
    Cancelled,
}

impl Outcome {
    /// Check if the operation was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }
}

/// Shared, read-mostly cancellation flag
///
/// The core only ever reads it; a signal handler or test sets it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters for one processed root argument
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Records inserted into the current snapshot
    pub records: usize,
    /// Addition lines emitted
    pub added: usize,
    /// Change lines emitted
    pub changed: usize,
    /// Deletion lines emitted
    pub deleted: usize,
    /// Per-entry errors that were logged and skipped
    pub errors: usize,
}

impl RunSummary {
    /// Total number of report lines emitted
    pub fn total_changes(&self) -> usize {
        self.added + self.changed + self.deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes_round_trip() {
        let kinds = [
            EntryKind::Regular,
            EntryKind::Directory,
            EntryKind::Symlink,
            EntryKind::BlockDevice,
            EntryKind::CharDevice,
            EntryKind::Fifo,
            EntryKind::Socket,
            EntryKind::Unknown,
        ];
        for kind in kinds {
            assert_eq!(EntryKind::from_code(kind.code()), kind);
        }
    }

    #[test]
    fn test_kind_prefix_decoding() {
        assert_eq!(EntryKind::from_code("file"), EntryKind::Regular);
        assert_eq!(EntryKind::from_code("fifo"), EntryKind::Fifo);
        assert_eq!(EntryKind::from_code("sock"), EntryKind::Socket);
        assert_eq!(EntryKind::from_code(""), EntryKind::Unknown);
        assert_eq!(EntryKind::from_code("x"), EntryKind::Unknown);
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[cfg(unix)]
    #[test]
    fn test_record_from_metadata() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("a.txt");
        std::fs::write(&path, "hello").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

        let meta = std::fs::symlink_metadata(&path).unwrap();
        let record = FileRecord::from_metadata(&meta);
        assert_eq!(record.kind, EntryKind::Regular);
        assert_eq!(record.size, 5);
        assert_eq!(record.permissions, 0o640);
        assert!(record.hardlinks >= 1);
        assert_eq!(record.content, ContentSummary::None);
    }

    #[test]
    fn test_summary_totals() {
        let summary = RunSummary {
            records: 10,
            added: 2,
            changed: 3,
            deleted: 1,
            errors: 0,
        };
        assert_eq!(summary.total_changes(), 6);
    }
}
