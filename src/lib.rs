//! # difftree - Directory tree integrity and diff engine
//!
//! Records the state of a directory tree (type, size, ownership, permissions,
//! timestamps and optionally a content digest for every entry) and reports
//! what changed between two such states.
//!
//! ## Overview
//!
//! Each root argument is either a directory, which is walked, or a snapshot
//! file written by an earlier run, which is loaded. Every argument is compared
//! against the one before it:
//!
//! ```text
//! $ difftree -s -w /var/lib/difftree/etc.dt /etc
//! $ difftree -s /var/lib/difftree/etc.dt /etc
//! s[220->231] f [hosts]
//! + f [cron.d/backup]
//! - f [motd]
//! ```
//!
//! - Lines starting with `+` are new entries.
//! - Lines starting with `-` are entries that went away.
//! - Anything else is a change line: one `attr[old->new]` fragment per
//!   differing attribute, followed by the entry type and key.
//!
//! ## Architecture
//!
//! - **Tree walking**: [`walker::TreeWalker`] visits a tree physically (links
//!   are never followed) in pre-order, with a visitor that can prune or stop.
//! - **Snapshots**: [`table::HashTable`] is a chained hash table keyed by the
//!   relative path bytes. It grows through a prime series and never holds a
//!   key twice.
//! - **Diffing**: [`engine::DiffEngine`] builds the current snapshot and emits
//!   additions, changes and deletions against the baseline.
//! - **Persistence**: [`codec`] reads and writes the line-oriented snapshot
//!   format, including the legacy version 1 layout.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use difftree::{CancelToken, DiffConfigBuilder, DigestKind, RunState};
//! use difftree::report::WriterSink;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DiffConfigBuilder::new()
//!     .digest(DigestKind::Strong32)
//!     .exclude("/etc/ssl/certs")
//!     .output("/tmp/etc.dt")
//!     .build()?;
//!
//! let mut state = RunState::new(config, CancelToken::new())?;
//! let mut sink = WriterSink::new(std::io::stdout());
//!
//! // First argument becomes the baseline, second is compared against it
//! state.process_argument(Path::new("/tmp/etc-yesterday.dt"), &mut sink)?;
//! let report = state.process_argument(Path::new("/etc"), &mut sink)?;
//! println!("{} changes", report.summary.total_changes());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modes
//!
//! | Mode     | Compared                                                  |
//! |----------|-----------------------------------------------------------|
//! | `NORMAL` | size, uid, gid, type, permissions, mtime (atime with `-a`) |
//! | `HASH`   | everything in `NORMAL` plus a content digest              |
//! | `QUICK`  | existence and size only                                   |
//! | `COUNT`  | like `NORMAL` plus decompressed byte and line counts      |
//!
//! When a snapshot file recorded in a richer mode than the current run is
//! loaded, the run is downgraded with a warning instead of failing.
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`](error::Result) with a
//! [`DiffTreeError`]. Problems with a single entry (unreadable directory,
//! failed digest) are logged and counted but do not stop the run. A damaged
//! snapshot file or an exceeded length limit aborts the current argument.
//! Cancellation is reported as [`Outcome::Cancelled`], not as an error.
//!
//! ## Module Organization
//!
//! - [`walker`]: physical pre-order tree traversal
//! - [`table`]: the snapshot hash table
//! - [`engine`]: per-entry diffing and cross-argument state
//! - [`diff`]: record comparison and change fragments
//! - [`codec`] / [`tokenizer`]: snapshot file format
//! - [`digest`] / [`compression`]: content digests and counts
//! - [`config`] / [`exclusion`]: run settings
//! - [`report`]: report lines and sinks
//! - [`types`]: common types
//! - [`error`]: error types and handling

// Public API modules
pub mod codec;
pub mod compression;
pub mod config;
pub mod diff;
pub mod digest;
pub mod engine;
pub mod error;
pub mod exclusion;
pub mod report;
pub mod table;
pub mod tokenizer;
pub mod types;
pub mod utils;
pub mod walker;

// Internal modules (not part of public API)
mod collections;

// Re-export main types for convenience
pub use config::{DiffConfig, DiffConfigBuilder, ScanMode};
pub use digest::{ContentDigest, DigestKind};
pub use engine::{ArgumentReport, DiffEngine, RunState};
pub use error::{DiffTreeError, Result};
pub use exclusion::ExclusionList;
pub use report::{ReportLine, ReportSink};
pub use table::{HashTable, Snapshot};
pub use types::*;
