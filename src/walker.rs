//! Physical, cancellable depth-first tree walker
//!
//! [`TreeWalker`] visits every entry below a root in pre-order without
//! following symbolic links, in the spirit of `nftw(FTW_PHYS)`. Each entry is
//! handed to a [`Visitor`] which steers the walk by returning a
//! [`VisitControl`]:
//!
//! - `Continue` - proceed normally
//! - `Stop` - abort the whole walk; [`TreeWalker::walk`] returns
//!   [`Outcome::Cancelled`]
//! - `SkipSubtree` - do not descend into the directory just visited
//! - `SkipSiblings` - drop the remaining entries of the current directory
//!
//! Entries that cannot be examined are not fatal. A directory that cannot be
//! opened is reported with [`EntryFlag::DirNotReadable`] after the directory
//! itself has been visited, and an entry whose metadata cannot be read is
//! reported with [`EntryFlag::StatFailed`]. The walk then carries on with the
//! next sibling.
//!
//! The walker polls a [`CancelToken`] before fetching every entry and behaves
//! as if the visitor had returned `Stop` once it is set.
//!
//! ## Example
//!
//! ```rust,no_run
//! use difftree::types::{CancelToken, VisitControl};
//! use difftree::walker::{TreeWalker, WalkEntry};
//!
//! # fn main() -> difftree::Result<()> {
//! let walker = TreeWalker::new("/etc", CancelToken::new());
//! let mut count = 0;
//! walker.walk(&mut |entry: &WalkEntry<'_>| {
//!     count += 1;
//!     println!("{}", entry.path().display());
//!     VisitControl::Continue
//! })?;
//! # Ok(())
//! # }
//! ```

use crate::error::{DiffTreeError, Result};
use crate::types::{CancelToken, Outcome, VisitControl};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

/// What the walker could learn about an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryFlag {
    /// Non-directory, non-symlink entry (regular file, device, fifo, socket)
    File,
    /// Directory; its children follow unless the visitor prunes them
    Dir,
    /// Symbolic link; never followed
    Symlink,
    /// Directory that was visited but whose contents could not be read
    DirNotReadable,
    /// Entry whose metadata could not be read
    StatFailed,
}

impl EntryFlag {
    /// Check if this flag reports a failure
    pub fn is_error(&self) -> bool {
        matches!(self, EntryFlag::DirNotReadable | EntryFlag::StatFailed)
    }
}

/// One entry passed to a [`Visitor`]
#[derive(Debug)]
pub struct WalkEntry<'a> {
    path: &'a Path,
    depth: usize,
    metadata: Option<&'a Metadata>,
    flag: EntryFlag,
    error: Option<&'a walkdir::Error>,
}

impl<'a> WalkEntry<'a> {
    /// Full path of the entry
    pub fn path(&self) -> &'a Path {
        self.path
    }

    /// Depth below the root (the root itself is depth 0)
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// `lstat` metadata, absent when it could not be read
    pub fn metadata(&self) -> Option<&'a Metadata> {
        self.metadata
    }

    /// Classification of the entry
    pub fn flag(&self) -> EntryFlag {
        self.flag
    }

    /// Underlying error for [`EntryFlag::DirNotReadable`] and [`EntryFlag::StatFailed`]
    pub fn error(&self) -> Option<&'a walkdir::Error> {
        self.error
    }
}

/// Receives every entry of a walk
pub trait Visitor {
    /// Inspect one entry and decide how the walk continues
    fn visit(&mut self, entry: &WalkEntry<'_>) -> VisitControl;
}

impl<F> Visitor for F
where
    F: FnMut(&WalkEntry<'_>) -> VisitControl,
{
    fn visit(&mut self, entry: &WalkEntry<'_>) -> VisitControl {
        self(entry)
    }
}

/// Depth-first physical walker rooted at one directory
#[derive(Debug, Clone)]
pub struct TreeWalker {
    root: PathBuf,
    cancel: CancelToken,
    sort_entries: bool,
}

impl TreeWalker {
    /// Create a walker for `root` that honours `cancel`
    pub fn new(root: impl Into<PathBuf>, cancel: CancelToken) -> Self {
        Self {
            root: root.into(),
            cancel,
            sort_entries: true,
        }
    }

    /// Visit directory entries in file-name order (default) or in the order
    /// the filesystem returns them
    pub fn sort_entries(mut self, sort: bool) -> Self {
        self.sort_entries = sort;
        self
    }

    /// Root of the walk
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the tree, feeding every entry to `visitor`
    ///
    /// The root itself is visited first at depth 0.
    ///
    /// # Returns
    ///
    /// [`Outcome::Completed`] when the tree was exhausted, or
    /// [`Outcome::Cancelled`] when the visitor returned `Stop` or the cancel
    /// token was set.
    ///
    /// # Errors
    ///
    /// Fails only when the root itself cannot be examined.
    pub fn walk<V: Visitor + ?Sized>(&self, visitor: &mut V) -> Result<Outcome> {
        std::fs::symlink_metadata(&self.root)
            .map_err(|e| DiffTreeError::path_io(&self.root, e))?;

        let mut builder = WalkDir::new(&self.root).follow_links(false);
        if self.sort_entries {
            builder = builder.sort_by_file_name();
        }
        let mut iter = builder.into_iter();
        // Directory yielded by the previous step; a read_dir failure for it
        // arrives next, at its own depth, while its level is still open.
        let mut opened: Option<(PathBuf, usize)> = None;

        loop {
            if self.cancel.is_cancelled() {
                debug!("Walk of {:?} cancelled", self.root);
                return Ok(Outcome::Cancelled);
            }

            let Some(next) = iter.next() else {
                break;
            };

            let control = match next {
                Ok(dir_entry) => {
                    let file_type = dir_entry.file_type();
                    let metadata = dir_entry.metadata();
                    let (flag, metadata, error) = match &metadata {
                        Ok(meta) if file_type.is_dir() => (EntryFlag::Dir, Some(meta), None),
                        Ok(meta) if file_type.is_symlink() => {
                            (EntryFlag::Symlink, Some(meta), None)
                        }
                        Ok(meta) => (EntryFlag::File, Some(meta), None),
                        Err(e) => (EntryFlag::StatFailed, None, Some(e)),
                    };
                    trace!("Visiting {:?} ({:?})", dir_entry.path(), flag);

                    let control = visitor.visit(&WalkEntry {
                        path: dir_entry.path(),
                        depth: dir_entry.depth(),
                        metadata,
                        flag,
                        error,
                    });
                    let is_dir = flag == EntryFlag::Dir;
                    opened = (is_dir && control == VisitControl::Continue)
                        .then(|| (dir_entry.path().to_path_buf(), dir_entry.depth()));
                    (control, is_dir)
                }
                Err(err) => {
                    let just_opened = opened.take();
                    let Some(path) = err.path().map(Path::to_path_buf) else {
                        debug!("Walk error without a path: {}", err);
                        continue;
                    };
                    if path == self.root {
                        let source = err
                            .into_io_error()
                            .unwrap_or_else(|| std::io::Error::other("unable to read root"));
                        return Err(DiffTreeError::path_io(path, source));
                    }
                    let holds_level = just_opened
                        .is_some_and(|(dir, depth)| dir == path && depth == err.depth());
                    let flag = if holds_level {
                        EntryFlag::DirNotReadable
                    } else {
                        EntryFlag::StatFailed
                    };
                    let control = visitor.visit(&WalkEntry {
                        path: &path,
                        depth: err.depth(),
                        metadata: None,
                        flag,
                        error: Some(&err),
                    });
                    // The unreadable directory's level is still on the stack
                    (control, holds_level)
                }
            };

            match control {
                (VisitControl::Continue, _) => {}
                (VisitControl::Stop, _) => {
                    debug!("Visitor stopped walk of {:?}", self.root);
                    return Ok(Outcome::Cancelled);
                }
                (VisitControl::SkipSubtree, is_dir) => {
                    if is_dir {
                        iter.skip_current_dir();
                    }
                }
                (VisitControl::SkipSiblings, is_dir) => {
                    // A yielded directory is already the innermost open level,
                    // so pop it before popping its parent.
                    if is_dir {
                        iter.skip_current_dir();
                    }
                    iter.skip_current_dir();
                }
            }
        }

        Ok(Outcome::Completed)
    }
}
