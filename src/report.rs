//! Report lines and where they go
//!
//! The engine produces one [`ReportLine`] per added, deleted or changed entry
//! and hands it to a [`ReportSink`]. Rendering is fixed:
//!
//! ```text
//! + f [etc/new.conf]
//! - d [var/old]
//! s[5->7] f [etc/hosts]
//! ```
//!
//! The core never decides where lines end up. The CLI writes them to stdout,
//! tests collect them in a `Vec`.

use crate::diff::ChangeSet;
use crate::error::Result;
use crate::types::EntryKind;
use std::fmt;
use std::io::Write;

/// One line of diff output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportLine {
    /// Entry present now but not in the baseline
    Added {
        /// Entry type
        kind: EntryKind,
        /// Snapshot key
        key: String,
    },
    /// Entry present in the baseline but gone now
    Deleted {
        /// Entry type as recorded in the baseline
        kind: EntryKind,
        /// Snapshot key
        key: String,
    },
    /// Entry present in both with differing attributes
    Changed {
        /// Current entry type
        kind: EntryKind,
        /// Snapshot key
        key: String,
        /// What differs
        changes: ChangeSet,
    },
}

impl ReportLine {
    /// Snapshot key this line refers to
    pub fn key(&self) -> &str {
        match self {
            ReportLine::Added { key, .. }
            | ReportLine::Deleted { key, .. }
            | ReportLine::Changed { key, .. } => key,
        }
    }

    /// Check if this is an addition
    pub fn is_added(&self) -> bool {
        matches!(self, ReportLine::Added { .. })
    }

    /// Check if this is a deletion
    pub fn is_deleted(&self) -> bool {
        matches!(self, ReportLine::Deleted { .. })
    }

    /// Check if this is a change
    pub fn is_changed(&self) -> bool {
        matches!(self, ReportLine::Changed { .. })
    }
}

impl fmt::Display for ReportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportLine::Added { kind, key } => write!(f, "+ {} [{}]", kind, key),
            ReportLine::Deleted { kind, key } => write!(f, "- {} [{}]", kind, key),
            ReportLine::Changed { kind, key, changes } => {
                write!(f, "{}{} [{}]", changes, kind, key)
            }
        }
    }
}

/// Destination for report lines
pub trait ReportSink {
    /// Accept one line
    fn emit(&mut self, line: ReportLine) -> Result<()>;
}

impl ReportSink for Vec<ReportLine> {
    fn emit(&mut self, line: ReportLine) -> Result<()> {
        self.push(line);
        Ok(())
    }
}

/// Sink that renders lines to any writer, one per line
#[derive(Debug)]
pub struct WriterSink<W: Write> {
    writer: W,
}

impl<W: Write> WriterSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Flush buffered output
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Unwrap the inner writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for WriterSink<W> {
    fn emit(&mut self, line: ReportLine) -> Result<()> {
        writeln!(self.writer, "{}", line)?;
        Ok(())
    }
}
