//! Error types for the difftree library
//!
//! This module defines every error that can surface from walking, loading or
//! writing a snapshot. Per-entry problems seen during a walk (an unreadable
//! file, a directory that cannot be opened) are not errors at this level: they
//! are logged and the entry is skipped. What reaches a caller as a
//! [`DiffTreeError`] aborts the current root argument.
//!
//! Cancellation is not an error. A cancelled walk or scan returns
//! [`Outcome::Cancelled`](crate::types::Outcome) inside `Ok`.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the difftree library
pub type Result<T> = std::result::Result<T, DiffTreeError>;

/// Main error type for all difftree operations
#[derive(Debug, Error)]
pub enum DiffTreeError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error tied to a specific path
    #[error("Unable to access {path:?}: {source}")]
    PathIo {
        /// Path that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Errors while reading a JSON configuration file
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Snapshot file is structurally broken
    #[error("Snapshot corrupt: {0}")]
    Corruption(String),

    /// Snapshot format version is not one this build understands
    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(String),

    /// A path exceeded the maximum supported length
    #[error("Path too long: {len} bytes exceeds limit of {limit} bytes")]
    PathTooLong {
        /// Observed length
        len: usize,
        /// Configured limit
        limit: usize,
    },

    /// A serialized field or line exceeded the maximum supported length
    #[error("Field too long on line {line}: {len} bytes exceeds limit of {limit} bytes")]
    FieldTooLong {
        /// Line number in the snapshot file (1-based)
        line: usize,
        /// Observed length
        len: usize,
        /// Configured limit
        limit: usize,
    },

    /// Allocation or capacity failure
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Conflicting or invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Refusing to replace something that is not a regular file
    #[error("Unable to overwrite non-file {0:?}")]
    OutputNotRegularFile(PathBuf),

    /// Root argument is neither a directory nor a snapshot file
    #[error("Unsupported root type: {0:?}")]
    UnsupportedRoot(PathBuf),

    /// A key was inserted twice into the same snapshot
    #[error("Duplicate key in snapshot: {0}")]
    DuplicateKey(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DiffTreeError {
    /// Create a corruption error with a custom message
    pub fn corruption(msg: impl Into<String>) -> Self {
        DiffTreeError::Corruption(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        DiffTreeError::Internal(msg.into())
    }

    /// Wrap an I/O error with the path that produced it
    pub fn path_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DiffTreeError::PathIo {
            path: path.into(),
            source,
        }
    }

    /// Check if this error indicates a damaged snapshot file
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            DiffTreeError::Corruption(_)
                | DiffTreeError::UnsupportedVersion(_)
                | DiffTreeError::FieldTooLong { .. }
        )
    }

    /// Check if this error came from the filesystem
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            DiffTreeError::Io(_)
                | DiffTreeError::PathIo { .. }
                | DiffTreeError::OutputNotRegularFile(_)
                | DiffTreeError::UnsupportedRoot(_)
        )
    }

    /// Process exit status for this error
    ///
    /// `0` is success and `3` is a cancelled run, so neither appears here.
    pub fn exit_code(&self) -> i32 {
        if self.is_corruption() {
            2
        } else if matches!(
            self,
            DiffTreeError::InvalidConfiguration(_) | DiffTreeError::Json(_)
        ) {
            4
        } else {
            1
        }
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            DiffTreeError::Corruption(msg) => {
                format!("Snapshot file is damaged: {}. Regenerate it with --write.", msg)
            }
            DiffTreeError::UnsupportedVersion(ver) => {
                format!(
                    "Snapshot format version {} is not compatible with this version of difftree",
                    ver
                )
            }
            DiffTreeError::OutputNotRegularFile(path) => {
                format!(
                    "Refusing to overwrite {:?} because it is not a regular file. Choose another output path.",
                    path
                )
            }
            DiffTreeError::InvalidConfiguration(msg) => {
                format!("Invalid configuration: {}. Check the command line flags.", msg)
            }
            _ => self.to_string(),
        }
    }
}
