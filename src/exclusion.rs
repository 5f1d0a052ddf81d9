//! Absolute path-prefix exclusions
//!
//! An [`ExclusionList`] holds absolute path prefixes. A path is excluded when
//! it equals a prefix or continues it at a path-separator boundary, so
//! `/etc` excludes `/etc` and `/etc/passwd` but not `/etcetera/file`.

use crate::error::{DiffTreeError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Ordered list of excluded path prefixes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExclusionList {
    prefixes: Vec<PathBuf>,
}

impl ExclusionList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a prefix
    pub fn add(&mut self, prefix: impl Into<PathBuf>) {
        self.prefixes.push(prefix.into());
    }

    /// Parse one prefix per line; blank lines and `#` comments are skipped
    pub fn parse(text: &str) -> Self {
        let prefixes = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(PathBuf::from)
            .collect();
        Self { prefixes }
    }

    /// Load prefixes from a file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| DiffTreeError::path_io(path, e))?;
        let list = Self::parse(&text);
        debug!("Loaded {} exclusions from {:?}", list.len(), path);
        Ok(list)
    }

    /// Add every prefix of `other` after the current ones
    pub fn extend(&mut self, other: ExclusionList) {
        self.prefixes.extend(other.prefixes);
    }

    /// Resolve every prefix to its canonical form
    ///
    /// Walked roots are canonical, so a prefix spelled through a symlink or
    /// relative to the working directory would otherwise never match. A
    /// prefix that cannot be resolved (usually because it does not exist
    /// yet) is kept as given.
    pub fn canonicalize(&mut self) {
        for prefix in &mut self.prefixes {
            match fs::canonicalize(&*prefix) {
                Ok(resolved) => {
                    if resolved != *prefix {
                        debug!("Exclusion {:?} resolves to {:?}", prefix, resolved);
                        *prefix = resolved;
                    }
                }
                Err(e) => trace!("Keeping exclusion {:?} as given: {}", prefix, e),
            }
        }
    }

    /// Check if `path` falls under any prefix
    ///
    /// Matching is component-wise: a prefix only matches whole path
    /// components, never part of a file name.
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.prefixes.iter().any(|prefix| path.starts_with(prefix))
    }

    /// Configured prefixes in order
    pub fn prefixes(&self) -> &[PathBuf] {
        &self.prefixes
    }

    /// Number of prefixes
    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    /// Check if no prefixes are configured
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

impl<P: Into<PathBuf>> FromIterator<P> for ExclusionList {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self {
            prefixes: iter.into_iter().map(Into::into).collect(),
        }
    }
}
