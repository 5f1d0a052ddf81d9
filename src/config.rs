//! Run configuration
//!
//! [`DiffConfig`] is the small settings structure the core consumes: which
//! digest (if any) to compute, quick/count mode, atime handling, exclusions,
//! debug level and the optional snapshot output path. It can be built in code
//! with [`DiffConfigBuilder`], loaded from a JSON file, or filled in by the
//! CLI, and is checked with [`DiffConfig::normalize`] before a run starts.
//!
//! ## Mode rules
//!
//! - Hash mode and count mode are mutually exclusive.
//! - Enabling hash mode forces quick mode off.
//!
//! ## Example
//!
//! ```rust
//! use difftree::config::{DiffConfigBuilder, ScanMode};
//! use difftree::digest::DigestKind;
//!
//! let config = DiffConfigBuilder::new()
//!     .digest(DigestKind::Strong32)
//!     .quick(true)
//!     .exclude("/proc")
//!     .build()
//!     .unwrap();
//!
//! // Hashing wins over quick mode
//! assert!(!config.quick);
//! assert_eq!(config.scan_mode(), ScanMode::Hash);
//! ```

use crate::diff::CompareOptions;
use crate::digest::DigestKind;
use crate::error::{DiffTreeError, Result};
use crate::exclusion::ExclusionList;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Mode recorded in a snapshot header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanMode {
    /// Content digests were computed
    Hash,
    /// Only existence and size matter
    Quick,
    /// Full metadata comparison without content data
    Normal,
    /// Byte and line counts were computed
    Count,
}

impl ScanMode {
    /// Header spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Hash => "HASH",
            ScanMode::Quick => "QUICK",
            ScanMode::Normal => "NORMAL",
            ScanMode::Count => "COUNT",
        }
    }

    /// Parse the header spelling
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "HASH" => Some(ScanMode::Hash),
            "QUICK" => Some(ScanMode::Quick),
            "NORMAL" => Some(ScanMode::Normal),
            "COUNT" => Some(ScanMode::Count),
            _ => None,
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for one difftree run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Digest to compute for regular files; `None` disables hashing
    pub digest: Option<DigestKind>,
    /// Compare only existence and size
    pub quick: bool,
    /// Record byte/line counts instead of digests
    pub count: bool,
    /// Include access time in comparisons
    pub compare_atime: bool,
    /// Put back access times after reading file content
    pub preserve_atime: bool,
    /// Absolute path prefixes to leave out
    pub exclusions: ExclusionList,
    /// Diagnostic verbosity (0 = warnings only)
    pub debug_level: u8,
    /// Where to write the snapshot of the first walked directory
    pub output: Option<PathBuf>,
}

impl DiffConfig {
    /// Load a configuration from a JSON file
    ///
    /// Missing fields take their default values.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| DiffTreeError::path_io(path, e))?;
        let config: DiffConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Check if content hashing is enabled
    pub fn hashing(&self) -> bool {
        self.digest.is_some()
    }

    /// Enforce the mode rules
    ///
    /// # Errors
    ///
    /// Returns [`DiffTreeError::InvalidConfiguration`] when hash and count
    /// mode are both requested.
    ///
    /// Exclusion prefixes are resolved to canonical paths here, matching the
    /// canonical roots that get walked.
    pub fn normalize(&mut self) -> Result<()> {
        if self.hashing() && self.count {
            return Err(DiffTreeError::InvalidConfiguration(
                "hash mode and count mode are mutually exclusive".to_string(),
            ));
        }
        if self.hashing() {
            self.quick = false;
        }
        self.exclusions.canonicalize();
        Ok(())
    }

    /// Mode to record in snapshot headers
    pub fn scan_mode(&self) -> ScanMode {
        if self.hashing() {
            ScanMode::Hash
        } else if self.count {
            ScanMode::Count
        } else if self.quick {
            ScanMode::Quick
        } else {
            ScanMode::Normal
        }
    }

    /// Comparison switches derived from the mode flags
    pub fn compare_options(&self) -> CompareOptions {
        CompareOptions {
            hash: self.hashing(),
            count: self.count,
            quick: self.quick,
            atime: self.compare_atime,
        }
    }

    /// Downgrade the run so it can be compared with a snapshot taken in `file_mode`
    ///
    /// Returns `true` if anything changed. Every downgrade is logged as a
    /// warning rather than treated as an error.
    pub fn reconcile_with(&mut self, file_mode: ScanMode) -> bool {
        let before = self.clone();

        match file_mode {
            ScanMode::Hash => {
                if !self.hashing() {
                    warn!(
                        "Snapshot was recorded in HASH mode but hashing is off, forcing quick mode [HASH->{}]",
                        before.scan_mode()
                    );
                    self.quick = true;
                    self.count = false;
                }
            }
            ScanMode::Quick => {
                if !self.quick {
                    warn!(
                        "Snapshot was recorded in QUICK mode, downgrading current run [QUICK->{}]",
                        before.scan_mode()
                    );
                    self.quick = true;
                    self.digest = None;
                    self.count = false;
                }
            }
            ScanMode::Normal => {
                if self.hashing() || self.count {
                    warn!(
                        "Snapshot was recorded in NORMAL mode, disabling content comparison [NORMAL->{}]",
                        before.scan_mode()
                    );
                    self.digest = None;
                    self.count = false;
                }
            }
            ScanMode::Count => {
                if self.hashing() {
                    warn!("Snapshot was recorded in COUNT mode, disabling hashing [COUNT->HASH]");
                    self.digest = None;
                }
            }
        }

        *self != before
    }

    /// Switch to the digest algorithm a loaded snapshot was hashed with
    ///
    /// Digests of different algorithms cannot be compared, so a hashing run
    /// adopts `file_kind` for every later argument. Returns `true` if the
    /// digest changed. A run with hashing off is left alone.
    pub fn reconcile_digest(&mut self, file_kind: DigestKind) -> bool {
        match self.digest {
            Some(kind) if kind != file_kind => {
                warn!(
                    "Snapshot digests are {} but this run computes {}, switching to {}",
                    file_kind.label(),
                    kind.label(),
                    file_kind.label()
                );
                self.digest = Some(file_kind);
                true
            }
            _ => false,
        }
    }
}

/// Builder for [`DiffConfig`]
#[derive(Debug, Clone, Default)]
pub struct DiffConfigBuilder {
    config: DiffConfig,
}

impl DiffConfigBuilder {
    /// Start from the defaults: no hashing, full metadata comparison
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: DiffConfig) -> Self {
        Self { config }
    }

    /// Compute digests of this kind
    pub fn digest(mut self, kind: DigestKind) -> Self {
        self.config.digest = Some(kind);
        self
    }

    /// Compare only existence and size
    pub fn quick(mut self, quick: bool) -> Self {
        self.config.quick = quick;
        self
    }

    /// Record byte/line counts
    pub fn count(mut self, count: bool) -> Self {
        self.config.count = count;
        self
    }

    /// Compare access times
    pub fn compare_atime(mut self, compare: bool) -> Self {
        self.config.compare_atime = compare;
        self
    }

    /// Restore access times after reading
    pub fn preserve_atime(mut self, preserve: bool) -> Self {
        self.config.preserve_atime = preserve;
        self
    }

    /// Add an exclusion prefix
    pub fn exclude(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.config.exclusions.add(prefix);
        self
    }

    /// Add several exclusion prefixes
    pub fn exclusions(mut self, list: ExclusionList) -> Self {
        self.config.exclusions.extend(list);
        self
    }

    /// Set the diagnostic verbosity
    pub fn debug_level(mut self, level: u8) -> Self {
        self.config.debug_level = level;
        self
    }

    /// Write the first walked snapshot to `path`
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output = Some(path.into());
        self
    }

    /// Validate and produce the configuration
    pub fn build(self) -> Result<DiffConfig> {
        let mut config = self.config;
        config.normalize()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_count_conflict() {
        let result = DiffConfigBuilder::new()
            .digest(DigestKind::Legacy16)
            .count(true)
            .build();
        assert!(matches!(result, Err(DiffTreeError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_scan_mode() {
        assert_eq!(DiffConfig::default().scan_mode(), ScanMode::Normal);
        assert_eq!(
            DiffConfigBuilder::new().quick(true).build().unwrap().scan_mode(),
            ScanMode::Quick
        );
        assert_eq!(
            DiffConfigBuilder::new().count(true).build().unwrap().scan_mode(),
            ScanMode::Count
        );
        for mode in [ScanMode::Hash, ScanMode::Quick, ScanMode::Normal, ScanMode::Count] {
            assert_eq!(ScanMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(ScanMode::parse("FAST"), None);
    }

    #[test]
    fn test_reconcile_hash_file_in_quick_run() {
        let mut config = DiffConfigBuilder::new().quick(true).build().unwrap();
        let changed = config.reconcile_with(ScanMode::Hash);
        // Already quick and not hashing: nothing to do
        assert!(!changed);

        let mut config = DiffConfig::default();
        assert!(config.reconcile_with(ScanMode::Hash));
        assert!(config.quick);
        assert!(!config.hashing());
    }

    #[test]
    fn test_reconcile_quick_file() {
        let mut config = DiffConfigBuilder::new()
            .digest(DigestKind::Strong32)
            .build()
            .unwrap();
        assert!(config.reconcile_with(ScanMode::Quick));
        assert!(config.quick);
        assert!(!config.hashing());
    }

    #[test]
    fn test_reconcile_normal_file_in_hash_run() {
        let mut config = DiffConfigBuilder::new()
            .digest(DigestKind::Legacy16)
            .build()
            .unwrap();
        assert!(config.reconcile_with(ScanMode::Normal));
        assert!(!config.hashing());
        assert!(!config.quick);
    }

    #[test]
    fn test_hash_file_compatible_with_hash_run() {
        let mut config = DiffConfigBuilder::new()
            .digest(DigestKind::Legacy16)
            .build()
            .unwrap();
        assert!(!config.reconcile_with(ScanMode::Hash));
    }

    #[test]
    fn test_reconcile_digest_kind() {
        let mut config = DiffConfigBuilder::new()
            .digest(DigestKind::Legacy16)
            .build()
            .unwrap();
        assert!(config.reconcile_digest(DigestKind::Strong32));
        assert_eq!(config.digest, Some(DigestKind::Strong32));
        assert!(!config.reconcile_digest(DigestKind::Strong32));

        // Hashing stays off when the run never asked for it
        let mut config = DiffConfigBuilder::new().quick(true).build().unwrap();
        assert!(!config.reconcile_digest(DigestKind::Legacy16));
        assert_eq!(config.digest, None);
    }

    #[test]
    fn test_json_round_trip() {
        let config = DiffConfigBuilder::new()
            .digest(DigestKind::Strong32)
            .exclude("/proc")
            .output("/tmp/base.dt")
            .build()
            .unwrap();

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"sha256\""));
        let parsed: DiffConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_json_defaults() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("difftree.json");
        fs::write(&path, r#"{ "quick": true, "exclusions": ["/sys"] }"#).unwrap();

        let config = DiffConfig::from_json_file(&path).unwrap();
        assert!(config.quick);
        assert!(!config.hashing());
        assert_eq!(config.exclusions.len(), 1);
    }
}
