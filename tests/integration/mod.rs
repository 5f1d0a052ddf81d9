//! Integration tests for difftree
//!
//! Each test builds one or two real trees, runs them through [`RunState`] and
//! checks the report lines that come out.

use ::difftree::*;
use filetime::{set_file_times, FileTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;

/// Two trees and the settings to compare them with
pub struct DiffTestHarness {
    pub old: TempDir,
    pub new: TempDir,
    pub config: DiffConfig,
    pub file_generator: FileGenerator,
}

impl DiffTestHarness {
    /// Create a harness comparing with the given configuration
    pub fn new(config: DiffConfig) -> Self {
        Self {
            old: TempDir::new().unwrap(),
            new: TempDir::new().unwrap(),
            config,
            file_generator: FileGenerator::new(42),
        }
    }

    /// Write `content` to `rel` below `root`, pinning its timestamps
    pub fn write(root: &Path, rel: &str, content: &[u8]) -> PathBuf {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        let stamp = FileTime::from_unix_time(1_700_000_000, 0);
        set_file_times(&path, stamp, stamp).unwrap();
        path
    }

    /// Populate both trees with the same generated project
    pub fn generate_twin_project(&mut self, dirs: usize, files_per_dir: usize) -> usize {
        let mut count = 0;
        for d in 0..dirs {
            for f in 0..files_per_dir {
                let rel = format!("dir_{}/file_{}.txt", d, f);
                let content = self.file_generator.generate_file_content(10..200);
                Self::write(self.old.path(), &rel, &content);
                Self::write(self.new.path(), &rel, &content);
                count += 1;
            }
            count += 1;
        }
        // Directories were touched by file creation; pin them too
        for root in [self.old.path(), self.new.path()] {
            for d in 0..dirs {
                let stamp = FileTime::from_unix_time(1_700_000_000, 0);
                set_file_times(root.join(format!("dir_{}", d)), stamp, stamp).unwrap();
            }
        }
        count
    }

    /// Compare old with new and return the rendered lines, sorted
    pub fn diff(&self) -> Vec<String> {
        let mut state = RunState::new(self.config.clone(), CancelToken::new()).unwrap();
        let mut lines: Vec<ReportLine> = Vec::new();
        state.process_argument(self.old.path(), &mut lines).unwrap();
        let report = state.process_argument(self.new.path(), &mut lines).unwrap();
        info!("Compared trees: {:?}", report.summary);

        let mut out: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
        out.sort();
        out
    }
}

/// Deterministic content generator
pub struct FileGenerator {
    rng: StdRng,
}

impl FileGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn generate_file_content(&mut self, size_range: std::ops::Range<usize>) -> Vec<u8> {
        let size = self.rng.random_range(size_range);
        (0..size)
            .map(|_| self.rng.random_range(b'a'..=b'z'))
            .collect()
    }
}

fn hash_config(kind: DigestKind) -> DiffConfig {
    DiffConfigBuilder::new().digest(kind).build().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_addition() {
        let harness = DiffTestHarness::new(DiffConfig::default());
        DiffTestHarness::write(harness.new.path(), "a.txt", b"hello");

        assert_eq!(harness.diff(), vec!["+ f [a.txt]"]);
    }

    #[test]
    fn test_deletion() {
        let harness = DiffTestHarness::new(DiffConfig::default());
        DiffTestHarness::write(harness.old.path(), "a.txt", b"hello");

        assert_eq!(harness.diff(), vec!["- f [a.txt]"]);
    }

    #[test]
    fn test_size_change_skips_digest() {
        let harness = DiffTestHarness::new(hash_config(DigestKind::Legacy16));
        DiffTestHarness::write(harness.old.path(), "a.txt", b"hello");
        DiffTestHarness::write(harness.new.path(), "a.txt", b"goodbye");

        let lines = harness.diff();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("s[5->7]"));
        assert!(!lines[0].contains("md5["));
    }

    #[test]
    fn test_same_size_digest_change() {
        let harness = DiffTestHarness::new(hash_config(DigestKind::Strong32));
        DiffTestHarness::write(harness.old.path(), "a.txt", b"hello");
        DiffTestHarness::write(harness.new.path(), "a.txt", b"world");

        let lines = harness.diff();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with(
            "sha256[2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824->"
        ));
        assert!(lines[0].ends_with("f [a.txt]"));
    }

    #[cfg(unix)]
    #[test]
    fn test_quick_mode_ignores_metadata() {
        use std::os::unix::fs::PermissionsExt;

        let config = DiffConfigBuilder::new().quick(true).build().unwrap();
        let harness = DiffTestHarness::new(config);
        DiffTestHarness::write(harness.old.path(), "a.txt", b"hello");
        let path = DiffTestHarness::write(harness.new.path(), "a.txt", b"HELLO");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();
        filetime::set_file_mtime(&path, FileTime::from_unix_time(1_000, 0)).unwrap();

        assert!(harness.diff().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_permission_and_mtime_fragments() {
        use std::os::unix::fs::PermissionsExt;

        let harness = DiffTestHarness::new(DiffConfig::default());
        let old = DiffTestHarness::write(harness.old.path(), "run.sh", b"#!/bin/sh\n");
        fs::set_permissions(&old, fs::Permissions::from_mode(0o644)).unwrap();
        let new = DiffTestHarness::write(harness.new.path(), "run.sh", b"#!/bin/sh\n");
        fs::set_permissions(&new, fs::Permissions::from_mode(0o4755)).unwrap();
        filetime::set_file_mtime(&new, FileTime::from_unix_time(1_700_000_060, 0)).unwrap();

        let lines = harness.diff();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("p[rw-r--r-->rwsr-xr-x] mt["), "{}", lines[0]);
        assert!(lines[0].ends_with("f [run.sh]"));
    }

    #[test]
    fn test_atime_compared_only_on_request() {
        let harness = DiffTestHarness::new(DiffConfig::default());
        DiffTestHarness::write(harness.old.path(), "a", b"x");
        let new = DiffTestHarness::write(harness.new.path(), "a", b"x");
        set_file_times(
            &new,
            FileTime::from_unix_time(1_700_000_500, 0),
            FileTime::from_unix_time(1_700_000_000, 0),
        )
        .unwrap();
        assert!(harness.diff().is_empty());

        let mut harness = harness;
        harness.config.compare_atime = true;
        let lines = harness.diff();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("at["));
    }

    #[test]
    fn test_identical_trees_are_silent() {
        let mut harness = DiffTestHarness::new(hash_config(DigestKind::Legacy16));
        let count = harness.generate_twin_project(4, 6);
        assert_eq!(count, 28);

        assert!(harness.diff().is_empty());
    }

    #[test]
    fn test_same_tree_twice_is_silent() {
        let mut harness = DiffTestHarness::new(hash_config(DigestKind::Strong32));
        harness.generate_twin_project(3, 3);

        let mut state = RunState::new(harness.config.clone(), CancelToken::new()).unwrap();
        let mut lines: Vec<ReportLine> = Vec::new();
        state.process_argument(harness.old.path(), &mut lines).unwrap();
        state.process_argument(harness.old.path(), &mut lines).unwrap();
        assert!(lines.is_empty());
    }

    #[test]
    fn test_walker_completeness() {
        let mut harness = DiffTestHarness::new(DiffConfig::default());
        let expected = harness.generate_twin_project(5, 7);

        let mut visits = 0usize;
        let walker = walker::TreeWalker::new(harness.old.path(), CancelToken::new());
        let outcome = walker
            .walk(&mut |entry: &walker::WalkEntry<'_>| {
                if entry.depth() > 0 {
                    visits += 1;
                }
                VisitControl::Continue
            })
            .unwrap();

        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(visits, expected);
    }

    #[test]
    fn test_exclusion_boundaries() {
        let list: ExclusionList = ["/etc"].into_iter().collect();
        assert!(list.is_excluded(Path::new("/etc")));
        assert!(list.is_excluded(Path::new("/etc/passwd")));
        assert!(!list.is_excluded(Path::new("/etcetera/file")));
    }

    #[test]
    fn test_excluded_subtree_not_reported() {
        let harness_config = DiffConfig::default();
        let mut harness = DiffTestHarness::new(harness_config);
        DiffTestHarness::write(harness.old.path(), "keep.txt", b"k");
        DiffTestHarness::write(harness.new.path(), "keep.txt", b"k");
        DiffTestHarness::write(harness.new.path(), "tmp/junk", b"j");

        let new_root = fs::canonicalize(harness.new.path()).unwrap();
        harness.config.exclusions.add(new_root.join("tmp"));

        assert!(harness.diff().is_empty());
    }

    #[test]
    fn test_type_change_is_a_fragment() {
        let harness = DiffTestHarness::new(DiffConfigBuilder::new().quick(false).build().unwrap());
        DiffTestHarness::write(harness.old.path(), "thing", b"");
        fs::create_dir(harness.new.path().join("thing")).unwrap();

        let lines = harness.diff();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("t[f->d]"), "{}", lines[0]);
        assert!(lines[0].ends_with("d [thing]"));
    }

    #[test]
    #[traced_test]
    fn test_legacy_hash_snapshot_downgrades() {
        let harness = DiffTestHarness::new(DiffConfig::default());
        DiffTestHarness::write(harness.new.path(), "a.txt", b"hello");
        let root = fs::canonicalize(harness.new.path()).unwrap();

        let legacy = harness.old.path().join("old.dt");
        fs::write(
            &legacy,
            format!(
                "%DIFFTREE-0.6\nVER=1\nBASE={}\nMODE=HASH\nSTART=\"2014/01/01@00:00:00\"\n\
                 KEY=\"/a.txt\"|TYPE=f|SIZE=5|UID=0|GID=0|PERM=0644|MTIME=0|ATIME=0|CTIME=0|INODE=9|HLINKS=1|BLOCKS=8|MD5=\"5d41402abc4b2a76b9719d911017c592\"|\n\
                 RECORDS=1\n",
                root.display()
            ),
        )
        .unwrap();

        let mut state = RunState::new(DiffConfig::default(), CancelToken::new()).unwrap();
        let mut lines: Vec<ReportLine> = Vec::new();
        let report = state.process_argument(&legacy, &mut lines).unwrap();
        assert_eq!(report.kind, engine::RootKind::SnapshotFile);
        assert!(!state.config().hashing());
        assert!(state.config().quick);

        state.process_argument(&root, &mut lines).unwrap();
        assert!(lines.is_empty());
    }
}
