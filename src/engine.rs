//! Diff engine and per-run state
//!
//! [`DiffEngine`] builds the *current* snapshot for one root argument. Each
//! entry, whether it comes from a directory walk or from a snapshot file, goes
//! through the same steps:
//!
//! 1. exclusion check (an excluded directory is pruned)
//! 2. key derivation relative to the root
//! 3. digest or byte/line counts for regular files, depending on the mode
//! 4. lookup in the baseline and an addition or change line
//! 5. insertion into the current snapshot
//!
//! Once every entry has been seen, the baseline is scanned for keys that did
//! not show up again and a deletion line is emitted for each.
//!
//! [`RunState`] owns the baseline between arguments. After each argument the
//! freshly built snapshot becomes the baseline for the next one, so
//! `difftree a b c` compares `a` with `b` and then `b` with `c`.
//!
//! Cancellation is cooperative: the token is polled for every entry and every
//! step of the deletion scan, and a cancelled argument leaves the baseline
//! untouched.

use crate::codec::{save_snapshot, SnapshotReader};
use crate::compression::count_file;
use crate::config::DiffConfig;
use crate::diff::{compare_records, CompareOptions};
use crate::digest::{digest_file, DigestKind};
use crate::error::{DiffTreeError, Result};
use crate::report::{ReportLine, ReportSink};
use crate::table::{Insert, Snapshot, DEFAULT_BUCKETS};
use crate::types::{CancelToken, ContentSummary, FileRecord, Outcome, RunSummary, VisitControl};
use crate::utils::{key_to_path, relative_key, restore_atime};
use crate::walker::{EntryFlag, TreeWalker, Visitor, WalkEntry};
use chrono::Local;
use std::fs::{self, Metadata};
use std::io::{self, BufRead};
use std::mem;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace, warn};

/// What the engine hands back once an argument is processed
#[derive(Debug)]
pub struct EngineOutput {
    /// Whether every entry and the deletion scan were processed
    pub outcome: Outcome,
    /// Snapshot of the current argument (partial when cancelled)
    pub snapshot: Snapshot,
    /// Counters for this argument
    pub summary: RunSummary,
}

/// Builds one snapshot and reports its differences from a baseline
pub struct DiffEngine<'a, S: ReportSink + ?Sized> {
    config: &'a DiffConfig,
    options: CompareOptions,
    cancel: &'a CancelToken,
    root: PathBuf,
    baseline: Option<&'a Snapshot>,
    current: Snapshot,
    sink: &'a mut S,
    summary: RunSummary,
    pending: Option<DiffTreeError>,
    preserve_atime: bool,
    digest_mismatch: bool,
}

impl<'a, S: ReportSink + ?Sized> DiffEngine<'a, S> {
    /// Create an engine for entries below `root`
    ///
    /// `size_hint` seeds the current snapshot's bucket count, normally the
    /// size of the baseline.
    pub fn new(
        config: &'a DiffConfig,
        cancel: &'a CancelToken,
        root: impl Into<PathBuf>,
        baseline: Option<&'a Snapshot>,
        size_hint: usize,
        sink: &'a mut S,
    ) -> Self {
        Self {
            config,
            options: config.compare_options(),
            cancel,
            root: root.into(),
            baseline,
            current: Snapshot::init(size_hint),
            sink,
            summary: RunSummary::default(),
            pending: None,
            preserve_atime: config.preserve_atime,
            digest_mismatch: false,
        }
    }

    /// Root the keys are relative to
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Diff one record against the baseline and add it to the current snapshot
    ///
    /// # Errors
    ///
    /// Returns [`DiffTreeError::DuplicateKey`] if `key` was already
    /// inserted, or the sink's error if a report line cannot be written.
    pub fn process_record(&mut self, key: &[u8], record: FileRecord) -> Result<()> {
        let line = match self.baseline.and_then(|b| b.lookup(key)) {
            None if self.baseline.is_some() => Some(ReportLine::Added {
                kind: record.kind,
                key: String::from_utf8_lossy(key).into_owned(),
            }),
            None => None,
            Some(old) => {
                self.check_digest_kinds(old, &record);
                let changes = compare_records(old, &record, &self.options);
                if changes.is_empty() {
                    None
                } else {
                    Some(ReportLine::Changed {
                        kind: record.kind,
                        key: String::from_utf8_lossy(key).into_owned(),
                        changes,
                    })
                }
            }
        };

        if let Insert::Duplicate(_) = self.current.insert_unique(key, record) {
            return Err(DiffTreeError::DuplicateKey(
                String::from_utf8_lossy(key).into_owned(),
            ));
        }
        self.summary.records += 1;

        if self.current.needs_growth() {
            let table = mem::take(&mut self.current);
            self.current = table.grow_if_needed();
        }

        if let Some(line) = line {
            if line.is_added() {
                self.summary.added += 1;
            } else {
                self.summary.changed += 1;
            }
            self.sink.emit(line)?;
        }
        Ok(())
    }

    fn check_digest_kinds(&mut self, old: &FileRecord, new: &FileRecord) {
        if self.digest_mismatch || !self.options.hash {
            return;
        }
        if let (Some(a), Some(b)) = (old.content.digest(), new.content.digest()) {
            if a.kind() != b.kind() {
                warn!(
                    "Baseline digests are {} but these are {}, every file of equal size will show a digest change",
                    a.kind().label(),
                    b.kind().label()
                );
                self.digest_mismatch = true;
            }
        }
    }

    /// Walk `walker`'s tree through this engine and finish with the deletion scan
    pub fn run_walk(mut self, walker: &TreeWalker) -> Result<EngineOutput> {
        info!("Processing directory {:?}", walker.root());
        let outcome = walker.walk(&mut self)?;
        if let Some(err) = self.pending.take() {
            return Err(err);
        }
        self.finish(outcome)
    }

    /// Feed every record of an opened snapshot file through this engine
    pub fn run_load<R: BufRead>(mut self, reader: &mut SnapshotReader<R>) -> Result<EngineOutput> {
        info!("Loading snapshot of {:?}", reader.header().base);
        while let Some(loaded) = reader.next_record()? {
            if self.cancel.is_cancelled() {
                debug!("Load cancelled after {} records", reader.records_read());
                return self.finish(Outcome::Cancelled);
            }
            if self
                .config
                .exclusions
                .is_excluded(&key_to_path(&self.root, &loaded.key))
            {
                trace!("Excluded [{}]", String::from_utf8_lossy(&loaded.key));
                continue;
            }
            self.process_record(&loaded.key, loaded.record)?;
        }
        self.finish(Outcome::Completed)
    }

    /// Report baseline keys that are missing from the current snapshot
    fn finish(mut self, outcome: Outcome) -> Result<EngineOutput> {
        if outcome.is_cancelled() {
            return Ok(self.into_output(Outcome::Cancelled));
        }

        if let Some(baseline) = self.baseline {
            let cancel = self.cancel;
            let current = &self.current;
            let sink = &mut *self.sink;
            let summary = &mut self.summary;
            let mut failure = None;
            let mut interrupted = false;

            let completed = baseline.traverse(|key, old| {
                if cancel.is_cancelled() {
                    interrupted = true;
                    return ControlFlow::Break(());
                }
                if current.contains(key) {
                    return ControlFlow::Continue(());
                }
                let line = ReportLine::Deleted {
                    kind: old.kind,
                    key: String::from_utf8_lossy(key).into_owned(),
                };
                match sink.emit(line) {
                    Ok(()) => {
                        summary.deleted += 1;
                        ControlFlow::Continue(())
                    }
                    Err(e) => {
                        failure = Some(e);
                        ControlFlow::Break(())
                    }
                }
            });

            if let Some(err) = failure {
                return Err(err);
            }
            if !completed && interrupted {
                debug!("Deletion scan cancelled");
                return Ok(self.into_output(Outcome::Cancelled));
            }
        }

        Ok(self.into_output(Outcome::Completed))
    }

    fn into_output(self, outcome: Outcome) -> EngineOutput {
        EngineOutput {
            outcome,
            snapshot: self.current,
            summary: self.summary,
        }
    }

    /// Observe content of a regular file according to the mode
    fn content_of(&mut self, path: &Path, metadata: &Metadata) -> ContentSummary {
        let content = if let Some(kind) = self.config.digest {
            digest_file(path, kind).map(ContentSummary::Digest)
        } else if self.config.count {
            count_file(path).map(|c| ContentSummary::Counts {
                bytes: c.bytes,
                lines: c.lines,
            })
        } else {
            return ContentSummary::None;
        };

        let content = match content {
            Ok(content) => content,
            Err(e) => {
                error!("Unable to read [{}]: {}", path.display(), e);
                self.summary.errors += 1;
                ContentSummary::None
            }
        };

        if self.preserve_atime {
            match restore_atime(path, metadata) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                    debug!("Not permitted to restore access times, giving up on it");
                    self.preserve_atime = false;
                }
                Err(e) => warn!("Unable to restore access time of [{}]: {}", path.display(), e),
            }
        }

        content
    }

    fn visit_entry(&mut self, entry: &WalkEntry<'_>) -> Result<VisitControl> {
        let path = entry.path();

        if self.config.exclusions.is_excluded(path) {
            trace!("Excluded {:?}", path);
            return Ok(match entry.flag() {
                EntryFlag::Dir => VisitControl::SkipSubtree,
                _ => VisitControl::Continue,
            });
        }

        if entry.flag() == EntryFlag::DirNotReadable {
            error!(
                "Unable to read directory [{}]: {}",
                path.display(),
                entry.error().map(|e| e.to_string()).unwrap_or_default()
            );
            self.summary.errors += 1;
            return Ok(VisitControl::Continue);
        }

        let Some(key) = relative_key(path, &self.root)? else {
            return Ok(VisitControl::Continue);
        };

        let record = match entry.metadata() {
            Some(metadata) => {
                let record = FileRecord::from_metadata(metadata);
                if record.kind.is_regular() {
                    let content = self.content_of(path, metadata);
                    record.with_content(content)
                } else {
                    record
                }
            }
            None => {
                error!(
                    "Unable to stat [{}]: {}",
                    path.display(),
                    entry.error().map(|e| e.to_string()).unwrap_or_default()
                );
                self.summary.errors += 1;
                FileRecord::unknown()
            }
        };

        self.process_record(&key, record)?;
        Ok(VisitControl::Continue)
    }
}

impl<S: ReportSink + ?Sized> Visitor for DiffEngine<'_, S> {
    fn visit(&mut self, entry: &WalkEntry<'_>) -> VisitControl {
        if self.cancel.is_cancelled() {
            return VisitControl::Stop;
        }
        match self.visit_entry(entry) {
            Ok(control) => control,
            Err(e) => {
                self.pending = Some(e);
                VisitControl::Stop
            }
        }
    }
}

/// How a root argument was interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    /// A directory that was walked
    Directory,
    /// A snapshot file that was loaded
    SnapshotFile,
}

/// Result of one root argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentReport {
    /// Canonical path of the argument
    pub root: PathBuf,
    /// Directory or snapshot file
    pub kind: RootKind,
    /// Completed or cancelled
    pub outcome: Outcome,
    /// Counters
    pub summary: RunSummary,
}

/// State carried across root arguments
///
/// # Example
///
/// ```rust,no_run
/// use difftree::config::DiffConfig;
/// use difftree::engine::RunState;
/// use difftree::report::ReportLine;
/// use difftree::types::CancelToken;
/// use std::path::Path;
///
/// let mut state = RunState::new(DiffConfig::default(), CancelToken::new())?;
/// let mut lines: Vec<ReportLine> = Vec::new();
/// state.process_argument(Path::new("/etc"), &mut lines)?;
/// state.process_argument(Path::new("/etc.bak"), &mut lines)?;
/// for line in &lines {
///     println!("{}", line);
/// }
/// # Ok::<(), difftree::DiffTreeError>(())
/// ```
#[derive(Debug)]
pub struct RunState {
    config: DiffConfig,
    cancel: CancelToken,
    baseline: Option<Snapshot>,
    snapshot_written: bool,
}

impl RunState {
    /// Validate `config` and start with no baseline
    pub fn new(mut config: DiffConfig, cancel: CancelToken) -> Result<Self> {
        config.normalize()?;
        Ok(Self {
            config,
            cancel,
            baseline: None,
            snapshot_written: false,
        })
    }

    /// Effective configuration (after any mode downgrades)
    pub fn config(&self) -> &DiffConfig {
        &self.config
    }

    /// Snapshot that the next argument is compared against
    pub fn baseline(&self) -> Option<&Snapshot> {
        self.baseline.as_ref()
    }

    /// Cancellation token shared with the signal handler
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Process one root argument
    ///
    /// A directory is walked; a regular file is loaded as a snapshot. Either
    /// way the result is diffed against the current baseline (if any) and
    /// then becomes the new baseline.
    ///
    /// # Errors
    ///
    /// I/O failures on the argument itself, corrupt snapshot files and
    /// resource limits abort this argument. The baseline is left as it was.
    pub fn process_argument<S: ReportSink + ?Sized>(
        &mut self,
        path: &Path,
        sink: &mut S,
    ) -> Result<ArgumentReport> {
        let root = fs::canonicalize(path).map_err(|e| DiffTreeError::path_io(path, e))?;
        let metadata = fs::metadata(&root).map_err(|e| DiffTreeError::path_io(&root, e))?;
        let size_hint = self
            .baseline
            .as_ref()
            .map(Snapshot::size)
            .unwrap_or(DEFAULT_BUCKETS);

        let (kind, output) = if metadata.is_file() {
            let mut reader = SnapshotReader::open(&root)?;
            let header = reader.header().clone();
            if self.config.reconcile_with(header.mode) {
                info!("Comparison mode is now {}", self.config.scan_mode());
            }
            reader.set_digest_kind(self.config.digest);

            let engine = DiffEngine::new(
                &self.config,
                &self.cancel,
                header.base,
                self.baseline.as_ref(),
                size_hint,
                sink,
            );
            (RootKind::SnapshotFile, engine.run_load(&mut reader)?)
        } else if metadata.is_dir() {
            let start = Local::now();
            let walker = TreeWalker::new(&root, self.cancel.clone());
            let engine = DiffEngine::new(
                &self.config,
                &self.cancel,
                &root,
                self.baseline.as_ref(),
                size_hint,
                sink,
            );
            let output = engine.run_walk(&walker)?;

            if !output.outcome.is_cancelled() && !self.snapshot_written {
                if let Some(out_path) = &self.config.output {
                    let count = save_snapshot(
                        out_path,
                        &output.snapshot,
                        &root,
                        self.config.scan_mode(),
                        &start,
                    )?;
                    info!("Saved {} records to {:?}", count, out_path);
                    self.snapshot_written = true;
                }
            }
            (RootKind::Directory, output)
        } else {
            error!("[{}] is not a regular file or a directory", root.display());
            return Err(DiffTreeError::UnsupportedRoot(root));
        };

        let EngineOutput {
            outcome,
            snapshot,
            summary,
        } = output;

        if outcome.is_cancelled() {
            warn!("Processing of {:?} was cancelled", root);
        } else {
            debug!(
                "Finished {:?}: {} records, {} changes",
                root,
                summary.records,
                summary.total_changes()
            );
            if let Some(kind) = digest_kind_of(&snapshot) {
                if self.config.reconcile_digest(kind) {
                    info!("Comparison mode is now {} using {}", self.config.scan_mode(), kind.label());
                }
            }
            self.baseline = Some(snapshot);
        }

        Ok(ArgumentReport {
            root,
            kind,
            outcome,
            summary,
        })
    }
}

/// Algorithm of the first digest found in `snapshot`
fn digest_kind_of(snapshot: &Snapshot) -> Option<DigestKind> {
    let mut found = None;
    snapshot.traverse(|_, record| match record.content.digest() {
        Some(digest) => {
            found = Some(digest.kind());
            ControlFlow::Break(())
        }
        None => ControlFlow::Continue(()),
    });
    found
}
