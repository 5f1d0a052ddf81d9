//! Snapshot file format
//!
//! A snapshot is saved as line-oriented text. The header identifies the
//! format and records how the snapshot was taken, each following line holds
//! one record as `|`-separated `KEY=VALUE` pairs, and a trailer carries the
//! record count:
//!
//! ```text
//! %DIFFTREE-0.3.0
//! VER=2
//! BASE=/etc
//! MODE=HASH
//! START="2024/05/01@12:00:00"
//! KEY="hosts"|TYPE=f|SIZE=220|UID=0|GID=0|PERM=0644|MTIME=1714550000|ATIME=1714550000|CTIME=1714550000|INODE=1234|HLINKS=1|BLOCKS=8|SHA256=...|
//! RECORDS=1
//! ```
//!
//! Version 2 is written. Version 1 files are read as well. They carry the
//! same twelve metadata fields but always name the digest `MD5`, whatever
//! its real length; the reader decodes it with the digest kind the caller
//! expects.
//!
//! [`SnapshotReader`] validates the header eagerly and then yields records one
//! by one, so a loader can feed them straight into the diff engine. Any
//! structural problem surfaces as [`DiffTreeError::Corruption`] (or
//! [`DiffTreeError::UnsupportedVersion`]); the caller discards whatever it
//! built from the file so far.

use crate::config::ScanMode;
use crate::digest::{ContentDigest, DigestKind};
use crate::error::{DiffTreeError, Result};
use crate::table::{Insert, Snapshot, DEFAULT_BUCKETS};
use crate::tokenizer::{tokenize, ParsedLine, TokenError, MAX_FIELDS, MAX_FIELD_LEN};
use crate::types::{ContentSummary, EntryKind, FileRecord};
use crate::utils::{atomic_write_with, format_datetime, path_bytes, path_from_bytes};
use chrono::{DateTime, Local};
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, error, warn};

/// First bytes of every snapshot file
pub const FORMAT_TAG: &str = "%DIFFTREE-";

/// Format version written by this build
pub const FORMAT_VERSION: u32 = 2;

/// Longest line accepted when reading
pub const MAX_LINE_LEN: usize = 64 * 1024;

const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Snapshot format revision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    /// Legacy layout, digest always named `MD5`
    V1,
    /// Current layout with explicit digest names and count fields
    V2,
}

impl FormatVersion {
    /// Number written in the `VER=` line
    pub fn number(&self) -> u32 {
        match self {
            FormatVersion::V1 => 1,
            FormatVersion::V2 => 2,
        }
    }
}

/// Header of a snapshot file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHeader {
    /// Version string of the program that wrote the file
    pub engine_version: String,
    /// Format revision
    pub version: FormatVersion,
    /// Root directory the keys are relative to
    pub base: PathBuf,
    /// Mode the snapshot was taken in
    pub mode: ScanMode,
    /// Local start time as written (`YYYY/MM/DD@HH:MM:SS`)
    pub start: String,
}

/// A record read back from a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedRecord {
    /// Key relative to the header's base
    pub key: Vec<u8>,
    /// Metadata
    pub record: FileRecord,
}

fn key_is_serializable(key: &[u8]) -> bool {
    !key.is_empty()
        && !key.iter().any(|&b| b == b'\n' || b == b'\r')
        && !key.windows(2).any(|w| w == b"\"|")
        && key.last() != Some(&b'"')
        && key.len() <= MAX_FIELD_LEN
}

/// Render one record line (without the newline)
pub fn encode_record(key: &[u8], record: &FileRecord) -> Vec<u8> {
    let mut line = Vec::with_capacity(key.len() + 192);
    line.extend_from_slice(b"KEY=\"");
    line.extend_from_slice(key);
    line.extend_from_slice(b"\"|");

    let fields = format!(
        "TYPE={}|SIZE={}|UID={}|GID={}|PERM={:04o}|MTIME={}|ATIME={}|CTIME={}|INODE={}|HLINKS={}|BLOCKS={}|",
        record.kind.code(),
        record.size,
        record.uid,
        record.gid,
        record.permissions & 0o7777,
        record.mtime,
        record.atime,
        record.ctime,
        record.inode,
        record.hardlinks,
        record.blocks,
    );
    line.extend_from_slice(fields.as_bytes());

    match &record.content {
        ContentSummary::Digest(digest) if record.kind.is_regular() => {
            line.extend_from_slice(
                format!("{}={}|", digest.kind().field_name(), digest.to_hex()).as_bytes(),
            );
        }
        ContentSummary::Counts { bytes, lines } if record.kind.is_regular() => {
            line.extend_from_slice(format!("BYTES={}|LINES={}|", bytes, lines).as_bytes());
        }
        _ => {}
    }

    line
}

/// Serialize a snapshot to any writer
///
/// Records come out in table traversal order. A key that cannot be
/// represented in the line format (it contains a line break or a `"|`
/// sequence, or ends in a quote) is skipped with an error message and is
/// not counted.
///
/// # Returns
///
/// The number of records written, which is also the trailer value.
pub fn write_snapshot<W: Write>(
    writer: &mut W,
    snapshot: &Snapshot,
    base: &Path,
    mode: ScanMode,
    start: &DateTime<Local>,
) -> Result<usize> {
    writeln!(writer, "{}{}", FORMAT_TAG, ENGINE_VERSION)?;
    writeln!(writer, "VER={}", FORMAT_VERSION)?;

    let base_bytes = path_bytes(base);
    writer.write_all(b"BASE=")?;
    if base_bytes.contains(&b'|') {
        writer.write_all(b"\"")?;
        writer.write_all(&base_bytes)?;
        writer.write_all(b"\"")?;
    } else {
        writer.write_all(&base_bytes)?;
    }
    writer.write_all(b"\n")?;

    writeln!(writer, "MODE={}", mode)?;
    writeln!(writer, "START=\"{}\"", format_datetime(start))?;

    let mut written = 0usize;
    let mut failure = None;
    snapshot.traverse(|key, record| {
        if !key_is_serializable(key) {
            error!(
                "Unable to serialize record [{}], skipping",
                String::from_utf8_lossy(key)
            );
            return ControlFlow::Continue(());
        }
        let mut line = encode_record(key, record);
        line.push(b'\n');
        match writer.write_all(&line) {
            Ok(()) => {
                written += 1;
                ControlFlow::Continue(())
            }
            Err(e) => {
                failure = Some(e);
                ControlFlow::Break(())
            }
        }
    });
    if let Some(e) = failure {
        return Err(e.into());
    }

    writeln!(writer, "RECORDS={}", written)?;
    Ok(written)
}

/// Atomically write a snapshot file
///
/// # Errors
///
/// Returns [`DiffTreeError::OutputNotRegularFile`] if `path` exists and is
/// not a regular file, or an I/O error if writing fails. A failed write
/// leaves any previous file untouched.
pub fn save_snapshot(
    path: &Path,
    snapshot: &Snapshot,
    base: &Path,
    mode: ScanMode,
    start: &DateTime<Local>,
) -> Result<usize> {
    let mut count = 0;
    atomic_write_with(path, |writer| {
        count = write_snapshot(writer, snapshot, base, mode, start)?;
        Ok(())
    })?;
    debug!("Wrote {} records to {:?}", count, path);
    Ok(count)
}

fn corrupt(line: usize, msg: impl std::fmt::Display) -> DiffTreeError {
    DiffTreeError::corruption(format!("line {}: {}", line, msg))
}

fn text(value: &[u8], field: &str, line: usize) -> Result<String> {
    String::from_utf8(value.to_vec())
        .map_err(|_| corrupt(line, format!("{} is not valid UTF-8", field)))
}

fn number<T: FromStr>(value: &[u8], field: &str, line: usize) -> Result<T> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .ok_or_else(|| {
            corrupt(
                line,
                format!("{} is not a number [{}]", field, String::from_utf8_lossy(value)),
            )
        })
}

/// Streaming reader for snapshot files
pub struct SnapshotReader<R> {
    reader: R,
    line_no: usize,
    header: SnapshotHeader,
    digest_kind: Option<DigestKind>,
    records_read: usize,
    finished: bool,
    buf: Vec<u8>,
}

impl SnapshotReader<BufReader<File>> {
    /// Open a snapshot file and validate its header
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| DiffTreeError::path_io(path, e))?;
        Self::new(BufReader::new(file))
    }
}

impl<R: BufRead> SnapshotReader<R> {
    /// Read and validate the header from `reader`
    ///
    /// # Errors
    ///
    /// Fails with a corruption error when the preamble, the version line or
    /// any of `BASE`, `MODE` and `START` is missing or empty, and with
    /// [`DiffTreeError::UnsupportedVersion`] for an unknown version.
    pub fn new(reader: R) -> Result<Self> {
        let mut this = Self {
            reader,
            line_no: 0,
            header: SnapshotHeader {
                engine_version: String::new(),
                version: FormatVersion::V2,
                base: PathBuf::new(),
                mode: ScanMode::Normal,
                start: String::new(),
            },
            digest_kind: None,
            records_read: 0,
            finished: false,
            buf: Vec::new(),
        };
        this.header = this.read_header()?;
        debug!(
            "Snapshot header: version {} written by {} base {:?} mode {} start {}",
            this.header.version.number(),
            this.header.engine_version,
            this.header.base,
            this.header.mode,
            this.header.start
        );
        Ok(this)
    }

    /// Parsed header
    pub fn header(&self) -> &SnapshotHeader {
        &self.header
    }

    /// Digest kind to assume when a version 1 file says `MD5`
    ///
    /// Without a hint the kind is inferred from the hex length.
    pub fn set_digest_kind(&mut self, kind: Option<DigestKind>) {
        self.digest_kind = kind;
    }

    /// Records returned so far
    pub fn records_read(&self) -> usize {
        self.records_read
    }

    /// Read the next line into `self.buf` without its terminator
    ///
    /// Returns `false` at end of input.
    fn next_line(&mut self) -> Result<bool> {
        self.buf.clear();
        let limit = MAX_LINE_LEN as u64 + 1;
        let n = (&mut self.reader).take(limit).read_until(b'\n', &mut self.buf)?;
        if n == 0 {
            return Ok(false);
        }
        self.line_no += 1;

        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
        } else if self.buf.len() > MAX_LINE_LEN {
            return Err(DiffTreeError::FieldTooLong {
                line: self.line_no,
                len: self.buf.len(),
                limit: MAX_LINE_LEN,
            });
        }
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        Ok(true)
    }

    fn tokenize_line(&self) -> Result<ParsedLine> {
        tokenize(&self.buf).map_err(|e| match e {
            TokenError::FieldTooLong => DiffTreeError::FieldTooLong {
                line: self.line_no,
                len: self.buf.len(),
                limit: MAX_FIELD_LEN,
            },
            TokenError::TooManyFields => DiffTreeError::ResourceExhausted(format!(
                "line {}: more than {} fields",
                self.line_no, MAX_FIELDS
            )),
            other => corrupt(self.line_no, format!("malformed record: {}", other)),
        })
    }

    /// Read a header line that must hold exactly `KEY=<non-empty value>`
    fn header_value(&mut self, key: &str) -> Result<Vec<u8>> {
        if !self.next_line()? {
            return Err(DiffTreeError::corruption(format!(
                "{} missing, file may be corrupt",
                key
            )));
        }
        let parsed = self.tokenize_line()?;
        if parsed.pair_count() != 1 {
            return Err(corrupt(
                self.line_no,
                format!("expected {} line, found {} fields", key, parsed.field_count()),
            ));
        }
        match parsed.get(key) {
            Some(value) if !value.is_empty() => Ok(value.to_vec()),
            Some(_) => Err(corrupt(self.line_no, format!("{} is empty", key))),
            None => Err(corrupt(self.line_no, format!("{} is corrupted", key))),
        }
    }

    fn read_header(&mut self) -> Result<SnapshotHeader> {
        if !self.next_line()? || !self.buf.starts_with(FORMAT_TAG.as_bytes()) {
            return Err(DiffTreeError::corruption(
                "file does not appear to be a DIFFTREE file",
            ));
        }
        let engine_version = String::from_utf8_lossy(&self.buf[FORMAT_TAG.len()..])
            .trim()
            .to_string();
        if engine_version.is_empty() {
            return Err(corrupt(self.line_no, "preamble has no version"));
        }

        let ver = self.header_value("VER").map_err(|e| {
            if e.is_corruption() {
                DiffTreeError::corruption("file version missing, file may be corrupt")
            } else {
                e
            }
        })?;
        let version = match number::<u32>(&ver, "VER", self.line_no)? {
            1 => FormatVersion::V1,
            2 => FormatVersion::V2,
            other => return Err(DiffTreeError::UnsupportedVersion(other.to_string())),
        };

        let base = path_from_bytes(&self.header_value("BASE")?);

        let mode_text = text(&self.header_value("MODE")?, "MODE", self.line_no)?;
        let mode = match ScanMode::parse(&mode_text) {
            Some(ScanMode::Count) if version == FormatVersion::V1 => None,
            other => other,
        }
        .ok_or_else(|| corrupt(self.line_no, format!("unknown mode [{}]", mode_text)))?;

        let start = text(&self.header_value("START")?, "START", self.line_no)?;

        Ok(SnapshotHeader {
            engine_version,
            version,
            base,
            mode,
            start,
        })
    }

    /// Read the next record
    ///
    /// Returns `Ok(None)` once the `RECORDS=` trailer (or the end of the
    /// file) is reached. A trailer count that disagrees with the number of
    /// records read is logged but not fatal.
    pub fn next_record(&mut self) -> Result<Option<LoadedRecord>> {
        if self.finished {
            return Ok(None);
        }

        loop {
            if !self.next_line()? {
                warn!(
                    "Snapshot ended without a RECORDS trailer after {} records",
                    self.records_read
                );
                self.finished = true;
                return Ok(None);
            }
            if self.buf.is_empty() {
                continue;
            }

            let parsed = self.tokenize_line()?;
            if parsed.is_empty() {
                continue;
            }

            if parsed.pair_count() == 1 {
                if let Some(value) = parsed.get("RECORDS") {
                    if value.is_empty() {
                        return Err(corrupt(self.line_no, "record count is corrupted"));
                    }
                    let expected: usize = number(value, "RECORDS", self.line_no)?;
                    if expected != self.records_read {
                        warn!(
                            "[{}] records in file, [{}] records read",
                            expected, self.records_read
                        );
                    }
                    self.finished = true;
                    return Ok(None);
                }
            }

            let record = self.decode_record(&parsed)?;
            self.records_read += 1;
            return Ok(Some(record));
        }
    }

    fn decode_record(&self, parsed: &ParsedLine) -> Result<LoadedRecord> {
        let line = self.line_no;
        let version = self.header.version;
        let pairs = parsed.pair_count();
        let valid_count = match version {
            FormatVersion::V1 => pairs == 12 || pairs == 13,
            FormatVersion::V2 => (12..=14).contains(&pairs),
        };
        if !valid_count {
            return Err(corrupt(line, format!("malformed record, [{}] fields", parsed.field_count())));
        }

        let mut key = None;
        let mut kind = None;
        let mut size = None;
        let mut uid = None;
        let mut gid = None;
        let mut permissions = None;
        let mut mtime = None;
        let mut atime = None;
        let mut ctime = None;
        let mut inode = None;
        let mut hardlinks = None;
        let mut blocks = None;
        let mut digest = None;
        let mut bytes = None;
        let mut lines = None;

        for (name, value) in parsed.pairs() {
            match name {
                b"KEY" => {
                    let trimmed = value.strip_prefix(b"/").unwrap_or(value);
                    if trimmed.is_empty() {
                        return Err(corrupt(line, "record key is empty"));
                    }
                    key = Some(trimmed.to_vec());
                }
                b"TYPE" => kind = Some(EntryKind::from_code(&String::from_utf8_lossy(value))),
                b"SIZE" => size = Some(number(value, "SIZE", line)?),
                b"UID" => uid = Some(number(value, "UID", line)?),
                b"GID" => gid = Some(number(value, "GID", line)?),
                b"PERM" => {
                    let s = std::str::from_utf8(value).unwrap_or_default();
                    let mode = u16::from_str_radix(s.trim(), 8)
                        .map_err(|_| corrupt(line, format!("PERM is not octal [{}]", s)))?;
                    permissions = Some(mode & 0o7777);
                }
                b"MTIME" => mtime = Some(number(value, "MTIME", line)?),
                b"ATIME" => atime = Some(number(value, "ATIME", line)?),
                b"CTIME" => ctime = Some(number(value, "CTIME", line)?),
                b"INODE" => inode = Some(number(value, "INODE", line)?),
                b"HLINKS" => hardlinks = Some(number(value, "HLINKS", line)?),
                b"BLOCKS" => blocks = Some(number(value, "BLOCKS", line)?),
                b"MD5" | b"SHA256" => {
                    let name = std::str::from_utf8(name).unwrap_or_default();
                    let hex_text = text(value, name, line)?;
                    digest = Some(self.decode_digest(name, &hex_text)?);
                }
                b"BYTES" if version == FormatVersion::V2 => {
                    bytes = Some(number(value, "BYTES", line)?)
                }
                b"LINES" if version == FormatVersion::V2 => {
                    lines = Some(number(value, "LINES", line)?)
                }
                other => {
                    warn!(
                        "Unknown field key [{}] on line {}",
                        String::from_utf8_lossy(other),
                        line
                    );
                }
            }
        }

        let missing = |field: &str| corrupt(line, format!("record is missing {}", field));

        let content = match (digest, bytes, lines) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                return Err(corrupt(line, "record has both a digest and counts"));
            }
            (Some(d), None, None) => ContentSummary::Digest(d),
            (None, Some(b), Some(l)) => ContentSummary::Counts { bytes: b, lines: l },
            (None, Some(_), None) => return Err(missing("LINES")),
            (None, None, Some(_)) => return Err(missing("BYTES")),
            (None, None, None) => ContentSummary::None,
        };

        let record = FileRecord {
            kind: kind.ok_or_else(|| missing("TYPE"))?,
            size: size.ok_or_else(|| missing("SIZE"))?,
            uid: uid.ok_or_else(|| missing("UID"))?,
            gid: gid.ok_or_else(|| missing("GID"))?,
            permissions: permissions.ok_or_else(|| missing("PERM"))?,
            mtime: mtime.ok_or_else(|| missing("MTIME"))?,
            atime: atime.ok_or_else(|| missing("ATIME"))?,
            ctime: ctime.ok_or_else(|| missing("CTIME"))?,
            inode: inode.ok_or_else(|| missing("INODE"))?,
            hardlinks: hardlinks.ok_or_else(|| missing("HLINKS"))?,
            blocks: blocks.ok_or_else(|| missing("BLOCKS"))?,
            content,
        };

        Ok(LoadedRecord {
            key: key.ok_or_else(|| missing("KEY"))?,
            record,
        })
    }

    fn decode_digest(&self, name: &str, hex_text: &str) -> Result<ContentDigest> {
        let line = self.line_no;
        let kind = match self.header.version {
            FormatVersion::V2 => DigestKind::from_field_name(name)
                .ok_or_else(|| corrupt(line, format!("unknown digest field {}", name)))?,
            FormatVersion::V1 => {
                if name != "MD5" {
                    return Err(corrupt(line, format!("unexpected digest field {} in version 1 file", name)));
                }
                match self.digest_kind {
                    Some(kind) if hex_text.len() == kind.byte_len() * 2 => kind,
                    _ => DigestKind::from_len(hex_text.len() / 2)
                        .filter(|_| hex_text.len() % 2 == 0)
                        .ok_or_else(|| {
                            corrupt(line, format!("digest has unexpected length {}", hex_text.len()))
                        })?,
                }
            }
        };
        ContentDigest::from_hex(kind, hex_text).map_err(|e| corrupt(line, e))
    }
}

/// Load a whole snapshot file into a table
///
/// Convenience for callers that do not need to diff while loading.
pub fn load_snapshot(path: &Path, digest_kind: Option<DigestKind>) -> Result<(SnapshotHeader, Snapshot)> {
    let mut reader = SnapshotReader::open(path)?;
    reader.set_digest_kind(digest_kind);

    let mut snapshot = Snapshot::init(DEFAULT_BUCKETS);
    while let Some(loaded) = reader.next_record()? {
        if let Insert::Duplicate(_) = snapshot.insert_unique(&loaded.key, loaded.record) {
            return Err(DiffTreeError::DuplicateKey(
                String::from_utf8_lossy(&loaded.key).into_owned(),
            ));
        }
        snapshot = snapshot.grow_if_needed();
    }

    Ok((reader.header().clone(), snapshot))
}
