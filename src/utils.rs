//! Utility functions for difftree
//!
//! Helpers shared by the engine, the codec and the CLI:
//!
//! ### Paths and keys
//! - Converting a walked path into a snapshot key relative to the root
//! - Rebuilding an absolute path from a snapshot base and key
//! - Enforcing the maximum path length
//!
//! ### Rendering
//! - Symbolic permission strings (`rwsr-xr-x`)
//! - Local-time timestamps in the `YYYY/MM/DD@HH:MM:SS` form used by reports
//!   and snapshot headers
//!
//! ### File operations
//! - Atomic replacement of an output file
//! - Restoring a file's access time after it has been read

use crate::error::{DiffTreeError, Result};
use chrono::{DateTime, Local, TimeZone};
use filetime::FileTime;
use std::fs::{self, Metadata};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::trace;

/// Longest path or key accepted anywhere in the core
pub const MAX_PATH_LEN: usize = 4096;

/// Timestamp layout shared by reports and snapshot headers
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d@%H:%M:%S";

/// Raw bytes of a path
#[cfg(unix)]
pub fn path_bytes(path: &Path) -> std::borrow::Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    std::borrow::Cow::Borrowed(path.as_os_str().as_bytes())
}

/// Raw bytes of a path
#[cfg(not(unix))]
pub fn path_bytes(path: &Path) -> std::borrow::Cow<'_, [u8]> {
    match path.to_string_lossy() {
        std::borrow::Cow::Borrowed(s) => std::borrow::Cow::Borrowed(s.as_bytes()),
        std::borrow::Cow::Owned(s) => std::borrow::Cow::Owned(s.into_bytes()),
    }
}

/// Path from raw key bytes
#[cfg(unix)]
pub fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(bytes))
}

/// Path from raw key bytes
#[cfg(not(unix))]
pub fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

/// Fail with [`DiffTreeError::PathTooLong`] when `len` exceeds [`MAX_PATH_LEN`]
pub fn check_path_len(len: usize) -> Result<()> {
    if len > MAX_PATH_LEN {
        return Err(DiffTreeError::PathTooLong {
            len,
            limit: MAX_PATH_LEN,
        });
    }
    Ok(())
}

/// Snapshot key for `path` under `root`
///
/// Returns `None` for the root itself and for anything not below it.
///
/// # Errors
///
/// Returns [`DiffTreeError::PathTooLong`] if the path exceeds [`MAX_PATH_LEN`].
pub fn relative_key(path: &Path, root: &Path) -> Result<Option<Vec<u8>>> {
    check_path_len(path_bytes(path).len())?;

    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => Ok(None),
        Ok(rel) => Ok(Some(path_bytes(rel).into_owned())),
        Err(_) => Ok(None),
    }
}

/// Absolute path of a snapshot key below `base`
pub fn key_to_path(base: &Path, key: &[u8]) -> PathBuf {
    base.join(path_from_bytes(key))
}

/// Render permission bits the way `ls -l` does (without the type column)
///
/// ```rust
/// assert_eq!(difftree::utils::format_permissions(0o4755), "rwsr-xr-x");
/// assert_eq!(difftree::utils::format_permissions(0o1777), "rwxrwxrwt");
/// assert_eq!(difftree::utils::format_permissions(0o2640), "rw-r-S---");
/// ```
pub fn format_permissions(mode: u16) -> String {
    let bit = |mask: u16, c: char| if mode & mask != 0 { c } else { '-' };
    let exec = |x: u16, special: u16, set: char, unset: char| match (mode & x != 0, mode & special != 0) {
        (true, true) => set,
        (false, true) => unset,
        (true, false) => 'x',
        (false, false) => '-',
    };

    let mut out = String::with_capacity(9);
    out.push(bit(0o400, 'r'));
    out.push(bit(0o200, 'w'));
    out.push(exec(0o100, 0o4000, 's', 'S'));
    out.push(bit(0o040, 'r'));
    out.push(bit(0o020, 'w'));
    out.push(exec(0o010, 0o2000, 's', 'S'));
    out.push(bit(0o004, 'r'));
    out.push(bit(0o002, 'w'));
    out.push(exec(0o001, 0o1000, 't', 'T'));
    out
}

/// Render epoch seconds in local time as `YYYY/MM/DD@HH:MM:SS`
///
/// Out-of-range values fall back to the raw number.
pub fn format_timestamp(secs: i64) -> String {
    match Local.timestamp_opt(secs, 0).single() {
        Some(dt) => dt.format(TIMESTAMP_FORMAT).to_string(),
        None => secs.to_string(),
    }
}

/// Render a local date-time as `YYYY/MM/DD@HH:MM:SS`
pub fn format_datetime(dt: &DateTime<Local>) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

/// Fail if `path` exists and is anything but a regular file
pub fn ensure_replaceable(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if !meta.file_type().is_file() => {
            Err(DiffTreeError::OutputNotRegularFile(path.to_path_buf()))
        }
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DiffTreeError::path_io(path, e)),
    }
}

/// Write a file atomically
///
/// Content is produced into a temporary file in the destination directory
/// and renamed over `path` only once `write` has succeeded, so readers never
/// observe a half-written file.
pub fn atomic_write_with<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut NamedTempFile>) -> Result<()>,
{
    ensure_replaceable(path)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir).map_err(|e| DiffTreeError::path_io(dir, e))?;

    {
        let mut writer = BufWriter::new(&mut temp);
        write(&mut writer)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;

    temp.persist(path)
        .map_err(|e| DiffTreeError::path_io(path, e.error))?;
    trace!("Atomically replaced {:?}", path);
    Ok(())
}

/// Put back the access time recorded in `before`
///
/// # Errors
///
/// Returns the raw I/O error so callers can tell a missing privilege
/// (`PermissionDenied`) from other failures.
pub fn restore_atime(path: &Path, before: &Metadata) -> io::Result<()> {
    let atime = FileTime::from_last_access_time(before);
    filetime::set_file_atime(path, atime)
}
