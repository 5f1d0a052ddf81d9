//! Transparent decompression for count mode
//!
//! Count mode records the number of content bytes and newlines of every
//! regular file. For compressed files the interesting content is the
//! decompressed stream, so the file suffix selects a decoder:
//!
//! - `.gz` - gzip, possibly multi-member, via `flate2`
//! - `.lz4` - LZ4 frame format via `lz4_flex`
//! - anything else - read as-is
//!
//! ## Example
//!
//! ```rust,ignore
//! use difftree::compression::count_file;
//! use std::path::Path;
//!
//! let counts = count_file(Path::new("/var/log/syslog.1.gz"))?;
//! println!("{} bytes, {} lines", counts.bytes, counts.lines);
//! ```

use flate2::read::MultiGzDecoder;
use lz4_flex::frame::FrameDecoder;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::trace;

const COUNT_CHUNK_SIZE: usize = 64 * 1024;

/// Compression format recognized from a file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    /// Plain content
    None,
    /// gzip stream
    Gzip,
    /// LZ4 frame
    Lz4,
}

impl CompressionFormat {
    /// Detect the format from the file name suffix
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("gz") => CompressionFormat::Gzip,
            Some(ext) if ext.eq_ignore_ascii_case("lz4") => CompressionFormat::Lz4,
            _ => CompressionFormat::None,
        }
    }
}

/// Byte and newline totals for one content stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentCounts {
    /// Number of bytes read
    pub bytes: u64,
    /// Number of `\n` bytes read
    pub lines: u64,
}

/// Open a file, wrapping it in a decoder when the suffix asks for one
pub fn open_content(path: &Path) -> io::Result<Box<dyn Read>> {
    let file = BufReader::new(File::open(path)?);
    let format = CompressionFormat::from_path(path);
    trace!("Opening {:?} as {:?}", path, format);

    Ok(match format {
        CompressionFormat::Gzip => Box::new(MultiGzDecoder::new(file)),
        CompressionFormat::Lz4 => Box::new(FrameDecoder::new(file)),
        CompressionFormat::None => Box::new(file),
    })
}

/// Count bytes and newlines from any reader
pub fn count_reader<R: Read>(mut reader: R) -> io::Result<ContentCounts> {
    let mut counts = ContentCounts::default();
    let mut buffer = vec![0u8; COUNT_CHUNK_SIZE];

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        counts.bytes += n as u64;
        counts.lines += buffer[..n].iter().filter(|&&b| b == b'\n').count() as u64;
    }

    Ok(counts)
}

/// Count the (decompressed) content of a file
///
/// # Errors
///
/// Returns an I/O error if the file cannot be opened, or if a compressed file
/// fails to decode.
pub fn count_file(path: &Path) -> io::Result<ContentCounts> {
    count_reader(open_content(path)?)
}
