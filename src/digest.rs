//! Content digests for regular files
//!
//! Two digest algorithms are supported and modelled as a closed set:
//!
//! - [`DigestKind::Legacy16`]: MD5, 16-byte output, serialized as `MD5=`
//! - [`DigestKind::Strong32`]: SHA-256, 32-byte output, serialized as `SHA256=`
//!
//! The kind is chosen once per run and every file is fed through the same
//! [`StreamingDigest`] in fixed-size chunks, so memory use does not depend on
//! file size.
//!
//! ## Example
//!
//! ```rust,ignore
//! use difftree::digest::{digest_file, DigestKind};
//! use std::path::Path;
//!
//! let digest = digest_file(Path::new("/etc/hosts"), DigestKind::Strong32)?;
//! println!("{}", digest.to_hex());
//! ```

use crate::error::{DiffTreeError, Result};
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Read size used when streaming file content through a digest
pub const DIGEST_CHUNK_SIZE: usize = 16 * 1024;

/// Digest algorithm selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DigestKind {
    /// MD5, 16 bytes
    #[serde(rename = "md5")]
    Legacy16,
    /// SHA-256, 32 bytes
    #[serde(rename = "sha256")]
    Strong32,
}

impl DigestKind {
    /// Digest length in bytes
    pub fn byte_len(&self) -> usize {
        match self {
            DigestKind::Legacy16 => 16,
            DigestKind::Strong32 => 32,
        }
    }

    /// Field name in the snapshot format
    pub fn field_name(&self) -> &'static str {
        match self {
            DigestKind::Legacy16 => "MD5",
            DigestKind::Strong32 => "SHA256",
        }
    }

    /// Label used in change-report fragments
    pub fn label(&self) -> &'static str {
        match self {
            DigestKind::Legacy16 => "md5",
            DigestKind::Strong32 => "sha256",
        }
    }

    /// Resolve a snapshot field name
    pub fn from_field_name(name: &str) -> Option<Self> {
        match name {
            "MD5" => Some(DigestKind::Legacy16),
            "SHA256" => Some(DigestKind::Strong32),
            _ => None,
        }
    }

    /// Infer the kind from a digest length in bytes
    pub fn from_len(len: usize) -> Option<Self> {
        match len {
            16 => Some(DigestKind::Legacy16),
            32 => Some(DigestKind::Strong32),
            _ => None,
        }
    }

    /// Start a new streaming hasher of this kind
    pub fn hasher(&self) -> StreamingDigest {
        match self {
            DigestKind::Legacy16 => StreamingDigest::Legacy(Md5::new()),
            DigestKind::Strong32 => StreamingDigest::Strong(Sha256::new()),
        }
    }
}

impl fmt::Display for DigestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Incremental digest state for one of the supported algorithms
pub enum StreamingDigest {
    /// MD5 state
    Legacy(Md5),
    /// SHA-256 state
    Strong(Sha256),
}

impl StreamingDigest {
    /// Feed more bytes
    pub fn update(&mut self, data: &[u8]) {
        match self {
            StreamingDigest::Legacy(h) => h.update(data),
            StreamingDigest::Strong(h) => h.update(data),
        }
    }

    /// Consume the state and produce the digest
    pub fn finalize(self) -> ContentDigest {
        match self {
            StreamingDigest::Legacy(h) => ContentDigest {
                kind: DigestKind::Legacy16,
                bytes: h.finalize().to_vec(),
            },
            StreamingDigest::Strong(h) => ContentDigest {
                kind: DigestKind::Strong32,
                bytes: h.finalize().to_vec(),
            },
        }
    }
}

/// A computed content digest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentDigest {
    kind: DigestKind,
    bytes: Vec<u8>,
}

impl ContentDigest {
    /// Wrap raw digest bytes, checking the length against the kind
    pub fn new(kind: DigestKind, bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != kind.byte_len() {
            return Err(DiffTreeError::corruption(format!(
                "{} digest must be {} bytes, got {}",
                kind.field_name(),
                kind.byte_len(),
                bytes.len()
            )));
        }
        Ok(Self { kind, bytes })
    }

    /// Decode hex text, two characters per byte
    pub fn from_hex(kind: DigestKind, text: &str) -> Result<Self> {
        let expected = kind.byte_len() * 2;
        if text.len() != expected {
            return Err(DiffTreeError::corruption(format!(
                "{} digest must be {} hex characters, got {}",
                kind.field_name(),
                expected,
                text.len()
            )));
        }
        let bytes = hex::decode(text).map_err(|e| {
            DiffTreeError::corruption(format!("invalid {} digest: {}", kind.field_name(), e))
        })?;
        Self::new(kind, bytes)
    }

    /// Algorithm that produced this digest
    pub fn kind(&self) -> DigestKind {
        self.kind
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Stream a reader through a digest
pub fn digest_reader<R: Read>(mut reader: R, kind: DigestKind) -> io::Result<ContentDigest> {
    let mut hasher = kind.hasher();
    let mut buffer = vec![0u8; DIGEST_CHUNK_SIZE];

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize())
}

/// Compute the digest of a file's content
///
/// # Errors
///
/// Returns the underlying I/O error if the file cannot be opened or read.
pub fn digest_file(path: &Path, kind: DigestKind) -> io::Result<ContentDigest> {
    let file = File::open(path)?;
    digest_reader(file, kind)
}
