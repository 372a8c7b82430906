//! Comment archive parser.
//!
//! Archives are JSON documents of the form `{"comments": [...]}` where each
//! top-level comment carries its replies inline. They are usually shipped
//! gzip-compressed; the reader sniffs the gzip magic bytes rather than
//! trusting the file extension.

use crate::error::{KasoError, Result, ResultExt};
use crate::model::{ArchiveDocument, Comment};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info};

/// First two bytes of every gzip member.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// First sixteen bytes of every `SQLite` 3 database file.
pub const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// What a payload looks like once any compression has been removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Sqlite,
    Json,
}

/// True when `bytes` starts with the gzip magic number.
#[must_use]
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Classify an uncompressed payload by its leading bytes.
#[must_use]
pub fn sniff(bytes: &[u8]) -> Option<PayloadKind> {
    if bytes.starts_with(SQLITE_MAGIC) {
        return Some(PayloadKind::Sqlite);
    }
    let first = bytes
        .iter()
        .copied()
        .find(|b| !(b.is_ascii_whitespace() || matches!(b, 0xef | 0xbb | 0xbf)));
    match first {
        Some(b'{' | b'[') => Some(PayloadKind::Json),
        _ => None,
    }
}

/// Remove gzip compression if present, returning the payload bytes.
///
/// # Errors
///
/// Returns [`KasoError::Decompress`] if the gzip stream is corrupt.
pub fn decompress(bytes: Vec<u8>) -> Result<Vec<u8>> {
    if !is_gzip(&bytes) {
        return Ok(bytes);
    }
    let mut out = Vec::with_capacity(bytes.len() * 4);
    GzDecoder::new(bytes.as_slice())
        .read_to_end(&mut out)
        .map_err(|e| KasoError::Decompress {
            reason: e.to_string(),
        })?;
    debug!(
        compressed = bytes.len(),
        decompressed = out.len(),
        "inflated gzip payload"
    );
    Ok(out)
}

/// Parse an archive document from uncompressed JSON bytes.
///
/// A bare array of threads is accepted as well as the `{"comments": [...]}`
/// wrapper.
///
/// # Errors
///
/// Returns [`KasoError::ParseError`] naming `label` if the JSON does not
/// match either shape.
pub fn parse_document(bytes: &[u8], label: &str) -> Result<ArchiveDocument> {
    let bytes = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);
    let first = bytes.iter().find(|b| !b.is_ascii_whitespace());
    if first == Some(&b'[') {
        let comments = serde_json::from_slice(bytes)
            .map_err(|e| KasoError::parse_error(label, e.to_string()))?;
        return Ok(ArchiveDocument { comments });
    }
    serde_json::from_slice(bytes).map_err(|e| KasoError::parse_error(label, e.to_string()))
}

/// Reader for comment archive files.
pub struct ArchiveParser {
    label: String,
}

impl ArchiveParser {
    /// `label` names the source in error messages (a path or URL).
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    /// Read and flatten an archive from any reader, gzip or plain.
    ///
    /// # Errors
    ///
    /// Returns an error if reading, decompressing or parsing fails.
    pub fn read_from(&self, mut reader: impl Read) -> Result<Vec<Comment>> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .with_context(|| format!("Failed to read {}", self.label))?;
        self.parse_bytes(bytes)
    }

    /// Flatten an archive held in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if decompressing or parsing fails.
    pub fn parse_bytes(&self, bytes: Vec<u8>) -> Result<Vec<Comment>> {
        let payload = decompress(bytes)?;
        match sniff(&payload) {
            Some(PayloadKind::Json) => {}
            Some(PayloadKind::Sqlite) => {
                return Err(KasoError::UnknownArchiveFormat {
                    hint: Some(format!(
                        "{} is a SQLite database, not a JSON archive",
                        self.label
                    )),
                });
            }
            None => {
                return Err(KasoError::UnknownArchiveFormat {
                    hint: Some(format!("{} is neither JSON nor SQLite", self.label)),
                });
            }
        }
        let doc = parse_document(&payload, &self.label)?;
        let comments = doc.into_comments();
        info!(source = %self.label, count = comments.len(), "parsed archive");
        Ok(comments)
    }

    /// Read and flatten an archive file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsed.
    pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<Comment>> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| KasoError::path_error("open", path, e))?;
        Self::new(path.display().to_string()).read_from(BufReader::new(file))
    }
}
