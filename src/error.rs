//! Custom error types for kaso.
//!
//! Provides structured error handling with detailed context for better
//! diagnostics and user experience.

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for kaso operations.
///
/// Each variant provides specific context about what went wrong,
/// enabling better error messages and programmatic error handling.
#[derive(Error, Debug)]
pub enum KasoError {
    // =========================================================================
    // Acquisition Errors
    // =========================================================================
    /// The archive could not be transferred.
    #[error("Failed to fetch archive from '{url}': {reason}")]
    FetchFailed { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("Archive request to '{url}' returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// Transferred bytes do not match the configured digest.
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// The compressed payload could not be inflated.
    #[error("Failed to decompress archive: {reason}")]
    Decompress { reason: String },

    /// Payload is neither a comment document nor a `SQLite` database.
    #[error("Unrecognized archive format{}", hint.as_ref().map(|h| format!(": {h}")).unwrap_or_default())]
    UnknownArchiveFormat { hint: Option<String> },

    /// Failed to parse an archive document.
    #[error("Failed to parse '{file}': {reason}")]
    ParseError { file: String, reason: String },

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// Store file not found (not yet fetched).
    #[error(
        "No comment store found. Run 'kaso fetch' or 'kaso import <file>' first.\nExpected database at: {path}"
    )]
    StoreNotFound { path: PathBuf },

    /// Database schema version mismatch.
    #[error(
        "Database schema version mismatch: expected {expected}, found {found}. Consider re-importing with --force."
    )]
    SchemaMismatch { expected: i32, found: i32 },

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    // =========================================================================
    // Paging Errors
    // =========================================================================
    /// Requested page lies outside `[1, total]`.
    #[error("Page {page} is out of range (valid pages: 1-{total})")]
    PageOutOfRange { page: usize, total: usize },

    // =========================================================================
    // IO Errors
    // =========================================================================
    /// File read/write error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Path-specific IO error with context.
    #[error("Failed to {operation} '{path}': {source}")]
    PathError {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file parsing error.
    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigError { path: PathBuf, reason: String },

    /// Invalid command-line argument.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Catch-all for other errors with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Result type alias for kaso operations.
pub type Result<T> = std::result::Result<T, KasoError>;

impl KasoError {
    /// Create a fetch failure error.
    pub fn fetch_failed(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::FetchFailed {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a parse error.
    pub fn parse_error(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ParseError {
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Create a store not found error.
    pub fn store_not_found(path: impl Into<PathBuf>) -> Self {
        Self::StoreNotFound { path: path.into() }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create a path error with context.
    pub fn path_error(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::PathError {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Wrap an error with additional context.
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Get a suggestion for how to fix this error, if applicable.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::StoreNotFound { .. } => {
                Some("Run 'kaso fetch' to download the comment archive.")
            }
            Self::SchemaMismatch { .. } => {
                Some("Run 'kaso fetch --force' to rebuild the comment store.")
            }
            Self::FetchFailed { .. } | Self::HttpStatus { .. } => {
                Some("Check the network connection and the configured source URL.")
            }
            Self::ChecksumMismatch { .. } => Some(
                "The archive changed upstream or the transfer was corrupted. Update source.sha256 or retry.",
            ),
            Self::PageOutOfRange { .. } => Some("Pick a page number within the listed range."),
            _ => None,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error.
    ///
    /// # Errors
    ///
    /// Returns the original error wrapped with additional context.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily (only evaluated on error).
    ///
    /// # Errors
    ///
    /// Returns the original error wrapped with additional context.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| KasoError::with_context(context, e))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| KasoError::with_context(f(), e))
    }
}

// =============================================================================
// CLI Error Formatting
// =============================================================================

use colored::Colorize;

/// Render an error for the terminal, with an optional hint line below it.
#[must_use]
pub fn format_error(message: &str, hint: Option<&str>) -> String {
    let mut output = format!("{} {}", "✗".red().bold(), message.bold());
    if let Some(hint) = hint {
        output.push_str(&format!("\n\n   {} {hint}", "Hint:".cyan()));
    }
    output
}

/// Edit distance between `a` and `b`, counted in chars.
#[must_use]
pub fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitute = diagonal + usize::from(ca != *cb);
            diagonal = row[j + 1];
            row[j + 1] = substitute.min(row[j] + 1).min(diagonal + 1);
        }
    }
    row[b.len()]
}

/// Closest candidate within two edits of `input`, ignoring case.
/// An exact match yields `None`.
#[must_use]
pub fn closest_match<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let input = input.to_lowercase();
    candidates
        .iter()
        .map(|c| (*c, edit_distance(&input, &c.to_lowercase())))
        .filter(|(_, d)| (1..=2).contains(d))
        .min_by_key(|(_, d)| *d)
        .map(|(c, _)| c)
}

/// Message for an unrecognised name, suggesting the nearest valid one.
#[must_use]
pub fn unknown_name_message(kind: &str, input: &str, valid: &[&str]) -> String {
    match closest_match(input, valid) {
        Some(near) => format!("unknown {kind} '{input}' (did you mean '{near}'?)"),
        None => format!("unknown {kind} '{input}' (expected one of: {})", valid.join(", ")),
    }
}

/// Standard valid config keys.
pub const VALID_CONFIG_KEYS: &[&str] = &[
    "paths.db",
    "paths.data_dir",
    "source.url",
    "source.version",
    "source.sha256",
    "source.timeout_secs",
    "search.page_size",
    "search.backend",
    "output.format",
    "output.colors",
    "output.quiet",
];
