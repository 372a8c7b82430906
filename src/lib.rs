//! kaso - search and browse archived Scratch comments
//!
//! This library provides the core of a comment-archive search tool: a small
//! query language compiled to either an in-memory predicate or parameterized
//! SQL, encoding-aware substring matching, conversation-grouped ordering and
//! fixed-size paging.
//!
//! # Modules
//!
//! - [`query`] - Query parsing and compilation
//! - [`encoding`] - Encoding variants and display decoding
//! - [`order`] - Deterministic result ordering
//! - [`paginate`] - Page arithmetic
//! - [`session`] - Per-session result and page state
//! - [`store`] / [`storage`] - In-memory and `SQLite` comment stores
//! - [`acquire`] - Downloading and installing the comment store
//! - [`search`] - The search pipeline
//! - [`render`] - Text, CSV and JSON presentation
//! - [`stats`] - Archive statistics

pub mod acquire;
pub mod cache;
pub mod cli;
pub mod config;
pub mod encoding;
pub mod error;
pub mod logging;
pub mod model;
pub mod order;
pub mod paginate;
pub mod parser;
pub mod query;
pub mod render;
pub mod repl;
pub mod search;
pub mod session;
pub mod stats;
pub mod storage;
pub mod store;

pub use cli::*;
pub use error::{
    KasoError, Result, ResultExt, VALID_CONFIG_KEYS, closest_match, format_error,
    unknown_name_message,
};
pub use model::*;
pub use parser::ArchiveParser;
pub use query::{CompiledQuery, Query, Term};
pub use search::{Backend, SearchEngine};
pub use session::SearchSession;
pub use storage::Storage;
pub use store::{CommentStore, MemoryStore};

/// Default database filename
pub const DEFAULT_DB_NAME: &str = "kaso.db";

/// Archive downloaded by `kaso fetch` when no source is configured.
pub const DEFAULT_SOURCE_URL: &str = "https://github.com/22552/kasotest/raw/refs/heads/main/%E7%AC%AC%E4%BA%8C%E3%83%97%E3%83%AD%E3%82%B8%E3%82%A7%E3%82%AF%E3%83%88.json.gz";

/// Standard width for content dividers in CLI output
pub const CONTENT_DIVIDER_WIDTH: usize = 60;

const BYTES_PER_KB: u64 = 1024;
const BYTES_PER_MB: u64 = 1024 * 1024;
const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Get the default data directory for kaso
#[must_use]
pub fn default_data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("kaso")
}

/// Get the default database path
#[must_use]
pub fn default_db_path() -> std::path::PathBuf {
    default_data_dir().join(DEFAULT_DB_NAME)
}

/// Format an unsigned integer with thousands separators.
#[must_use]
pub fn format_number(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (idx, ch) in digits.chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    out.chars().rev().collect()
}

/// Format a usize with thousands separators.
#[must_use]
pub fn format_number_usize(value: usize) -> String {
    format_number(u64::try_from(value).unwrap_or(u64::MAX))
}

/// Format bytes into a human-friendly string.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    if bytes < BYTES_PER_KB {
        format!("{bytes} B")
    } else if bytes < BYTES_PER_MB {
        format_bytes_with_unit(bytes, BYTES_PER_KB, "KB")
    } else if bytes < BYTES_PER_GB {
        format_bytes_with_unit(bytes, BYTES_PER_MB, "MB")
    } else {
        format_bytes_with_unit(bytes, BYTES_PER_GB, "GB")
    }
}

fn format_bytes_with_unit(bytes: u64, unit: u64, suffix: &str) -> String {
    let whole = bytes / unit;
    let tenths = (bytes % unit) * 10 / unit;
    format!("{whole}.{tenths} {suffix}")
}
