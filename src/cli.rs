//! CLI definitions for kaso.
//!
//! Uses clap for argument parsing with derive macros.

use crate::search::Backend;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// kaso - search and browse archived Scratch comments
#[derive(Parser, Debug)]
#[command(name = "kaso")]
#[command(version)]
#[command(about = "Search and browse an archive of Scratch comments and replies")]
#[command(long_about = r#"
kaso - search and browse an archive of nested Scratch comments.

Query syntax (space separated, all terms must hold):
  word        content must contain "word"
  -word       content must not contain "word"
  a|b|c       content must contain at least one of a, b, c

Every literal also matches its HTML-escaped and percent-encoded forms, so
"猫" finds comments stored as "%E7%8C%AB". Matching is case-insensitive.

Results are grouped by conversation (newest conversation first, replies
oldest to newest) and shown 200 per page.

Quick start:
  1. Run: kaso fetch
  2. Search: kaso search "scratch -宣伝"
  3. Browse: kaso repl
"#)]
pub struct Cli {
    /// Path to the comment store
    #[arg(long, env = "KASO_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Be quiet (suppress non-error output)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download the comment archive and build the local store
    Fetch(FetchArgs),

    /// Build the local store from an archive file on disk
    Import(ImportArgs),

    /// Search comments
    Search(SearchArgs),

    /// Show one comment or its whole conversation
    Show(ShowArgs),

    /// Show archive statistics
    Stats(StatsArgs),

    /// Start an interactive search session
    Repl(ReplArgs),

    /// Show or manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Archive URL (defaults to the configured source)
    #[arg(long, env = "KASO_SOURCE_URL")]
    pub url: Option<String>,

    /// Download again even if the store already exists
    #[arg(long, short = 'F')]
    pub force: bool,

    /// Expected SHA-256 of the downloaded bytes
    #[arg(long)]
    pub sha256: Option<String>,

    /// Transfer timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Archive file: JSON, gzip-compressed JSON, or a SQLite store
    pub file: PathBuf,

    /// Replace an existing store
    #[arg(long, short = 'F')]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search query (terms, -exclusions, a|b alternatives)
    #[arg(allow_hyphen_values = true)]
    pub query: Option<String>,

    /// Only comments whose author contains this text
    #[arg(long, short = 'u')]
    pub user: Option<String>,

    /// Page to show (1-based)
    #[arg(long, short = 'p', default_value = "1")]
    pub page: usize,

    /// Comments per page
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Where to search
    #[arg(long, short = 'b')]
    pub backend: Option<Backend>,

    /// Archive file for the memory backend (defaults to the store contents)
    #[arg(long)]
    pub source: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Comment ID
    pub id: i64,

    /// Show the whole conversation
    #[arg(long, short = 't')]
    pub thread: bool,
}

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// First day to include (YYYY-MM-DD)
    #[arg(long)]
    pub since: Option<String>,

    /// Last day to include (YYYY-MM-DD)
    #[arg(long)]
    pub until: Option<String>,

    /// Number of users in the ranking
    #[arg(long, short = 'n', default_value = "20")]
    pub top: usize,

    /// Include per-day comment counts
    #[arg(long, short = 'd')]
    pub daily: bool,
}

#[derive(Args, Debug)]
pub struct ReplArgs {
    /// Where to search
    #[arg(long, short = 'b')]
    pub backend: Option<Backend>,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Show current configuration
    #[arg(long)]
    pub show: bool,

    /// Set a configuration value (key=value)
    #[arg(long)]
    pub set: Option<String>,

    /// Write a default configuration file
    #[arg(long)]
    pub init: bool,

    /// Print the configuration file path
    #[arg(long)]
    pub path: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonPretty,
    Compact,
    Csv,
}

impl OutputFormat {
    /// Parse a configured format name.
    #[must_use]
    pub fn from_config(name: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(name, true).ok()
    }
}
