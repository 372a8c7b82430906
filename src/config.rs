//! Configuration system for kaso.
//!
//! Provides layered configuration from multiple sources:
//!
//! 1. **Compiled defaults** - Sensible defaults built into the binary
//! 2. **User config file** - `~/.config/kaso/config.toml`
//! 3. **Environment variables** - `KASO_*` prefix
//! 4. **CLI arguments** - Highest priority, always wins
//!
//! # Example Configuration File
//!
//! ```toml
//! [paths]
//! db = "~/.local/share/kaso/kaso.db"
//!
//! [source]
//! url = "https://example.org/comments.json.gz"
//! version = "2024-06"
//! timeout_secs = 120
//!
//! [search]
//! page_size = 200
//! backend = "sqlite"
//!
//! [output]
//! format = "text"
//! colors = true
//! ```

use crate::error::{KasoError, Result, VALID_CONFIG_KEYS, unknown_name_message};
use crate::search::Backend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Main configuration structure for kaso.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path-related configuration.
    pub paths: PathsConfig,
    /// Where the comment archive comes from.
    pub source: SourceConfig,
    /// Search behavior configuration.
    pub search: SearchConfig,
    /// Output formatting configuration.
    pub output: OutputConfig,
}

/// Path configuration for the data directory and store file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Path to the `SQLite` comment store.
    /// Environment variable: `KASO_DB`
    pub db: Option<PathBuf>,

    /// Directory for the store and history when `db` is not set.
    /// Environment variable: `KASO_DATA_DIR`
    pub data_dir: Option<PathBuf>,
}

/// Archive source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Archive URL (JSON, gzip JSON, or gzip `SQLite`).
    /// Environment variable: `KASO_SOURCE_URL`
    pub url: String,

    /// Label distinguishing archive snapshots in the cache.
    pub version: String,

    /// Expected SHA-256 of the downloaded bytes.
    pub sha256: Option<String>,

    /// Transfer timeout in seconds.
    /// Environment variable: `KASO_TIMEOUT`
    pub timeout_secs: u64,
}

/// Search behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Comments per result page.
    /// Environment variable: `KASO_PAGE_SIZE`
    pub page_size: usize,

    /// Default backend.
    /// Environment variable: `KASO_BACKEND`
    pub backend: Backend,
}

/// Output formatting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format: text, json, json-pretty, compact, csv.
    pub format: String,

    /// Enable colored output.
    pub colors: bool,

    /// Suppress non-essential output (progress bars, etc.).
    pub quiet: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: crate::DEFAULT_SOURCE_URL.to_string(),
            version: "latest".to_string(),
            sha256: None,
            timeout_secs: crate::acquire::DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: crate::paginate::DEFAULT_PAGE_SIZE,
            backend: Backend::Sqlite,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            colors: true,
            quiet: false,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. User config file (~/.config/kaso/config.toml)
    /// 3. Compiled defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        config.apply_env_overrides(|key| std::env::var(key).ok());

        debug!("Configuration loaded: {:?}", config);
        config
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            debug!("Config file not found: {}", path.display());
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    info!("Loaded config from: {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            }
        }
    }

    fn load_user_config() -> Option<Self> {
        let config_path = Self::user_config_path()?;
        Self::load_from_file(&config_path)
    }

    /// Get the path to the user configuration file.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("kaso").join("config.toml"))
    }

    /// Apply environment variable overrides read through `var`.
    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(db) = var("KASO_DB") {
            self.paths.db = Some(PathBuf::from(db));
        }
        if let Some(dir) = var("KASO_DATA_DIR") {
            self.paths.data_dir = Some(PathBuf::from(dir));
        }

        if let Some(url) = var("KASO_SOURCE_URL") {
            self.source.url = url;
        }
        if let Some(timeout) = var("KASO_TIMEOUT") {
            if let Ok(n) = timeout.parse() {
                self.source.timeout_secs = n;
            }
        }

        if let Some(size) = var("KASO_PAGE_SIZE") {
            if let Ok(n) = size.parse::<usize>() {
                if n > 0 {
                    self.search.page_size = n;
                }
            }
        }
        if let Some(backend) = var("KASO_BACKEND") {
            match Backend::parse(&backend) {
                Some(b) => self.search.backend = b,
                None => warn!("Ignoring unknown KASO_BACKEND value: {}", backend),
            }
        }

        if let Some(format) = var("KASO_FORMAT") {
            self.output.format = format;
        }
        if var("KASO_NO_COLOR").is_some() || var("NO_COLOR").is_some() {
            self.output.colors = false;
        }
        if var("KASO_QUIET").is_some() {
            self.output.quiet = true;
        }
    }

    /// Merge another config into this one (other takes precedence).
    fn merge(&mut self, other: Self) {
        if other.paths.db.is_some() {
            self.paths.db = other.paths.db;
        }
        if other.paths.data_dir.is_some() {
            self.paths.data_dir = other.paths.data_dir;
        }

        self.source.url = other.source.url;
        self.source.version = other.source.version;
        if other.source.sha256.is_some() {
            self.source.sha256 = other.source.sha256;
        }
        self.source.timeout_secs = other.source.timeout_secs;

        self.search.page_size = other.search.page_size;
        self.search.backend = other.search.backend;

        self.output.format = other.output.format;
        self.output.colors = other.output.colors;
        self.output.quiet = other.output.quiet;
    }

    /// Get the data directory, using defaults if not configured.
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .unwrap_or_else(crate::default_data_dir)
    }

    /// Get the database path, using defaults if not configured.
    pub fn db_path(&self) -> PathBuf {
        self.paths
            .db
            .clone()
            .unwrap_or_else(|| self.data_dir().join(crate::DEFAULT_DB_NAME))
    }

    /// Page size, never zero.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.search.page_size.max(1)
    }

    /// Set one dotted key, e.g. `search.page_size=50`.
    ///
    /// # Errors
    ///
    /// Returns [`KasoError::InvalidArgument`] for an unknown key or a value
    /// that does not parse for that key.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let bad = |expected: &str| {
            KasoError::invalid_argument(format!("{key} expects {expected}, got '{value}'"))
        };
        let none_if_empty = |v: &str| (!v.is_empty()).then(|| v.to_string());

        match key {
            "paths.db" => self.paths.db = none_if_empty(value).map(PathBuf::from),
            "paths.data_dir" => self.paths.data_dir = none_if_empty(value).map(PathBuf::from),
            "source.url" => self.source.url = value.to_string(),
            "source.version" => self.source.version = value.to_string(),
            "source.sha256" => self.source.sha256 = none_if_empty(value),
            "source.timeout_secs" => {
                self.source.timeout_secs = value.parse().map_err(|_| bad("seconds"))?;
            }
            "search.page_size" => {
                let n: usize = value.parse().map_err(|_| bad("a positive integer"))?;
                if n == 0 {
                    return Err(bad("a positive integer"));
                }
                self.search.page_size = n;
            }
            "search.backend" => {
                self.search.backend = Backend::parse(value).ok_or_else(|| bad("sqlite or memory"))?;
            }
            "output.format" => self.output.format = value.to_string(),
            "output.colors" => self.output.colors = value.parse().map_err(|_| bad("true or false"))?,
            "output.quiet" => self.output.quiet = value.parse().map_err(|_| bad("true or false"))?,
            _ => {
                return Err(KasoError::invalid_argument(unknown_name_message(
                    "config key",
                    key,
                    VALID_CONFIG_KEYS,
                )));
            }
        }
        Ok(())
    }

    /// Save the current configuration to the user config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined,
    /// the parent directory cannot be created, or the file cannot be written.
    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::user_config_path().ok_or_else(|| KasoError::ConfigError {
            path: PathBuf::from("~/.config/kaso/config.toml"),
            reason: "could not determine config directory".to_string(),
        })?;
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    /// Save the configuration to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| KasoError::path_error("create directory", parent, e))?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| KasoError::ConfigError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        std::fs::write(path, content).map_err(|e| KasoError::path_error("write", path, e))?;
        info!("Saved config to: {}", path.display());
        Ok(())
    }
}
