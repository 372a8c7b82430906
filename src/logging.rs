//! Logging setup for kaso.
//!
//! Structured logging through the `tracing` ecosystem. Log lines always go
//! to stderr so that search results on stdout stay machine-readable.
//!
//! # Usage
//!
//! ```rust
//! use kaso::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::default());
//! tracing::info!("Application started");
//! ```

use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan},
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
};

type BoxedLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

/// Logging configuration.
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct LogConfig {
    /// Minimum log level for kaso's own targets.
    pub level: LogLevel,
    pub format: LogFormat,
    pub timestamps: bool,
    /// Include target (module path) in log output.
    pub target: bool,
    /// Include span enter/exit events.
    pub spans: bool,
    pub colors: bool,
}

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
    Off,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line human-readable format.
    Pretty,
    /// Compact single-line format.
    Compact,
    /// Full format with thread and source location.
    Full,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            format: LogFormat::Compact,
            timestamps: false,
            target: false,
            spans: false,
            colors: true,
        }
    }
}

impl LogConfig {
    /// Errors only.
    #[must_use]
    pub const fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            format: LogFormat::Compact,
            timestamps: false,
            target: false,
            spans: false,
            colors: true,
        }
    }

    /// Debug level with module targets.
    #[must_use]
    pub const fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            format: LogFormat::Pretty,
            timestamps: true,
            target: true,
            spans: false,
            colors: true,
        }
    }

    /// Maximum verbosity.
    #[must_use]
    pub const fn trace() -> Self {
        Self {
            level: LogLevel::Trace,
            format: LogFormat::Full,
            timestamps: true,
            target: true,
            spans: true,
            colors: true,
        }
    }

    /// Pick a preset from the global CLI flags. `quiet` wins over `verbose`.
    #[must_use]
    pub fn from_flags(quiet: bool, verbose: u8, colors: bool) -> Self {
        let mut config = match (quiet, verbose) {
            (true, _) => Self::quiet(),
            (false, 0) => Self::default(),
            (false, 1) => Self {
                level: LogLevel::Info,
                ..Self::default()
            },
            (false, 2) => Self::verbose(),
            (false, _) => Self::trace(),
        };
        config.colors = colors;
        config
    }

    /// Apply `KASO_LOG_LEVEL` and `KASO_LOG_FORMAT`; unparsable values are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(level) = env_parse("KASO_LOG_LEVEL") {
            self.level = level;
        }
        if let Some(format) = env_parse::<LogFormat>("KASO_LOG_FORMAT") {
            self.format = format;
            self.timestamps = matches!(format, LogFormat::Full);
        }
        self
    }

    /// Filter directive applied when `RUST_LOG` is not set.
    #[must_use]
    pub fn filter_directive(&self) -> String {
        format!("kaso={}", self.level.to_filter_string())
    }
}

impl LogLevel {
    const fn to_filter_string(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
            Self::Off => "off",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" | "e" => Ok(Self::Error),
            "warn" | "warning" | "w" => Ok(Self::Warn),
            "info" | "i" => Ok(Self::Info),
            "debug" | "d" => Ok(Self::Debug),
            "trace" | "t" => Ok(Self::Trace),
            "off" | "none" | "quiet" => Ok(Self::Off),
            _ => Err(format!("Invalid log level: {s}")),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "p" => Ok(Self::Pretty),
            "compact" | "c" => Ok(Self::Compact),
            "full" | "f" => Ok(Self::Full),
            _ => Err(format!("Invalid log format: {s}")),
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

fn build_layer(config: &LogConfig) -> BoxedLayer {
    let span_events = if config.spans {
        FmtSpan::ENTER | FmtSpan::EXIT
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.colors)
        .with_target(config.target)
        .with_span_events(span_events);

    match (config.format, config.timestamps) {
        (LogFormat::Pretty, true) => base.pretty().boxed(),
        (LogFormat::Pretty, false) => base.pretty().without_time().boxed(),
        (LogFormat::Compact, true) => base.compact().boxed(),
        (LogFormat::Compact, false) => base.compact().without_time().boxed(),
        (LogFormat::Full, _) => base
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
    }
}

/// Install the global subscriber. Later calls are ignored.
///
/// `RUST_LOG`, when set, replaces the configured level filter.
pub fn init_logging(config: &LogConfig) {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(config.filter_directive())
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(build_layer(config))
        .try_init()
        .ok();
}

/// Logs the start, duration and outcome of a long-running operation.
pub struct OperationGuard {
    name: String,
    start: std::time::Instant,
}

impl OperationGuard {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        tracing::info!(operation = %name, "Starting operation");
        Self {
            name,
            start: std::time::Instant::now(),
        }
    }

    pub fn complete(self) {
        tracing::info!(
            operation = %self.name,
            duration_ms = self.start.elapsed().as_millis(),
            "Operation completed"
        );
    }

    pub fn fail(self, error: &dyn std::error::Error) {
        tracing::error!(
            operation = %self.name,
            duration_ms = self.start.elapsed().as_millis(),
            error = %error,
            "Operation failed"
        );
    }

    /// Record the outcome of `result` and pass it through.
    ///
    /// # Errors
    ///
    /// Returns `result` unchanged.
    pub fn finish<T, E: std::error::Error>(self, result: Result<T, E>) -> Result<T, E> {
        match &result {
            Ok(_) => self.complete(),
            Err(e) => self.fail(e),
        }
        result
    }
}
