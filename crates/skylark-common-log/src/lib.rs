//! Logging infrastructure for Skylark.
//!
//! The client crates only emit `tracing` events. Binaries and test suites call
//! [`init`] once to install a subscriber.

use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Environment variable names read by [`LogConfig::from_env`].
pub mod vars {
    pub const LOG_LEVEL: &str = "SKYLARK_LOG_LEVEL";
    pub const LOG_FORMAT: &str = "SKYLARK_LOG_FORMAT";
    pub const LOG_SOURCE: &str = "SKYLARK_LOG_SOURCE";
    pub const LOG_SPANS: &str = "SKYLARK_LOG_SPANS";
    pub const RUST_LOG: &str = "RUST_LOG";
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level.
    pub level: LogLevel,
    /// Raw `RUST_LOG` directives, used only when no explicit level was set.
    pub directives: Option<String>,
    /// Output format.
    pub format: LogFormat,
    /// Include source file and line.
    pub source_location: bool,
    /// Emit span open/close events.
    pub span_events: bool,
    /// Route output through the test writer so `cargo test` captures it.
    pub test_writer: bool,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line format.
    #[default]
    Pretty,
    /// Single-line format.
    Compact,
    /// JSON structured format.
    Json,
}

impl LogFormat {
    /// Parse from string, falling back to [`LogFormat::Pretty`].
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            directives: None,
            format: LogFormat::default(),
            source_location: false,
            span_events: false,
            test_writer: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        match lookup(vars::LOG_LEVEL) {
            Some(level) => {
                if let Some(level) = LogLevel::parse(&level) {
                    config.level = level;
                }
            }
            None => {
                if let Some(directives) = lookup(vars::RUST_LOG) {
                    if let Some(level) = LogLevel::parse(&directives) {
                        config.level = level;
                    }
                    config.directives = Some(directives);
                }
            }
        }

        if let Some(format) = lookup(vars::LOG_FORMAT) {
            config.format = LogFormat::parse(&format);
        }

        config.source_location = lookup(vars::LOG_SOURCE).map(|v| is_truthy(&v)).unwrap_or(false);
        config.span_events = lookup(vars::LOG_SPANS).map(|v| is_truthy(&v)).unwrap_or(false);

        config
    }

    /// Configuration used by test suites: debug level, compact, captured.
    pub fn for_tests() -> Self {
        Self {
            level: LogLevel::Debug,
            directives: None,
            format: LogFormat::Compact,
            source_location: false,
            span_events: false,
            test_writer: true,
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Filter for `config`: its directives when they parse, else its level.
fn env_filter(config: &LogConfig) -> EnvFilter {
    config
        .directives
        .as_deref()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(config.level.as_str()))
}

/// Initialize logging with the given configuration.
pub fn init(config: LogConfig) -> Result<(), LogError> {
    let filter = env_filter(&config);

    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .with_target(true)
                .with_file(config.source_location)
                .with_line_number(config.source_location)
                .with_span_events(span_events);
            if config.test_writer {
                registry.with(layer.with_test_writer()).try_init()
            } else {
                registry.with(layer).try_init()
            }
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_file(config.source_location)
                .with_line_number(config.source_location)
                .with_span_events(span_events);
            if config.test_writer {
                registry.with(layer.with_test_writer()).try_init()
            } else {
                registry.with(layer).try_init()
            }
        }
        LogFormat::Json => {
            let layer = fmt::layer().json().with_span_events(span_events);
            if config.test_writer {
                registry.with(layer.with_test_writer()).try_init()
            } else {
                registry.with(layer).try_init()
            }
        }
    };

    result.map_err(|e| LogError::InitError(e.to_string()))
}

/// Logging errors.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("failed to initialize logging: {0}")]
    InitError(String),
}
