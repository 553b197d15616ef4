//! Structured diagnostics for the orchestrator.
//!
//! Every component logs through `tracing`. The subscriber set up here
//! writes to stderr so that stdout stays free for command output such as
//! JSON snapshots. `RUST_LOG` takes precedence over the configured level.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

/// Verbosity of the installed subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    /// Default: lifecycle events such as forced logouts and watchdog fires.
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            // Off is enforced by the filter directive.
            LogLevel::Error | LogLevel::Off => Level::ERROR,
        }
    }
}

impl From<u8> for LogLevel {
    /// Maps a `-v` count: 0 = warn, 1 = info, 2 = debug, 3+ = trace.
    fn from(verbosity: u8) -> Self {
        match verbosity {
            0 => LogLevel::Warn,
            1 => LogLevel::Info,
            2 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub with_timestamps: bool,
    /// Include the module path of each event.
    pub with_target: bool,
    pub with_ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_timestamps: true,
            with_target: true,
            with_ansi: true,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.with_timestamps = enabled;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }

    /// Builds a configuration from a `-v` count.
    pub fn from_verbosity(verbosity: u8) -> Self {
        Self::default().with_level(LogLevel::from(verbosity))
    }

    fn filter(&self) -> EnvFilter {
        if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(self.level.directive())
        }
    }
}

/// Returned when a global subscriber was already installed.
#[derive(Debug, Error)]
#[error("failed to install log subscriber: {0}")]
pub struct LoggingInitError(String);

/// Installs the global subscriber.
///
/// # Examples
///
/// ```no_run
/// use async_feedback::logging::{try_init_logging, LogLevel, LoggingConfig};
///
/// try_init_logging(LoggingConfig::new().with_level(LogLevel::Debug))
///     .expect("logging installed once");
/// ```
pub fn try_init_logging(config: LoggingConfig) -> Result<(), LoggingInitError> {
    let builder = fmt::Subscriber::builder()
        .with_env_filter(config.filter())
        .with_writer(std::io::stderr)
        .with_target(config.with_target)
        .with_ansi(config.with_ansi);

    let result = if config.with_timestamps {
        builder.try_init()
    } else {
        builder.without_time().try_init()
    };
    result.map_err(|e| LoggingInitError(e.to_string()))
}

/// Installs the global subscriber, ignoring a second installation.
pub fn init_logging(config: LoggingConfig) {
    let _ = try_init_logging(config);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_verbosity() {
        assert_eq!(LogLevel::from(0), LogLevel::Warn);
        assert_eq!(LogLevel::from(1), LogLevel::Info);
        assert_eq!(LogLevel::from(2), LogLevel::Debug);
        assert_eq!(LogLevel::from(9), LogLevel::Trace);
    }

    #[test]
    fn test_off_maps_to_error_level() {
        assert_eq!(Level::from(LogLevel::Off), Level::ERROR);
        assert_eq!(LogLevel::Off.directive(), "off");
    }

    #[test]
    fn test_logging_config_builder() {
        let config = LoggingConfig::new()
            .with_level(LogLevel::Debug)
            .with_timestamps(false)
            .with_ansi(false);

        assert_eq!(config.level, LogLevel::Debug);
        assert!(!config.with_timestamps);
        assert!(!config.with_ansi);
        assert!(config.with_target);
    }

    #[test]
    fn test_second_install_is_reported() {
        init_logging(LoggingConfig::new().with_level(LogLevel::Off));
        assert!(try_init_logging(LoggingConfig::new()).is_err());
    }
}
