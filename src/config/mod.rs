//! Orchestrator configuration.
//!
//! Settings are read from a TOML file with environment variable overrides,
//! using the `config` crate. Durations are written in milliseconds.
//!
//! ```toml
//! [feedback]
//! watchdog_ms = 20000
//! success_display_ms = 2500
//!
//! [retry]
//! attempt_timeout_ms = 15000
//! max_manual_retries = 3
//!
//! [session]
//! inactivity_window_ms = 1800000
//! login_route = "/auth"
//! qualifying_events = ["pointer_down", "key_down", "touch_start"]
//!
//! [classifier]
//! passthrough_max_chars = 80
//! policy = "deny_list"
//! ```

use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::error::ClassifierConfig;
use crate::feedback::FeedbackConfig;
use crate::retry::RetryConfig;
use crate::session::SessionConfig;

/// Prefix of environment overrides, e.g. `FEEDBACK__RETRY__ATTEMPT_TIMEOUT_MS=30000`.
pub const ENV_PREFIX: &str = "FEEDBACK";

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    /// The configuration file was not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// The configuration file path is not valid UTF-8.
    #[error("invalid configuration path: {0}")]
    InvalidPath(String),

    /// The configuration could not be assembled or deserialized.
    #[error("failed to parse configuration: {0}")]
    ParseError(#[from] ConfigError),

    /// Inline TOML could not be parsed.
    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// A value is present but unusable.
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Root configuration for every orchestrator component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub feedback: FeedbackConfig,
    pub retry: RetryConfig,
    pub session: SessionConfig,
    pub classifier: ClassifierConfig,
}

impl OrchestratorConfig {
    /// Loads configuration from a TOML file, applying `FEEDBACK__` overrides.
    ///
    /// # Environment Variable Overrides
    ///
    /// Nested keys are separated by a double underscore:
    /// `FEEDBACK__SESSION__INACTIVITY_WINDOW_MS=600000`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist, cannot be parsed, or
    /// holds values that fail validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| ConfigLoadError::InvalidPath(format!("{:?}", path)))?;

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound(path_str.to_string()));
        }

        let settings = Config::builder()
            .add_source(File::with_name(path_str))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: OrchestratorConfig = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Parses configuration from a TOML string without environment overrides.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigLoadError> {
        let parsed: OrchestratorConfig = toml::from_str(source)?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Checks that every timer is non-zero and the login route is usable.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        let timers = [
            ("feedback.watchdog_ms", self.feedback.watchdog),
            ("feedback.success_display_ms", self.feedback.success_display),
            ("feedback.error_display_ms", self.feedback.error_display),
            ("feedback.warning_display_ms", self.feedback.warning_display),
            ("retry.attempt_timeout_ms", self.retry.attempt_timeout),
            ("session.inactivity_window_ms", self.session.inactivity_window),
        ];
        if let Some(&(field, _)) = timers.iter().find(|(_, duration)| duration.is_zero()) {
            return Err(ConfigLoadError::InvalidValue {
                field,
                reason: "must be greater than zero".to_string(),
            });
        }
        if !self.session.login_route.starts_with('/') {
            return Err(ConfigLoadError::InvalidValue {
                field: "session.login_route",
                reason: format!("'{}' is not an absolute route", self.session.login_route),
            });
        }
        if self.classifier.passthrough_max_chars == 0 {
            return Err(ConfigLoadError::InvalidValue {
                field: "classifier.passthrough_max_chars",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Serde adapter reading a `Duration` from whole milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::error::MaskingPolicy;
    use crate::session::InputEvent;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = OrchestratorConfig::from_toml_str("").unwrap();
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides_fields() {
        let config = OrchestratorConfig::from_toml_str(
            r#"
            [feedback]
            watchdog_ms = 5000

            [retry]
            attempt_timeout_ms = 30000
            max_manual_retries = 2

            [session]
            inactivity_window_ms = 600000
            qualifying_events = ["key_down"]

            [classifier]
            policy = "allow_list"
            "#,
        )
        .unwrap();

        assert_eq!(config.feedback.watchdog, Duration::from_secs(5));
        assert_eq!(config.feedback.success_display, Duration::from_millis(2500));
        assert_eq!(config.retry.attempt_timeout, Duration::from_secs(30));
        assert_eq!(config.retry.max_manual_retries, Some(2));
        assert_eq!(config.session.inactivity_window, Duration::from_secs(600));
        assert_eq!(config.session.qualifying_events, vec![InputEvent::KeyDown]);
        assert_eq!(config.session.login_route, "/auth");
        assert_eq!(config.classifier.policy, MaskingPolicy::AllowList);
        assert_eq!(config.classifier.passthrough_max_chars, 80);
    }

    #[test]
    fn test_zero_duration_is_rejected() {
        let result = OrchestratorConfig::from_toml_str("[feedback]\nwatchdog_ms = 0\n");
        assert!(matches!(
            result,
            Err(ConfigLoadError::InvalidValue {
                field: "feedback.watchdog_ms",
                ..
            })
        ));
    }

    #[test]
    fn test_relative_login_route_is_rejected() {
        let result = OrchestratorConfig::from_toml_str("[session]\nlogin_route = \"auth\"\n");
        assert!(matches!(result, Err(ConfigLoadError::InvalidValue { .. })));
    }

    #[test]
    fn test_malformed_toml() {
        let result = OrchestratorConfig::from_toml_str("[feedback\nwatchdog_ms = ");
        assert!(matches!(result, Err(ConfigLoadError::Toml(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = OrchestratorConfig::load("/nonexistent/feedback.toml");
        assert!(matches!(result, Err(ConfigLoadError::FileNotFound(_))));
    }
}
