//! Global feedback status for in-flight work.
//!
//! This module provides the single status every screen renders: idle,
//! loading, success, warning or error, plus an optional message. The
//! [`FeedbackMachine`] owns the transitions and their timers; a process-wide
//! instance is available through [`global`].

pub mod machine;

use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::duration_ms;
use crate::error::ErrorClassifier;

pub use machine::{FeedbackMachine, RunMessages};

/// The displayed status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackStatus {
    /// Nothing to show. Initial state and the target of every revert.
    #[default]
    Idle,
    /// Work is in flight.
    Loading,
    /// Work finished and a confirmation is shown.
    Success,
    /// A decision point for the user.
    Warning,
    /// Work failed.
    Error,
}

impl fmt::Display for FeedbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeedbackStatus::Idle => "idle",
            FeedbackStatus::Loading => "loading",
            FeedbackStatus::Success => "success",
            FeedbackStatus::Warning => "warning",
            FeedbackStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// Status plus optional message, as observed by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FeedbackState {
    pub status: FeedbackStatus,
    pub message: Option<String>,
}

impl FeedbackState {
    /// The idle state with no message.
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        self.status == FeedbackStatus::Idle
    }
}

/// Timer durations for the feedback machine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Time a loading state may last before the machine forces idle.
    /// Default: 20 seconds
    #[serde(rename = "watchdog_ms", deserialize_with = "duration_ms::deserialize")]
    pub watchdog: Duration,

    /// Display time of a success message.
    /// Default: 2.5 seconds
    #[serde(rename = "success_display_ms", deserialize_with = "duration_ms::deserialize")]
    pub success_display: Duration,

    /// Display time of an error message.
    /// Default: 4 seconds
    #[serde(rename = "error_display_ms", deserialize_with = "duration_ms::deserialize")]
    pub error_display: Duration,

    /// Display time of a warning message.
    /// Default: 3 seconds
    #[serde(rename = "warning_display_ms", deserialize_with = "duration_ms::deserialize")]
    pub warning_display: Duration,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            watchdog: Duration::from_secs(20),
            success_display: Duration::from_millis(2500),
            error_display: Duration::from_secs(4),
            warning_display: Duration::from_secs(3),
        }
    }
}

impl FeedbackConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the loading watchdog duration.
    pub fn with_watchdog(mut self, watchdog: Duration) -> Self {
        self.watchdog = watchdog;
        self
    }

    /// Sets the success display duration.
    pub fn with_success_display(mut self, duration: Duration) -> Self {
        self.success_display = duration;
        self
    }

    /// Sets the error display duration.
    pub fn with_error_display(mut self, duration: Duration) -> Self {
        self.error_display = duration;
        self
    }

    /// Sets the warning display duration.
    pub fn with_warning_display(mut self, duration: Duration) -> Self {
        self.warning_display = duration;
        self
    }
}

/// Errors raised when managing the process-wide machine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedbackError {
    /// [`install_global`] was called after the global machine already existed.
    #[error("the global feedback machine is already initialized")]
    AlreadyInitialized,
}

static GLOBAL: OnceLock<FeedbackMachine> = OnceLock::new();

/// Returns the process-wide feedback machine, creating it with defaults on first use.
pub fn global() -> &'static FeedbackMachine {
    GLOBAL.get_or_init(|| FeedbackMachine::new(FeedbackConfig::default()))
}

/// Installs the process-wide machine with custom settings.
///
/// Must run before the first call to [`global`].
pub fn install_global(
    config: FeedbackConfig,
    classifier: ErrorClassifier,
) -> Result<&'static FeedbackMachine, FeedbackError> {
    GLOBAL
        .set(FeedbackMachine::with_classifier(config, classifier))
        .map_err(|_| FeedbackError::AlreadyInitialized)?;
    Ok(global())
}
