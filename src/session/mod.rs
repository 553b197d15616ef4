//! Inactivity-based session expiry.
//!
//! While a session is active, [`SessionTimer`] keeps a rolling inactivity
//! window that only direct user input can reset. When the window elapses,
//! it forces a full logout through a [`SessionHost`]: invalidate the remote
//! session, clear persisted state, reset the in-memory profile and redirect
//! to the authentication entry point.
//!
//! The timer models user presence, not call latency. It is independent of
//! the feedback watchdog and the retry coordinator, and background calls
//! never reset it.

pub mod host;
pub mod timer;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::duration_ms;

pub use host::{HostAction, MemorySessionHost, SessionHost};
pub use timer::SessionTimer;

/// Global input events the timer can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputEvent {
    PointerDown,
    KeyDown,
    TouchStart,
    PointerMove,
    Scroll,
    /// Activity generated by the application itself, such as polling.
    Background,
}

impl InputEvent {
    /// The events that count as user presence unless configured otherwise.
    pub const DEFAULT_QUALIFYING: [InputEvent; 3] = [
        InputEvent::PointerDown,
        InputEvent::KeyDown,
        InputEvent::TouchStart,
    ];
}

/// Settings for the session timer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inactivity allowed before a forced logout.
    /// Default: 30 minutes
    #[serde(rename = "inactivity_window_ms", deserialize_with = "duration_ms::deserialize")]
    pub inactivity_window: Duration,

    /// Route of the authentication entry point.
    /// Default: "/auth"
    pub login_route: String,

    /// Input events that reset the window.
    pub qualifying_events: Vec<InputEvent>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_window: Duration::from_secs(30 * 60),
            login_route: "/auth".to_string(),
            qualifying_events: InputEvent::DEFAULT_QUALIFYING.to_vec(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the inactivity window.
    pub fn with_inactivity_window(mut self, window: Duration) -> Self {
        self.inactivity_window = window;
        self
    }

    /// Sets the route used after a forced logout.
    pub fn with_login_route(mut self, route: impl Into<String>) -> Self {
        self.login_route = route.into();
        self
    }

    /// Replaces the set of qualifying input events.
    pub fn with_qualifying_events(mut self, events: impl IntoIterator<Item = InputEvent>) -> Self {
        self.qualifying_events = events.into_iter().collect();
        self
    }

    /// Returns true if `event` resets the inactivity window.
    pub fn is_qualifying(&self, event: InputEvent) -> bool {
        self.qualifying_events.contains(&event)
    }
}

/// Failures reported by a [`SessionHost`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The remote session could not be invalidated.
    #[error("failed to invalidate remote session: {0}")]
    RemoteInvalidation(String),

    /// Persisted state could not be cleared.
    #[error("failed to clear persisted state: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.inactivity_window, Duration::from_secs(1800));
        assert_eq!(config.login_route, "/auth");
        assert!(config.is_qualifying(InputEvent::PointerDown));
        assert!(config.is_qualifying(InputEvent::KeyDown));
        assert!(config.is_qualifying(InputEvent::TouchStart));
        assert!(!config.is_qualifying(InputEvent::Background));
        assert!(!config.is_qualifying(InputEvent::PointerMove));
    }

    #[test]
    fn test_custom_qualifying_events() {
        let config = SessionConfig::new()
            .with_qualifying_events([InputEvent::Scroll])
            .with_login_route("/login");
        assert!(config.is_qualifying(InputEvent::Scroll));
        assert!(!config.is_qualifying(InputEvent::KeyDown));
        assert_eq!(config.login_route, "/login");
    }
}
