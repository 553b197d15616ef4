//! User-driven retry for calls that should survive a slow network.
//!
//! [`RetryCoordinator::run_with_timeout`] races each attempt against a
//! timer. When the timer wins, the call is not abandoned: a [`RetryPrompt`]
//! is published and the caller stays suspended until the user picks
//! [`RetryDecision::Retry`] or [`RetryDecision::Abandon`].
//!
//! Abandoning is caller abandonment, not work termination. Attempts run as
//! their own tasks and keep running after the caller stops waiting; any side
//! effects they commit still happen.

pub mod coordinator;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::duration_ms;
use crate::error::{ErrorClassifier, Failure, SanitizedError, TimeoutSource};

pub use coordinator::RetryCoordinator;

/// How many times the user may retry a timed out call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Maximum manual retries per call. `None` means the user may retry forever.
    pub max_manual_retries: Option<u32>,
}

impl RetryPolicy {
    /// Unlimited user-driven retries.
    pub fn unlimited() -> Self {
        Self {
            max_manual_retries: None,
        }
    }

    /// At most `retries` manual retries per call.
    pub fn bounded(retries: u32) -> Self {
        Self {
            max_manual_retries: Some(retries),
        }
    }

    /// Returns true if another retry may be offered after `retries_used` retries.
    pub fn allows_retry(&self, retries_used: u32) -> bool {
        self.max_manual_retries.map_or(true, |max| retries_used < max)
    }
}

/// Settings for the retry coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Time an attempt may run before the user is asked what to do.
    /// Default: 15 seconds
    #[serde(rename = "attempt_timeout_ms", deserialize_with = "duration_ms::deserialize")]
    pub attempt_timeout: Duration,

    /// Maximum manual retries per call. Unset means unlimited.
    pub max_manual_retries: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(15),
            max_manual_retries: None,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-attempt timeout.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Sets the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.max_manual_retries = policy.max_manual_retries;
        self
    }

    /// Returns the retry policy.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_manual_retries: self.max_manual_retries,
        }
    }
}

/// The user's answer to a [`RetryPrompt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryDecision {
    /// Start a fresh attempt with a fresh timer.
    Retry,
    /// Stop waiting. The timed out attempt is not stopped.
    Abandon,
}

/// The modal decision point shown after an attempt timed out.
///
/// Only one prompt is pending at a time; a newer timeout replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryPrompt {
    /// Unique id of this prompt.
    pub id: u64,
    /// The attempt that timed out (1-based).
    pub attempt: u32,
}

/// Failure of a coordinated call.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The operation itself failed before its timer fired.
    #[error("{0}")]
    Operation(E),

    /// The user stopped waiting after a timeout, or the prompt was replaced
    /// by a newer one. The attempt may still complete in the background.
    #[error("operation failed due to connection timeout")]
    Abandoned,

    /// The retry limit was reached and the last attempt timed out too.
    #[error("operation timed out after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

impl<E> RetryError<E> {
    /// Returns true for the timeout variants.
    pub fn is_timeout(&self) -> bool {
        !matches!(self, RetryError::Operation(_))
    }

    /// Returns the operation's own failure, if that is what happened.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            RetryError::Operation(error) => Some(error),
            _ => None,
        }
    }
}

impl<E: Failure> RetryError<E> {
    /// Returns display-safe copy for this failure.
    pub fn sanitized(&self, classifier: &ErrorClassifier) -> SanitizedError {
        match self {
            RetryError::Operation(error) => classifier.classify_failure(error),
            _ => ErrorClassifier::timeout(TimeoutSource::RetryCoordinator),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.attempt_timeout, Duration::from_secs(15));
        assert_eq!(config.policy(), RetryPolicy::unlimited());
        let bounded = RetryConfig::new().with_policy(RetryPolicy::bounded(3));
        assert_eq!(bounded.max_manual_retries, Some(3));
    }

    #[test]
    fn test_policy_limits() {
        assert!(RetryPolicy::unlimited().allows_retry(u32::MAX - 1));
        let bounded = RetryPolicy::bounded(2);
        assert!(bounded.allows_retry(0));
        assert!(bounded.allows_retry(1));
        assert!(!bounded.allows_retry(2));
        assert!(!RetryPolicy::bounded(0).allows_retry(0));
    }

    #[test]
    fn test_abandoned_message() {
        let error: RetryError<String> = RetryError::Abandoned;
        assert_eq!(
            error.to_string(),
            "operation failed due to connection timeout"
        );
        assert!(error.is_timeout());
    }

    #[test]
    fn test_sanitized_masks_operation_errors() {
        let classifier = ErrorClassifier::new();
        let error = RetryError::Operation("permission denied for schema private".to_string());
        assert!(error.sanitized(&classifier).is_masked());

        let timeout: RetryError<String> = RetryError::RetriesExhausted { attempts: 3 };
        assert_eq!(
            timeout.sanitized(&classifier).category,
            crate::error::ErrorCategory::Timeout(TimeoutSource::RetryCoordinator)
        );
    }

    #[test]
    fn test_into_operation_error() {
        let error: RetryError<&str> = RetryError::Operation("boom");
        assert_eq!(error.into_operation_error(), Some("boom"));
        let abandoned: RetryError<&str> = RetryError::Abandoned;
        assert_eq!(abandoned.into_operation_error(), None);
    }
}
