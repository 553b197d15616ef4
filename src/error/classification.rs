//! Classification types for sanitized, user-facing failures.
//!
//! A raw failure from the remote call surface is never shown as-is. The
//! classifier maps it to a [`SanitizedError`]: fixed display copy plus an
//! [`ErrorCategory`] that determines how severe the presentation should be.

use std::fmt;

use serde::Serialize;

/// The category of a classified failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Credentials or session problems. Always shown with fixed copy.
    Authentication(AuthReason),
    /// A domain rule rejected the request (balance, duplicates, limits).
    BusinessRule(BusinessReason),
    /// Internal infrastructure detail. Always masked behind generic copy.
    Infrastructure,
    /// A timeout produced by the orchestrator itself.
    Timeout(TimeoutSource),
    /// Nothing matched; either passed through or replaced by generic copy.
    Unclassified,
}

/// Reasons for authentication and session failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthReason {
    /// Email/password pair rejected.
    InvalidCredentials,
    /// Account exists but the email address was never confirmed.
    EmailNotConfirmed,
    /// Token, JWT or session no longer valid.
    SessionExpired,
}

/// Reasons for business-rule rejections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessReason {
    InsufficientFunds,
    AlreadyProcessed,
    AlreadyRegistered,
    LimitExceeded,
    InvalidDeposit,
    InvalidWithdrawal,
}

/// Which timer produced a timeout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutSource {
    /// The feedback machine's loading watchdog fired.
    Watchdog,
    /// The retry coordinator's attempt timer fired and the caller stopped waiting.
    RetryCoordinator,
}

/// How loudly a classified failure should be presented.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// A decision point for the user, not a failure of the system.
    Warning,
    /// The operation failed.
    Error,
}

impl ErrorCategory {
    /// Returns the presentation severity for this category.
    pub fn severity(&self) -> Severity {
        match self {
            ErrorCategory::BusinessRule(_) => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Authentication(reason) => write!(f, "authentication ({:?})", reason),
            ErrorCategory::BusinessRule(reason) => write!(f, "business rule ({:?})", reason),
            ErrorCategory::Infrastructure => write!(f, "infrastructure"),
            ErrorCategory::Timeout(source) => write!(f, "timeout ({:?})", source),
            ErrorCategory::Unclassified => write!(f, "unclassified"),
        }
    }
}

/// A failure made safe for display.
///
/// Derived from a raw failure on every call and never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SanitizedError {
    /// Short text that is safe to show to the user.
    pub display_text: String,
    /// The category the raw failure fell into.
    pub category: ErrorCategory,
}

impl SanitizedError {
    /// Creates a new sanitized error.
    pub fn new(display_text: impl Into<String>, category: ErrorCategory) -> Self {
        Self {
            display_text: display_text.into(),
            category,
        }
    }

    /// Returns the presentation severity.
    pub fn severity(&self) -> Severity {
        self.category.severity()
    }

    /// Returns true if the raw text was replaced because it leaked infrastructure detail.
    pub fn is_masked(&self) -> bool {
        matches!(self.category, ErrorCategory::Infrastructure)
    }

    /// Returns true for authentication and session failures.
    pub fn is_authentication(&self) -> bool {
        matches!(self.category, ErrorCategory::Authentication(_))
    }
}

impl fmt::Display for SanitizedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_text)
    }
}

/// A raw failure value as produced by the remote call surface.
///
/// Remote failures arrive either as bare text or as a structured value
/// with a message field and an optional machine-readable code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFailure {
    /// The raw message. May contain internal detail; never display directly.
    pub message: String,
    /// Optional backend error code.
    pub code: Option<String>,
}

impl RawFailure {
    /// Creates a raw failure from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Attaches a backend error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Captures the message of any error value.
    pub fn from_error<E: std::error::Error + ?Sized>(error: &E) -> Self {
        Self::new(error.to_string())
    }
}

impl fmt::Display for RawFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RawFailure {}

impl From<&str> for RawFailure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for RawFailure {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// A failure value the classifier can inspect.
///
/// The display text is matched against message rules. A machine-readable
/// [`Failure::code`] is looked up in the safe-code table first.
pub trait Failure: fmt::Display {
    /// Backend error code, if the failure carries one.
    fn code(&self) -> Option<&str> {
        None
    }
}

impl Failure for str {}

impl Failure for String {}

impl Failure for std::io::Error {}

impl Failure for Box<dyn std::error::Error + Send + Sync> {}

impl Failure for RawFailure {
    fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

impl<T: Failure + ?Sized> Failure for &T {
    fn code(&self) -> Option<&str> {
        (**self).code()
    }
}
