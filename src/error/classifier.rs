//! Pattern-based failure classifier.
//!
//! Raw failure messages are matched against ordered tiers of
//! case-insensitive patterns: authentication first, then business rules,
//! then infrastructure detail. The first match wins and yields fixed copy.
//! Infrastructure matches are a security boundary: the raw text of such a
//! failure must never reach the presentation layer.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::{
    AuthReason, BusinessReason, ErrorCategory, Failure, RawFailure, SanitizedError, TimeoutSource,
};

/// Generic copy shown for any masked infrastructure failure.
pub const SERVICE_UNAVAILABLE: &str =
    "Service temporarily unavailable. Please try again in a few moments.";

/// Generic copy shown when an unclassified message cannot be passed through.
pub const PROCESSING_ERROR: &str =
    "There was an error processing your request. Please try again.";

/// Copy shown for every session/token failure.
pub const SESSION_EXPIRED: &str = "Your session has expired. Please sign in again.";

/// Copy for a feedback watchdog timeout.
pub const WATCHDOG_TIMEOUT: &str =
    "The request is taking longer than expected. Check your connection.";

/// Copy for a retry coordinator timeout the user gave up on.
pub const CONNECTION_TIMEOUT: &str = "Operation failed due to connection timeout.";

/// Errors raised while building classifier rules.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The supplied pattern is not a valid regular expression.
    #[error("invalid classifier pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Only authentication, business-rule and infrastructure rules can be added.
    #[error("category '{0}' cannot be matched by a pattern rule")]
    UnsupportedCategory(ErrorCategory),
}

/// What to do with messages no rule recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskingPolicy {
    /// Pass short, plain messages through verbatim; mask the rest.
    #[default]
    DenyList,
    /// Only show copy for messages a rule recognises; mask everything else.
    AllowList,
}

/// Classifier settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Messages with this many characters or more are never passed through.
    pub passthrough_max_chars: usize,
    /// Handling of unrecognised messages.
    pub policy: MaskingPolicy,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            passthrough_max_chars: 80,
            policy: MaskingPolicy::DenyList,
        }
    }
}

/// Rule tiers, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Tier {
    Authentication,
    BusinessRule,
    Infrastructure,
}

impl Tier {
    fn of(category: &ErrorCategory) -> Option<Self> {
        match category {
            ErrorCategory::Authentication(_) => Some(Tier::Authentication),
            ErrorCategory::BusinessRule(_) => Some(Tier::BusinessRule),
            ErrorCategory::Infrastructure => Some(Tier::Infrastructure),
            ErrorCategory::Timeout(_) | ErrorCategory::Unclassified => None,
        }
    }
}

/// A single classification rule.
#[derive(Debug, Clone)]
pub struct ErrorPattern {
    regex: Regex,
    category: ErrorCategory,
    copy: String,
    tier: Tier,
}

impl ErrorPattern {
    /// Creates a rule matching `pattern` case-insensitively anywhere in the message.
    pub fn new(
        pattern: &str,
        category: ErrorCategory,
        copy: impl Into<String>,
    ) -> Result<Self, ClassifierError> {
        let tier = Tier::of(&category).ok_or(ClassifierError::UnsupportedCategory(category))?;
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| ClassifierError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Self {
            regex,
            category,
            copy: copy.into(),
            tier,
        })
    }

    /// Creates a rule matching a literal substring, case-insensitively.
    pub fn literal(
        needle: &str,
        category: ErrorCategory,
        copy: impl Into<String>,
    ) -> Result<Self, ClassifierError> {
        Self::new(&regex::escape(needle), category, copy)
    }

    /// Returns the category assigned on match.
    pub fn category(&self) -> &ErrorCategory {
        &self.category
    }

    /// Returns the fixed copy shown on match.
    pub fn copy(&self) -> &str {
        &self.copy
    }

    /// Checks if this rule matches the given message.
    pub fn matches(&self, message: &str) -> bool {
        self.regex.is_match(message)
    }
}

/// Built-in rules as data: (pattern, category, copy). Order within a tier matters.
const BUILTIN_RULES: &[(&str, ErrorCategory, &str)] = &[
    (
        r"invalid\s+(login\s+)?credentials|(wrong|incorrect)\s+(email\s+or\s+)?password",
        ErrorCategory::Authentication(AuthReason::InvalidCredentials),
        "Incorrect email or password.",
    ),
    (
        r"email\s+(address\s+)?not\s+(confirmed|verified)|unconfirmed\s+email",
        ErrorCategory::Authentication(AuthReason::EmailNotConfirmed),
        "Please confirm your email address before signing in.",
    ),
    (
        r"jwt|token|unauthori[sz]ed|not\s+authenticated|session[\s_-]*(expired|not\s+found|missing)",
        ErrorCategory::Authentication(AuthReason::SessionExpired),
        SESSION_EXPIRED,
    ),
    (
        r"insufficient[\s_]*(funds|balance)|not\s+enough\s+(funds|balance)",
        ErrorCategory::BusinessRule(BusinessReason::InsufficientFunds),
        "Insufficient balance for this operation.",
    ),
    (
        r"duplicate|already\s+(been\s+)?processed",
        ErrorCategory::BusinessRule(BusinessReason::AlreadyProcessed),
        "This request has already been processed.",
    ),
    (
        r"already\s+registered|user\s+already\s+exists|email\s+(address\s+)?already\s+(in\s+use|exists)",
        ErrorCategory::BusinessRule(BusinessReason::AlreadyRegistered),
        "This account is already registered.",
    ),
    (
        r"limit\s*(exceeded|reached)|exceeds?\s+(the\s+)?limit|quota\s*(exceeded|exhausted)",
        ErrorCategory::BusinessRule(BusinessReason::LimitExceeded),
        "Limit exceeded for this operation.",
    ),
    (
        r"invalid\s+deposit",
        ErrorCategory::BusinessRule(BusinessReason::InvalidDeposit),
        "Invalid deposit request. Check the amount and try again.",
    ),
    (
        r"invalid\s+withdraw(al)?",
        ErrorCategory::BusinessRule(BusinessReason::InvalidWithdrawal),
        "Invalid withdrawal request. Check the amount and try again.",
    ),
    (
        r"sql|database|schema|table|column|relation|postgrest|pgrst|rpc|syntax\s+error|constraint|stack\s*trace",
        ErrorCategory::Infrastructure,
        SERVICE_UNAVAILABLE,
    ),
    (
        r"network|cors|fetch|econn(refused|reset)|socket|internal\s+server\s+error",
        ErrorCategory::Infrastructure,
        SERVICE_UNAVAILABLE,
    ),
];

/// Classifies raw failures into [`SanitizedError`]s.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    /// Rules sorted by tier; insertion order kept within a tier.
    rules: Vec<ErrorPattern>,
    /// Known backend codes with fixed copy, checked before any message rule.
    safe_codes: HashMap<String, SanitizedError>,
    config: ClassifierConfig,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorClassifier {
    /// Creates a classifier with the built-in rules and default settings.
    pub fn new() -> Self {
        Self::with_config(ClassifierConfig::default())
    }

    /// Creates a classifier with the built-in rules and the given settings.
    pub fn with_config(config: ClassifierConfig) -> Self {
        let rules = BUILTIN_RULES
            .iter()
            .map(|(pattern, category, copy)| {
                ErrorPattern::new(pattern, *category, *copy).expect("built-in pattern is valid")
            })
            .collect();
        Self {
            rules,
            safe_codes: HashMap::new(),
            config,
        }
    }

    /// Creates a classifier with no rules at all.
    pub fn empty(config: ClassifierConfig) -> Self {
        Self {
            rules: Vec::new(),
            safe_codes: HashMap::new(),
            config,
        }
    }

    /// Sets the masking policy.
    pub fn with_policy(mut self, policy: MaskingPolicy) -> Self {
        self.config.policy = policy;
        self
    }

    /// Adds a rule at the end of its tier.
    pub fn with_rule(mut self, rule: ErrorPattern) -> Self {
        let position = self
            .rules
            .iter()
            .position(|existing| existing.tier > rule.tier)
            .unwrap_or(self.rules.len());
        self.rules.insert(position, rule);
        self
    }

    /// Registers a backend error code whose copy is always safe to show.
    pub fn with_safe_code(
        mut self,
        code: impl Into<String>,
        category: ErrorCategory,
        copy: impl Into<String>,
    ) -> Self {
        self.safe_codes
            .insert(code.into(), SanitizedError::new(copy, category));
        self
    }

    /// Returns the active settings.
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Returns the number of message rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Classifies a raw message.
    pub fn classify(&self, message: &str) -> SanitizedError {
        if let Some(rule) = self.rules.iter().find(|rule| rule.matches(message)) {
            debug!(category = %rule.category, "failure matched classifier rule");
            return SanitizedError::new(rule.copy.clone(), rule.category);
        }
        self.fallback(message)
    }

    /// Classifies a structured failure, honouring known-safe codes first.
    pub fn classify_raw(&self, failure: &RawFailure) -> SanitizedError {
        self.classify_failure(failure)
    }

    /// Classifies any failure value: its code against the safe-code table,
    /// then its display text against the message rules.
    pub fn classify_failure<E: Failure + ?Sized>(&self, failure: &E) -> SanitizedError {
        if let Some(known) = failure.code().and_then(|code| self.safe_codes.get(code)) {
            debug!(category = %known.category, "failure matched safe code");
            return known.clone();
        }
        self.classify(&failure.to_string())
    }

    /// Returns the fixed copy for an orchestrator timeout.
    pub fn timeout(source: TimeoutSource) -> SanitizedError {
        let copy = match source {
            TimeoutSource::Watchdog => WATCHDOG_TIMEOUT,
            TimeoutSource::RetryCoordinator => CONNECTION_TIMEOUT,
        };
        SanitizedError::new(copy, ErrorCategory::Timeout(source))
    }

    fn fallback(&self, message: &str) -> SanitizedError {
        let trimmed = message.trim();
        let passthrough = self.config.policy == MaskingPolicy::DenyList
            && !trimmed.is_empty()
            && trimmed.chars().count() < self.config.passthrough_max_chars
            && !trimmed
                .chars()
                .any(|c| c == '<' || c == '>' || c.is_control());

        if passthrough {
            SanitizedError::new(trimmed, ErrorCategory::Unclassified)
        } else {
            SanitizedError::new(PROCESSING_ERROR, ErrorCategory::Unclassified)
        }
    }
}

/// Returns the process-wide classifier with built-in rules.
pub fn default_classifier() -> &'static ErrorClassifier {
    static DEFAULT: OnceLock<ErrorClassifier> = OnceLock::new();
    DEFAULT.get_or_init(ErrorClassifier::new)
}
