//! Failure classification and sanitization.
//!
//! Every raw failure passes through [`ErrorClassifier`] before anything is
//! shown to the user. Infrastructure detail is always masked; authentication
//! and business-rule failures get fixed copy; short plain messages may be
//! passed through depending on the [`MaskingPolicy`].

pub mod classification;
pub mod classifier;

// Re-export main types for convenient access
pub use classification::{
    AuthReason, BusinessReason, ErrorCategory, Failure, RawFailure, SanitizedError, Severity,
    TimeoutSource,
};
pub use classifier::{
    default_classifier, ClassifierConfig, ClassifierError, ErrorClassifier, ErrorPattern,
    MaskingPolicy,
};
