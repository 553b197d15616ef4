//! async-feedback - user-facing feedback for in-flight remote work.
//!
//! The crate keeps one global status (idle, loading, success, warning,
//! error) for asynchronous operations, turns raw remote failures into safe
//! display text, lets the user retry or abandon calls that hang on a slow
//! network, and forces a logout after a period without user input.
//!
//! Components:
//! - [`error`]: failure classification and masking
//! - [`feedback`]: the feedback state machine and its watchdog
//! - [`retry`]: user-driven retry with a modal prompt
//! - [`session`]: the inactivity timer and logout sequence
//! - [`presentation`]: what a view observes
//! - [`orchestrator`]: a facade owning all of the above

pub mod config;
pub mod error;
pub mod feedback;
pub mod logging;
pub mod orchestrator;
pub mod presentation;
pub mod retry;
pub mod session;

pub use config::{ConfigLoadError, OrchestratorConfig};
pub use error::{ErrorClassifier, SanitizedError};
pub use feedback::{FeedbackMachine, FeedbackStatus, RunMessages};
pub use orchestrator::Orchestrator;
pub use retry::{RetryCoordinator, RetryDecision, RetryError};
pub use session::{SessionHost, SessionTimer};
