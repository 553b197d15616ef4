//! What the presentation layer observes.
//!
//! The view is a pure consumer: it reads a [`PresentationSnapshot`] and
//! calls the acknowledgment actions. It never mutates status directly.

mod renderer;

pub use renderer::StatusRenderer;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::feedback::{FeedbackMachine, FeedbackState, FeedbackStatus};
use crate::retry::{RetryCoordinator, RetryDecision, RetryPrompt};

/// Everything a view needs to render feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresentationSnapshot {
    pub status: FeedbackStatus,
    pub message: Option<String>,
    /// Raised by the loading watchdog; cleared by acknowledgment.
    pub connectivity_timeout: bool,
    /// Pending retry/abandon decision, if any.
    pub retry_prompt: Option<RetryPrompt>,
    pub captured_at: DateTime<Utc>,
}

/// Read side of the orchestrator, plus the user's acknowledgment actions.
#[derive(Debug)]
pub struct Presenter {
    feedback: FeedbackMachine,
    retry: RetryCoordinator,
    state_rx: watch::Receiver<FeedbackState>,
    connectivity_rx: watch::Receiver<bool>,
    prompt_rx: watch::Receiver<Option<RetryPrompt>>,
}

impl Presenter {
    pub fn new(feedback: &FeedbackMachine, retry: &RetryCoordinator) -> Self {
        Self {
            feedback: feedback.clone(),
            retry: retry.clone(),
            state_rx: feedback.subscribe(),
            connectivity_rx: feedback.connectivity_alert(),
            prompt_rx: retry.prompts(),
        }
    }

    /// Returns the current view state and marks it as seen.
    pub fn snapshot(&mut self) -> PresentationSnapshot {
        let state = self.state_rx.borrow_and_update().clone();
        let connectivity_timeout = *self.connectivity_rx.borrow_and_update();
        let retry_prompt = self.prompt_rx.borrow_and_update().clone();
        PresentationSnapshot {
            status: state.status,
            message: state.message,
            connectivity_timeout,
            retry_prompt,
            captured_at: Utc::now(),
        }
    }

    /// Waits until any part of the view state changes, then returns a fresh snapshot.
    ///
    /// Returns `None` once every source has been dropped.
    pub async fn changed(&mut self) -> Option<PresentationSnapshot> {
        let changed = tokio::select! {
            result = self.state_rx.changed() => result,
            result = self.connectivity_rx.changed() => result,
            result = self.prompt_rx.changed() => result,
        };
        changed.ok().map(|()| self.snapshot())
    }

    /// Serializes the current snapshot as JSON for a view bridge.
    pub fn to_json(&mut self) -> serde_json::Result<String> {
        serde_json::to_string(&self.snapshot())
    }

    /// Dismisses the connectivity-timeout notice.
    pub fn acknowledge_connectivity_timeout(&self) -> bool {
        self.feedback.acknowledge_connectivity_timeout()
    }

    /// Answers the pending retry prompt.
    pub fn answer_prompt(&self, decision: RetryDecision) -> bool {
        self.retry.decide(decision)
    }
}
