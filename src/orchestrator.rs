//! Facade wiring the classifier, feedback machine and retry coordinator.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::config::OrchestratorConfig;
use crate::error::{ErrorClassifier, Failure, TimeoutSource};
use crate::feedback::{self, FeedbackError, FeedbackMachine, RunMessages};
use crate::presentation::Presenter;
use crate::retry::{RetryCoordinator, RetryError};
use crate::session::{SessionHost, SessionTimer};

/// Owns the feedback machine, the retry coordinator and the classifier.
///
/// Applications build one with [`Orchestrator::global`], which drives the
/// process-wide status from [`feedback::global`]. [`Orchestrator::new`]
/// builds an isolated machine, for tests and embedded instances.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: OrchestratorConfig,
    feedback: FeedbackMachine,
    retry: RetryCoordinator,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(OrchestratorConfig::default())
    }
}

impl Orchestrator {
    /// Creates an orchestrator with its own feedback machine, separate from
    /// [`feedback::global`].
    pub fn new(config: OrchestratorConfig) -> Self {
        let classifier = ErrorClassifier::with_config(config.classifier.clone());
        let feedback = FeedbackMachine::with_classifier(config.feedback.clone(), classifier);
        Self::with_feedback(config, feedback)
    }

    /// Creates the orchestrator on top of the process-wide feedback machine,
    /// installing it with `config`.
    ///
    /// # Errors
    ///
    /// Returns [`FeedbackError::AlreadyInitialized`] if the global machine
    /// was already installed or used.
    pub fn global(config: OrchestratorConfig) -> Result<Self, FeedbackError> {
        let classifier = ErrorClassifier::with_config(config.classifier.clone());
        let feedback = feedback::install_global(config.feedback.clone(), classifier)?.clone();
        Ok(Self::with_feedback(config, feedback))
    }

    fn with_feedback(config: OrchestratorConfig, feedback: FeedbackMachine) -> Self {
        let retry = RetryCoordinator::new(config.retry.clone());
        Self {
            config,
            feedback,
            retry,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn feedback(&self) -> &FeedbackMachine {
        &self.feedback
    }

    pub fn retry(&self) -> &RetryCoordinator {
        &self.retry
    }

    /// Creates a presenter observing this orchestrator.
    pub fn presenter(&self) -> Presenter {
        Presenter::new(&self.feedback, &self.retry)
    }

    /// Creates a session timer with this orchestrator's session settings.
    pub fn session_timer(&self, host: Arc<dyn SessionHost>) -> SessionTimer {
        SessionTimer::new(self.config.session.clone(), host)
    }

    /// Runs `operation` with feedback transitions. See [`FeedbackMachine::run`].
    pub async fn run<T, E, F, Fut>(&self, operation: F, messages: RunMessages) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Failure,
    {
        self.feedback.run(operation, messages).await
    }

    /// Runs `operation` with feedback transitions nested inside the retry
    /// coordinator, for calls that should survive a slow network.
    ///
    /// Every attempt, including manual retries, goes through its own
    /// feedback `run`. Only the attempt the caller is still waiting on may
    /// change the status: once the user retries, an older attempt's late
    /// settlement is ignored, and once the call gives up on a timeout the
    /// fixed connection-timeout copy is shown and every attempt is ignored.
    pub async fn run_resilient<T, E, F, Fut>(
        &self,
        mut operation: F,
        messages: RunMessages,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Failure + Send + 'static,
    {
        let generation = Arc::new(AtomicU64::new(0));
        let feedback = self.feedback.clone();
        let current = Arc::clone(&generation);

        let result = self
            .retry
            .run_with_timeout(move || -> BoxFuture<'static, Result<T, E>> {
                let feedback = feedback.clone();
                let messages = messages.clone();
                let current = Arc::clone(&current);
                let mine = current.fetch_add(1, Ordering::SeqCst) + 1;
                let attempt = operation();
                async move {
                    feedback
                        .run_gated(move || attempt, messages, move || {
                            current.load(Ordering::SeqCst) == mine
                        })
                        .await
                }
                .boxed()
            })
            .await;

        if let Err(error) = &result {
            if error.is_timeout() {
                generation.fetch_add(1, Ordering::SeqCst);
                self.feedback.show_timeout(TimeoutSource::RetryCoordinator);
            }
        }
        result
    }
}
