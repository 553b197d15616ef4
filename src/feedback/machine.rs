//! Feedback state machine with watchdog and auto-revert timers.
//!
//! Every transition bumps an epoch. Timers remember the epoch they were
//! armed in and only act if no other transition happened since, so a stale
//! timer can never overwrite a newer status. Pending timers are also
//! aborted on every transition.
//!
//! The status is shared by every caller. Concurrent [`FeedbackMachine::run`]
//! calls overwrite each other's status: the last transition wins.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{FeedbackConfig, FeedbackState, FeedbackStatus};
use crate::error::{ErrorClassifier, Failure, SanitizedError, TimeoutSource};

/// Optional copy for [`FeedbackMachine::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunMessages {
    /// Shown as a success message when the operation resolves. Without it the
    /// machine resets to idle.
    pub success: Option<String>,
    /// Classified and shown instead of the raw failure when the operation fails.
    pub error: Option<String>,
}

impl RunMessages {
    /// Creates empty messages: reset on success, classified failure on error.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the success copy.
    pub fn with_success(mut self, text: impl Into<String>) -> Self {
        self.success = Some(text.into());
        self
    }

    /// Sets the error copy shown instead of the operation's own failure.
    pub fn with_error(mut self, text: impl Into<String>) -> Self {
        self.error = Some(text.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Watchdog,
    Revert,
}

#[derive(Debug, Default)]
struct Timers {
    epoch: u64,
    watchdog: Option<JoinHandle<()>>,
    revert: Option<JoinHandle<()>>,
}

impl Timers {
    fn abort_all(&mut self) {
        if let Some(handle) = self.watchdog.take() {
            handle.abort();
        }
        if let Some(handle) = self.revert.take() {
            handle.abort();
        }
    }
}

#[derive(Debug)]
struct Shared {
    config: FeedbackConfig,
    classifier: ErrorClassifier,
    state: watch::Sender<FeedbackState>,
    connectivity_timeout: watch::Sender<bool>,
    timers: Mutex<Timers>,
}

impl Shared {
    fn timers(&self) -> MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called by a timer task once its delay elapsed.
    fn fire(&self, epoch: u64, kind: TimerKind) -> bool {
        let mut timers = self.timers();
        if timers.epoch != epoch {
            debug!(?kind, epoch, "stale feedback timer ignored");
            return false;
        }
        timers.epoch += 1;
        // The firing task is finishing on its own; detach instead of aborting it.
        timers.watchdog = None;
        timers.revert = None;
        self.state.send_replace(FeedbackState::idle());
        if kind == TimerKind::Watchdog {
            self.connectivity_timeout.send_replace(true);
            warn!(
                timeout_ms = self.config.watchdog.as_millis() as u64,
                "loading watchdog expired, forcing idle"
            );
        } else {
            debug!("feedback message reverted to idle");
        }
        true
    }
}

/// The feedback state machine.
///
/// Cloning is cheap; all clones drive the same status.
#[derive(Debug, Clone)]
pub struct FeedbackMachine {
    shared: Arc<Shared>,
}

impl Default for FeedbackMachine {
    fn default() -> Self {
        Self::new(FeedbackConfig::default())
    }
}

impl FeedbackMachine {
    /// Creates an idle machine using the process-wide default classifier rules.
    pub fn new(config: FeedbackConfig) -> Self {
        Self::with_classifier(config, ErrorClassifier::new())
    }

    /// Creates an idle machine with a custom classifier.
    pub fn with_classifier(config: FeedbackConfig, classifier: ErrorClassifier) -> Self {
        let (state, _) = watch::channel(FeedbackState::idle());
        let (connectivity_timeout, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                config,
                classifier,
                state,
                connectivity_timeout,
                timers: Mutex::new(Timers::default()),
            }),
        }
    }

    /// Returns the timer settings.
    pub fn config(&self) -> &FeedbackConfig {
        &self.shared.config
    }

    /// Returns the classifier used for error and warning messages.
    pub fn classifier(&self) -> &ErrorClassifier {
        &self.shared.classifier
    }

    /// Returns a copy of the current state.
    pub fn state(&self) -> FeedbackState {
        self.shared.state.borrow().clone()
    }

    /// Returns the current status.
    pub fn status(&self) -> FeedbackStatus {
        self.shared.state.borrow().status
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<FeedbackState> {
        self.shared.state.subscribe()
    }

    /// Subscribes to the connectivity-timeout flag raised by the watchdog.
    pub fn connectivity_alert(&self) -> watch::Receiver<bool> {
        self.shared.connectivity_timeout.subscribe()
    }

    /// Returns true while a connectivity timeout is waiting for acknowledgment.
    pub fn connectivity_timed_out(&self) -> bool {
        *self.shared.connectivity_timeout.borrow()
    }

    /// Clears the connectivity-timeout flag. Returns whether it was set.
    pub fn acknowledge_connectivity_timeout(&self) -> bool {
        self.shared.connectivity_timeout.send_replace(false)
    }

    /// Enters `loading` and arms the watchdog. Returns the transition epoch.
    pub fn show_loading(&self) -> u64 {
        self.transition(
            FeedbackStatus::Loading,
            None,
            Some((TimerKind::Watchdog, self.shared.config.watchdog)),
        )
    }

    /// Shows a success message, reverting to idle after the display time.
    pub fn show_success(&self, text: impl Into<String>) {
        self.transition(
            FeedbackStatus::Success,
            Some(text.into()),
            Some((TimerKind::Revert, self.shared.config.success_display)),
        );
    }

    /// Classifies `failure` and shows it as an error.
    ///
    /// A failure code registered as safe in the classifier wins over
    /// message matching.
    pub fn show_error<E: Failure + ?Sized>(&self, failure: &E) -> SanitizedError {
        let sanitized = self.shared.classifier.classify_failure(failure);
        self.show_sanitized_error(sanitized)
    }

    /// Shows the fixed timeout copy for `source` as an error.
    pub fn show_timeout(&self, source: TimeoutSource) -> SanitizedError {
        self.show_sanitized_error(ErrorClassifier::timeout(source))
    }

    fn show_sanitized_error(&self, sanitized: SanitizedError) -> SanitizedError {
        self.transition(
            FeedbackStatus::Error,
            Some(sanitized.display_text.clone()),
            Some((TimerKind::Revert, self.shared.config.error_display)),
        );
        sanitized
    }

    /// Classifies `failure` and shows it as a warning.
    pub fn show_warning<E: Failure + ?Sized>(&self, failure: &E) -> SanitizedError {
        let sanitized = self.shared.classifier.classify_failure(failure);
        self.transition(
            FeedbackStatus::Warning,
            Some(sanitized.display_text.clone()),
            Some((TimerKind::Revert, self.shared.config.warning_display)),
        );
        sanitized
    }

    /// Forces idle and cancels any pending timer.
    pub fn reset(&self) {
        self.transition(FeedbackStatus::Idle, None, None);
    }

    /// Runs `operation` with automatic status transitions.
    ///
    /// The operation races an independent watchdog of the same duration as
    /// the loading watchdog. Whichever settles first governs the status:
    ///
    /// - Operation first: success message (or reset) on `Ok`, classified
    ///   error on `Err`.
    /// - Watchdog first: the status is forced to idle and the connectivity
    ///   flag is raised. The operation is still awaited, and its result is
    ///   returned to the caller, but it no longer changes the status.
    ///
    /// The watchdog never cancels the operation and never turns a success
    /// into an error for the caller.
    pub async fn run<T, E, F, Fut>(&self, operation: F, messages: RunMessages) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Failure,
    {
        self.run_gated(operation, messages, || true).await
    }

    /// Like [`FeedbackMachine::run`], but the operation's settlement only
    /// changes the status while `is_current` returns true.
    ///
    /// Used when someone else may stop waiting for the operation, such as
    /// the retry coordinator after a retry or abandon decision.
    pub async fn run_gated<T, E, F, Fut, G>(
        &self,
        operation: F,
        messages: RunMessages,
        is_current: G,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Failure,
        G: Fn() -> bool,
    {
        let epoch = self.show_loading();
        let started = Instant::now();

        let operation = operation();
        tokio::pin!(operation);
        let watchdog = tokio::time::sleep(self.shared.config.watchdog);
        tokio::pin!(watchdog);

        tokio::select! {
            biased;
            outcome = &mut operation => {
                if is_current() {
                    self.settle(&outcome, &messages);
                } else {
                    debug!(epoch, "caller stopped waiting, settlement ignored");
                }
                return outcome;
            }
            _ = &mut watchdog => {
                self.shared.fire(epoch, TimerKind::Watchdog);
            }
        }

        let outcome = operation.await;
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = outcome.is_ok(),
            "operation settled after watchdog, status left unchanged"
        );
        outcome
    }

    fn settle<T, E: Failure>(&self, outcome: &Result<T, E>, messages: &RunMessages) {
        match outcome {
            Ok(_) => match &messages.success {
                Some(text) => self.show_success(text.clone()),
                None => self.reset(),
            },
            Err(failure) => {
                let sanitized = match &messages.error {
                    Some(text) => self.show_error(text.as_str()),
                    None => self.show_error(failure),
                };
                debug!(category = %sanitized.category, "operation failed");
            }
        }
    }

    fn transition(
        &self,
        status: FeedbackStatus,
        message: Option<String>,
        timer: Option<(TimerKind, Duration)>,
    ) -> u64 {
        let mut timers = self.shared.timers();
        timers.epoch += 1;
        let epoch = timers.epoch;
        timers.abort_all();
        self.shared.state.send_replace(FeedbackState { status, message });
        debug!(%status, epoch, "feedback transition");

        if let Some((kind, delay)) = timer {
            let handle = self.spawn_timer(kind, delay, epoch);
            match kind {
                TimerKind::Watchdog => timers.watchdog = handle,
                TimerKind::Revert => timers.revert = handle,
            }
        }
        epoch
    }

    fn spawn_timer(&self, kind: TimerKind, delay: Duration, epoch: u64) -> Option<JoinHandle<()>> {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(?kind, "no async runtime available, feedback timer not armed");
                return None;
            }
        };
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = shared.upgrade() {
                shared.fire(epoch, kind);
            }
        }))
    }
}
