//! Retry coordinator with a single modal prompt slot.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use super::{RetryConfig, RetryDecision, RetryError, RetryPrompt};

#[derive(Debug)]
struct PendingPrompt {
    id: u64,
    decision: oneshot::Sender<RetryDecision>,
}

#[derive(Debug)]
struct Shared {
    config: RetryConfig,
    next_prompt_id: AtomicU64,
    slot: Mutex<Option<PendingPrompt>>,
    view: watch::Sender<Option<RetryPrompt>>,
}

impl Shared {
    fn slot(&self) -> MutexGuard<'_, Option<PendingPrompt>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clears prompt `id` if it is still the pending one.
    fn withdraw_prompt(&self, id: u64) -> bool {
        let mut slot = self.slot();
        if slot.as_ref().map(|pending| pending.id) == Some(id) {
            *slot = None;
            self.view.send_replace(None);
            true
        } else {
            false
        }
    }
}

/// Withdraws a prompt when its waiter goes away, including when the
/// `run_with_timeout` future is dropped mid-wait.
struct PromptGuard {
    shared: Arc<Shared>,
    id: u64,
}

impl Drop for PromptGuard {
    fn drop(&mut self) {
        if self.shared.withdraw_prompt(self.id) {
            debug!(prompt = self.id, "retry prompt withdrawn");
        }
    }
}

/// Wraps calls with a long timeout and a user decision on expiry.
///
/// Cloning is cheap; clones share the prompt slot.
#[derive(Debug, Clone)]
pub struct RetryCoordinator {
    shared: Arc<Shared>,
}

impl Default for RetryCoordinator {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryCoordinator {
    pub fn new(config: RetryConfig) -> Self {
        let (view, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                config,
                next_prompt_id: AtomicU64::new(1),
                slot: Mutex::new(None),
                view,
            }),
        }
    }

    /// Returns the coordinator settings.
    pub fn config(&self) -> &RetryConfig {
        &self.shared.config
    }

    /// Returns the pending prompt, if any.
    pub fn pending_prompt(&self) -> Option<RetryPrompt> {
        self.shared.view.borrow().clone()
    }

    /// Subscribes to prompt changes.
    pub fn prompts(&self) -> watch::Receiver<Option<RetryPrompt>> {
        self.shared.view.subscribe()
    }

    /// Answers the pending prompt. Returns false if no prompt was pending.
    pub fn decide(&self, decision: RetryDecision) -> bool {
        let pending = self.shared.slot().take();
        match pending {
            Some(pending) => {
                self.shared.view.send_replace(None);
                info!(prompt = pending.id, ?decision, "retry prompt answered");
                // The waiter may have settled in the meantime; nothing to do then.
                let _ = pending.decision.send(decision);
                true
            }
            None => false,
        }
    }

    /// Starts a fresh attempt for the pending call.
    pub fn retry(&self) -> bool {
        self.decide(RetryDecision::Retry)
    }

    /// Stops waiting for the pending call. The call itself keeps running.
    pub fn abandon(&self) -> bool {
        self.decide(RetryDecision::Abandon)
    }

    /// Runs `operation` under the attempt timeout.
    ///
    /// If an attempt settles before its timer, its result is returned as is.
    /// Otherwise a [`RetryPrompt`] is published and the attempt stays live:
    ///
    /// - if the attempt settles before the user answers, the prompt is
    ///   withdrawn and the result returned;
    /// - on [`RetryDecision::Retry`] a new attempt starts with a fresh timer,
    ///   and its outcome becomes the outcome of this call;
    /// - on [`RetryDecision::Abandon`] this call fails with
    ///   [`RetryError::Abandoned`].
    ///
    /// Timed out attempts that lose are detached, not cancelled; their late
    /// results are discarded. Each attempt runs as its own task, so the
    /// future must be `Send + 'static`. A panicking attempt resumes the panic
    /// in the caller.
    pub async fn run_with_timeout<T, E, F, Fut>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let timeout = self.shared.config.attempt_timeout;
        let policy = self.shared.config.policy();
        let mut attempt: u32 = 1;

        loop {
            let mut task: JoinHandle<Result<T, E>> = tokio::spawn(operation());

            if let Ok(joined) = tokio::time::timeout(timeout, &mut task).await {
                return settled(joined);
            }

            warn!(
                attempt,
                timeout_ms = timeout.as_millis() as u64,
                "attempt timed out"
            );

            if !policy.allows_retry(attempt - 1) {
                warn!(attempt, "retry limit reached, giving up");
                return Err(RetryError::RetriesExhausted { attempts: attempt });
            }

            let (prompt_id, decision) = self.open_prompt(attempt);
            let _guard = PromptGuard {
                shared: Arc::clone(&self.shared),
                id: prompt_id,
            };

            tokio::select! {
                biased;
                joined = &mut task => {
                    debug!(attempt, "attempt settled while prompt was pending");
                    return settled(joined);
                }
                answer = decision => match answer {
                    Ok(RetryDecision::Retry) => {
                        attempt += 1;
                        debug!(attempt, "retrying after timeout");
                    }
                    Ok(RetryDecision::Abandon) => {
                        return Err(RetryError::Abandoned);
                    }
                    Err(_) => {
                        debug!(prompt = prompt_id, "prompt replaced, caller abandoned");
                        return Err(RetryError::Abandoned);
                    }
                },
            }
        }
    }

    fn open_prompt(&self, attempt: u32) -> (u64, oneshot::Receiver<RetryDecision>) {
        let id = self.shared.next_prompt_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        let mut slot = self.shared.slot();
        if let Some(replaced) = slot.replace(PendingPrompt {
            id,
            decision: sender,
        }) {
            info!(replaced = replaced.id, prompt = id, "retry prompt replaced");
        }
        self.shared
            .view
            .send_replace(Some(RetryPrompt { id, attempt }));
        (id, receiver)
    }
}

fn settled<T, E>(joined: Result<Result<T, E>, JoinError>) -> Result<T, RetryError<E>> {
    match joined {
        Ok(outcome) => outcome.map_err(RetryError::Operation),
        Err(error) if error.is_panic() => std::panic::resume_unwind(error.into_panic()),
        Err(_) => Err(RetryError::Abandoned),
    }
}
