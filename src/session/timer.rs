//! Rolling inactivity window with forced logout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::{InputEvent, SessionConfig, SessionHost};

/// The activity listener of one active session.
struct ActiveSession {
    id: u64,
    activity: watch::Sender<Instant>,
    task: JoinHandle<()>,
}

struct Shared {
    config: SessionConfig,
    host: Arc<dyn SessionHost>,
    next_session_id: AtomicU64,
    active: Mutex<Option<ActiveSession>>,
    logouts: watch::Sender<u64>,
    last_logout: Mutex<Option<DateTime<Utc>>>,
}

impl Shared {
    fn active(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs the logout sequence if session `id` is still the active one.
    async fn expire(&self, id: u64) {
        let expired = {
            let mut active = self.active();
            if active.as_ref().map(|session| session.id) == Some(id) {
                active.take()
            } else {
                None
            }
        };
        if expired.is_none() {
            debug!(session = id, "session already ended, skipping logout");
            return;
        }

        info!(
            session = id,
            window_secs = self.config.inactivity_window.as_secs(),
            "session inactive, forcing logout"
        );

        if let Err(error) = self.host.invalidate_remote_session().await {
            warn!(%error, "remote session invalidation failed, continuing logout");
        }
        if let Err(error) = self.host.clear_persisted_state().await {
            warn!(%error, "clearing persisted state failed, continuing logout");
        }
        self.host.reset_profile().await;
        self.host.redirect(&self.config.login_route).await;

        *self
            .last_logout
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        self.logouts.send_modify(|count| *count += 1);
    }
}

/// Process-wide inactivity watchdog.
///
/// [`SessionTimer::start`] subscribes the activity listener when a session
/// is established; [`SessionTimer::end`] unsubscribes it on a regular
/// sign-out. Input recorded while no session is active is ignored.
#[derive(Clone)]
pub struct SessionTimer {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SessionTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTimer")
            .field("config", &self.shared.config)
            .field("active", &self.is_active())
            .finish()
    }
}

impl SessionTimer {
    /// Creates an inactive timer acting on `host`.
    pub fn new(config: SessionConfig, host: Arc<dyn SessionHost>) -> Self {
        let (logouts, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                config,
                host,
                next_session_id: AtomicU64::new(1),
                active: Mutex::new(None),
                logouts,
                last_logout: Mutex::new(None),
            }),
        }
    }

    /// Returns the timer settings.
    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Starts the inactivity window for a newly established session.
    ///
    /// Returns false if a session is already active or no tokio runtime is
    /// available to run the window.
    pub fn start(&self) -> bool {
        let mut active = self.shared.active();
        if active.is_some() {
            return false;
        }
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("no async runtime available, session timer not started");
                return false;
            }
        };

        let id = self.shared.next_session_id.fetch_add(1, Ordering::Relaxed);
        let (activity, receiver) = watch::channel(Instant::now());
        let window = self.shared.config.inactivity_window;
        let shared = Arc::downgrade(&self.shared);
        let task = runtime.spawn(watch_inactivity(id, window, receiver, shared));

        *active = Some(ActiveSession { id, activity, task });
        info!(session = id, "session started, inactivity window armed");
        true
    }

    /// Records a global input event. Returns true if it reset the window.
    pub fn record_input(&self, event: InputEvent) -> bool {
        if !self.shared.config.is_qualifying(event) {
            trace!(?event, "input does not count as presence");
            return false;
        }
        match self.shared.active().as_ref() {
            Some(session) => {
                session.activity.send_replace(Instant::now());
                true
            }
            None => false,
        }
    }

    /// Ends the session without a forced logout. Returns false if none was active.
    pub fn end(&self) -> bool {
        let ended = self.shared.active().take();
        match ended {
            Some(session) => {
                session.task.abort();
                info!(session = session.id, "session ended, activity listener detached");
                true
            }
            None => false,
        }
    }

    /// Returns true while a session is active.
    pub fn is_active(&self) -> bool {
        self.shared.active().is_some()
    }

    /// Subscribes to the number of forced logouts so far.
    pub fn logouts(&self) -> watch::Receiver<u64> {
        self.shared.logouts.subscribe()
    }

    /// Returns the number of forced logouts so far.
    pub fn logout_count(&self) -> u64 {
        *self.shared.logouts.borrow()
    }

    /// Returns when the last forced logout completed.
    pub fn last_logout_at(&self) -> Option<DateTime<Utc>> {
        *self
            .shared
            .last_logout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

async fn watch_inactivity(
    id: u64,
    window: std::time::Duration,
    mut activity: watch::Receiver<Instant>,
    shared: Weak<Shared>,
) {
    let mut deadline = *activity.borrow_and_update() + window;
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,
            changed = activity.changed() => {
                if changed.is_err() {
                    // Sender dropped: the session ended.
                    return;
                }
                deadline = *activity.borrow_and_update() + window;
                trace!(session = id, "inactivity window reset");
            }
        }
    }

    if let Some(shared) = shared.upgrade() {
        shared.expire(id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::session::{HostAction, MemorySessionHost};

    const WINDOW: Duration = Duration::from_millis(100);

    fn timer_with_host() -> (SessionTimer, MemorySessionHost) {
        let host = MemorySessionHost::new()
            .with_entry("access_token", "secret")
            .with_entry("cookie:sid", "42")
            .with_profile("member-17");
        let config = SessionConfig::new().with_inactivity_window(WINDOW);
        (SessionTimer::new(config, Arc::new(host.clone())), host)
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_regular_input_prevents_logout() {
        let (timer, host) = timer_with_host();
        assert!(timer.start());

        for _ in 0..20 {
            sleep_ms(90).await;
            assert!(timer.record_input(InputEvent::KeyDown));
        }

        assert_eq!(timer.logout_count(), 0);
        assert!(timer.is_active());
        assert!(host.actions().is_empty());
        assert!(timer.end());
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_gap_forces_logout_once() {
        let (timer, host) = timer_with_host();
        timer.start();

        sleep_ms(50).await;
        timer.record_input(InputEvent::PointerDown);
        sleep_ms(151).await;

        assert_eq!(timer.logout_count(), 1);
        assert!(!timer.is_active());
        assert!(timer.last_logout_at().is_some());
        assert_eq!(
            host.actions(),
            vec![
                HostAction::InvalidateRemote,
                HostAction::ClearPersisted,
                HostAction::ResetProfile,
                HostAction::Redirect("/auth".to_string()),
            ]
        );
        assert_eq!(host.entries_at_redirect(), Some(0));
        assert!(host.profile().is_none());

        // No session, no second logout.
        assert!(!timer.record_input(InputEvent::KeyDown));
        sleep_ms(1_000).await;
        assert_eq!(timer.logout_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_activity_does_not_reset_window() {
        let (timer, _host) = timer_with_host();
        timer.start();

        sleep_ms(60).await;
        assert!(!timer.record_input(InputEvent::Background));
        assert!(!timer.record_input(InputEvent::PointerMove));
        sleep_ms(41).await;

        assert_eq!(timer.logout_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_detaches_without_logout() {
        let (timer, host) = timer_with_host();
        timer.start();
        sleep_ms(50).await;
        assert!(timer.end());
        assert!(!timer.end());

        sleep_ms(500).await;
        assert_eq!(timer.logout_count(), 0);
        assert!(host.actions().is_empty());
        assert_eq!(host.entry_count(), 2);
    }

    #[test]
    fn test_start_outside_runtime_is_rejected() {
        let (timer, _host) = timer_with_host();
        assert!(!timer.start());
        assert!(!timer.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_rejected() {
        let (timer, _host) = timer_with_host();
        assert!(timer.start());
        assert!(!timer.start());
        timer.end();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_invalidation_still_clears_and_redirects() {
        let host = MemorySessionHost::new()
            .with_entry("access_token", "secret")
            .with_failing_invalidation();
        let timer = SessionTimer::new(
            SessionConfig::new()
                .with_inactivity_window(WINDOW)
                .with_login_route("/login"),
            Arc::new(host.clone()),
        );
        timer.start();
        sleep_ms(101).await;

        assert_eq!(timer.logout_count(), 1);
        assert_eq!(host.entry_count(), 0);
        assert_eq!(
            host.actions().last(),
            Some(&HostAction::Redirect("/login".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_session_after_logout() {
        let (timer, _host) = timer_with_host();
        let mut logouts = timer.logouts();
        timer.start();

        logouts.changed().await.unwrap();
        assert_eq!(*logouts.borrow_and_update(), 1);

        assert!(timer.start());
        logouts.changed().await.unwrap();
        assert_eq!(*logouts.borrow_and_update(), 2);
    }
}
