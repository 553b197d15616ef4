//! The environment a forced logout acts on.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::SessionError;

/// Side effects of a forced logout.
///
/// Implemented by the embedding application: the remote auth client, the
/// persisted key/value stores and cookies, the profile cache and the router.
#[async_trait]
pub trait SessionHost: Send + Sync {
    /// Invalidates the session on the remote side.
    async fn invalidate_remote_session(&self) -> Result<(), SessionError>;

    /// Clears every externally visible persisted key/value entry and cookie.
    async fn clear_persisted_state(&self) -> Result<(), SessionError>;

    /// Drops the in-memory profile and session state.
    async fn reset_profile(&self);

    /// Navigates to `route`, discarding the current view.
    async fn redirect(&self, route: &str);
}

/// One recorded call on a [`MemorySessionHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction {
    InvalidateRemote,
    ClearPersisted,
    ResetProfile,
    Redirect(String),
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, String>,
    profile: Option<String>,
    actions: Vec<HostAction>,
    entries_at_redirect: Option<usize>,
}

/// An in-memory [`SessionHost`] that records every call.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionHost {
    state: Arc<Mutex<MemoryState>>,
    fail_invalidation: bool,
}

impl MemorySessionHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a persisted entry.
    pub fn with_entry(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.lock().entries.insert(key.into(), value.into());
        self
    }

    /// Seeds the in-memory profile.
    pub fn with_profile(self, profile: impl Into<String>) -> Self {
        self.lock().profile = Some(profile.into());
        self
    }

    /// Makes remote invalidation fail, as when the network is down.
    pub fn with_failing_invalidation(mut self) -> Self {
        self.fail_invalidation = true;
        self
    }

    /// Returns the recorded calls in order.
    pub fn actions(&self) -> Vec<HostAction> {
        self.lock().actions.clone()
    }

    /// Returns the number of persisted entries.
    pub fn entry_count(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns the in-memory profile.
    pub fn profile(&self) -> Option<String> {
        self.lock().profile.clone()
    }

    /// Number of persisted entries that were still present when the last redirect happened.
    pub fn entries_at_redirect(&self) -> Option<usize> {
        self.lock().entries_at_redirect
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionHost for MemorySessionHost {
    async fn invalidate_remote_session(&self) -> Result<(), SessionError> {
        self.lock().actions.push(HostAction::InvalidateRemote);
        if self.fail_invalidation {
            return Err(SessionError::RemoteInvalidation(
                "remote auth service unreachable".to_string(),
            ));
        }
        Ok(())
    }

    async fn clear_persisted_state(&self) -> Result<(), SessionError> {
        let mut state = self.lock();
        state.actions.push(HostAction::ClearPersisted);
        state.entries.clear();
        Ok(())
    }

    async fn reset_profile(&self) {
        let mut state = self.lock();
        state.actions.push(HostAction::ResetProfile);
        state.profile = None;
    }

    async fn redirect(&self, route: &str) {
        let mut state = self.lock();
        state.entries_at_redirect = Some(state.entries.len());
        state.actions.push(HostAction::Redirect(route.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_host_records_calls() {
        let host = MemorySessionHost::new()
            .with_entry("sb-access-token", "abc")
            .with_entry("theme", "dark")
            .with_profile("ana");
        assert_eq!(host.entry_count(), 2);

        host.invalidate_remote_session().await.unwrap();
        host.clear_persisted_state().await.unwrap();
        host.reset_profile().await;
        host.redirect("/auth").await;

        assert_eq!(host.entry_count(), 0);
        assert!(host.profile().is_none());
        assert_eq!(host.entries_at_redirect(), Some(0));
        assert_eq!(
            host.actions(),
            vec![
                HostAction::InvalidateRemote,
                HostAction::ClearPersisted,
                HostAction::ResetProfile,
                HostAction::Redirect("/auth".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_invalidation() {
        let host = MemorySessionHost::new().with_failing_invalidation();
        let result = host.invalidate_remote_session().await;
        assert!(matches!(result, Err(SessionError::RemoteInvalidation(_))));
    }
}
