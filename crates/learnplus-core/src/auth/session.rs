use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::api::{ApiClient, ApiError, AuthRejection, IssuedTokens};

use super::refresh::{ScheduledTask, DEFAULT_REFRESH_INTERVAL};
use super::storage::{SessionData, TokenStore};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Username and password required")]
    MissingCredentials,

    /// The backend refused the request; carries its message.
    #[error("{0}")]
    Rejected(String),

    #[error("Session expired - please sign in again")]
    SessionExpired {
        #[source]
        cause: Option<ApiError>,
    },

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl AuthError {
    /// Turn a failed sign-in/sign-up call into a user-facing error. Client
    /// errors become `Rejected` with the backend's message; transport and
    /// server failures pass through.
    fn from_api(e: ApiError, fallback: &str) -> Self {
        match e {
            ApiError::Unauthenticated(_) => {
                AuthError::Rejected("Invalid username or password".to_string())
            }
            ApiError::Validation(m) | ApiError::NotFound(m) | ApiError::Conflict(m) => {
                if m.is_empty() {
                    AuthError::Rejected(fallback.to_string())
                } else {
                    AuthError::Rejected(m)
                }
            }
            other => AuthError::Api(other),
        }
    }
}

/// Authentication state as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    SignedOut,
    SignedIn,
    /// Signed out because a refresh failed.
    Expired,
}

/// Snapshot of the current session.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    token: Option<String>,
    username: Option<String>,
}

impl Session {
    fn from_data(data: Option<&SessionData>) -> Self {
        Self {
            token: data.map(|d| d.token.clone()),
            username: data.and_then(|d| d.username.clone()),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .field("username", &self.username)
            .finish()
    }
}

#[derive(Default)]
struct SessionState {
    data: Option<SessionData>,
    /// Bumped on every token write. A refresh only lands if nothing else
    /// wrote since it read the refresh credential.
    generation: u64,
}

struct Inner {
    api: ApiClient,
    storage: Arc<dyn TokenStore>,
    refresh_interval: Duration,
    state: Mutex<SessionState>,
    status: watch::Sender<SessionStatus>,
    timer: Mutex<Option<ScheduledTask>>,
}

/// Owner of the process-wide session.
///
/// Clones share the same session. Every token change goes through the
/// state lock as one assignment (persisting to the token store under the
/// same lock), and the lock is never held across a network call.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    pub fn new(api: ApiClient, storage: Arc<dyn TokenStore>) -> Self {
        Self::with_refresh_interval(api, storage, DEFAULT_REFRESH_INTERVAL)
    }

    pub fn with_refresh_interval(
        api: ApiClient,
        storage: Arc<dyn TokenStore>,
        refresh_interval: Duration,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::SignedOut);
        Self {
            inner: Arc::new(Inner {
                api,
                storage,
                refresh_interval,
                state: Mutex::new(SessionState::default()),
                status,
                timer: Mutex::new(None),
            }),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    pub fn session(&self) -> Session {
        Session::from_data(self.state().data.as_ref())
    }

    pub fn token(&self) -> Option<String> {
        self.state().data.as_ref().map(|d| d.token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().data.is_some()
    }

    pub fn has_refresh_credential(&self) -> bool {
        self.state()
            .data
            .as_ref()
            .is_some_and(|d| d.refresh_token.is_some())
    }

    /// Whether the current access token is at least one refresh interval old.
    pub fn needs_refresh(&self) -> bool {
        self.state()
            .data
            .as_ref()
            .is_some_and(|d| d.is_older_than(self.inner.refresh_interval))
    }

    /// Refresh now if [`needs_refresh`](Self::needs_refresh) says so.
    /// Returns `Ok(None)` when the token is still fresh or there is no
    /// session.
    pub async fn refresh_if_stale(&self) -> Result<Option<Session>, AuthError> {
        if !self.needs_refresh() {
            return Ok(None);
        }
        debug!("Stored access token is stale, refreshing");
        self.refresh().await.map(Some)
    }

    /// Watch session transitions, including expiry from a failed refresh.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        *self.inner.status.borrow()
    }

    /// Load a persisted session, if any. Never contacts the backend.
    pub fn restore(&self) -> Option<Session> {
        let data = match self.inner.storage.get() {
            Ok(Some(data)) => data,
            Ok(None) => {
                debug!("No stored session");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Failed to load stored session");
                return None;
            }
        };
        debug!(age_minutes = data.age_minutes(), "Stored session found");

        let session = {
            let mut state = self.state();
            state.generation += 1;
            state.data = Some(data);
            Session::from_data(state.data.as_ref())
        };
        self.inner.status.send_replace(SessionStatus::SignedIn);
        self.start_refresh_timer();
        info!("Session restored");
        Some(session)
    }

    /// Register a new account. Does not sign in.
    pub async fn sign_up(&self, username: &str, password: &str) -> Result<String, AuthError> {
        validate_credentials(username, password)?;
        match self.inner.api.sign_up(username, password).await {
            Ok(message) => {
                info!(username, "Sign-up successful");
                Ok(message)
            }
            Err(e) => {
                error!(error = %e, "Sign-up failed");
                Err(AuthError::from_api(e, "Signup failed"))
            }
        }
    }

    pub async fn sign_in(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        validate_credentials(username, password)?;

        let tokens = match self.inner.api.sign_in(username, password).await {
            Ok(tokens) => tokens,
            Err(e) => {
                error!(error = %e, "Sign-in failed");
                return Err(AuthError::from_api(e, "Signin failed"));
            }
        };

        let data = SessionData::new(
            tokens.access_token,
            tokens.refresh_token,
            Some(username.to_string()),
        );
        let session = {
            let mut state = self.state();
            self.install(&mut state, data);
            Session::from_data(state.data.as_ref())
        };
        self.inner.status.send_replace(SessionStatus::SignedIn);
        self.start_refresh_timer();
        info!(username, "Sign-in successful");
        Ok(session)
    }

    /// Exchange the refresh credential for a new access token.
    ///
    /// Any failure signs the session out and returns `SessionExpired`. If a
    /// sign-in, sign-out or other refresh landed while this one was in
    /// flight, its outcome is discarded and the current session returned.
    pub async fn refresh(&self) -> Result<Session, AuthError> {
        let (generation, refresh_token) = {
            let state = self.state();
            (
                state.generation,
                state.data.as_ref().and_then(|d| d.refresh_token.clone()),
            )
        };

        let Some(refresh_token) = refresh_token else {
            info!("No refresh credential, signing out");
            self.expire(generation);
            return Err(AuthError::SessionExpired { cause: None });
        };

        match self.inner.api.refresh_token(&refresh_token).await {
            Ok(tokens) => Ok(self.apply_refresh(generation, tokens)),
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                if self.expire(generation) {
                    Err(AuthError::SessionExpired { cause: Some(e) })
                } else {
                    Ok(self.session())
                }
            }
        }
    }

    /// Clear the session. Always succeeds, with or without an active session.
    pub fn sign_out(&self) {
        {
            let mut state = self.state();
            state.generation += 1;
            state.data = None;
            self.persist_clear();
        }
        self.stop_refresh_timer();
        self.inner.status.send_replace(SessionStatus::SignedOut);
        info!("Signed out");
    }

    /// Stop background work without touching the stored session.
    pub fn shutdown(&self) {
        self.stop_refresh_timer();
        debug!("Session store shut down");
    }

    /// Whether the background refresh task is currently scheduled.
    pub fn refresh_scheduled(&self) -> bool {
        self.timer().as_ref().is_some_and(|t| !t.is_finished())
    }

    // ===== Internals =====

    fn state(&self) -> MutexGuard<'_, SessionState> {
        lock(&self.inner.state)
    }

    fn timer(&self) -> MutexGuard<'_, Option<ScheduledTask>> {
        lock(&self.inner.timer)
    }

    fn install(&self, state: &mut SessionState, data: SessionData) {
        if let Err(e) = self.inner.storage.set(&data) {
            warn!(error = %e, "Failed to save session");
        }
        state.generation += 1;
        state.data = Some(data);
    }

    fn persist_clear(&self) {
        if let Err(e) = self.inner.storage.clear() {
            warn!(error = %e, "Failed to clear stored session");
        }
    }

    fn apply_refresh(&self, generation: u64, tokens: IssuedTokens) -> Session {
        let mut state = self.state();
        if state.generation != generation {
            debug!("Session changed during refresh, discarding refreshed token");
            return Session::from_data(state.data.as_ref());
        }
        let Some(current) = state.data.as_ref() else {
            return Session::default();
        };
        // Keep the old refresh credential unless the backend rotated it
        let data = SessionData::new(
            tokens.access_token,
            tokens.refresh_token.or_else(|| current.refresh_token.clone()),
            current.username.clone(),
        );
        self.install(&mut state, data);
        info!("Access token refreshed");
        Session::from_data(state.data.as_ref())
    }

    /// Sign out after a failed refresh, unless the session was replaced in
    /// the meantime. Returns whether the session was expired.
    fn expire(&self, generation: u64) -> bool {
        let was_signed_in = {
            let mut state = self.state();
            if state.generation != generation {
                return false;
            }
            let was_signed_in = state.data.take().is_some();
            state.generation += 1;
            self.persist_clear();
            was_signed_in
        };
        self.stop_refresh_timer();
        if was_signed_in {
            self.inner.status.send_replace(SessionStatus::Expired);
            info!("Session expired");
        } else {
            self.inner.status.send_replace(SessionStatus::SignedOut);
        }
        true
    }

    fn start_refresh_timer(&self) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let task = ScheduledTask::every("token-refresh", self.inner.refresh_interval, move || {
            let weak = weak.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return false;
                };
                let store = SessionStore { inner };
                match store.refresh().await {
                    Ok(session) => session.is_authenticated(),
                    Err(_) => false,
                }
            }
        });
        // Replacing the handle stops any previous timer
        *self.timer() = task;
    }

    fn stop_refresh_timer(&self) {
        if let Some(task) = self.timer().take() {
            task.cancel();
        }
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("session", &self.session())
            .field("status", &self.status())
            .finish()
    }
}

fn validate_credentials(username: &str, password: &str) -> Result<(), AuthError> {
    if username.trim().is_empty() || password.is_empty() {
        return Err(AuthError::MissingCredentials);
    }
    Ok(())
}

/// Token mutations are plain assignments, so a poisoned lock still holds a
/// consistent value.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Map a missing session to the gateway's local authentication error.
pub(crate) fn require_token(store: &SessionStore) -> Result<String, ApiError> {
    store
        .token()
        .ok_or(ApiError::Unauthenticated(AuthRejection::MissingToken))
}
