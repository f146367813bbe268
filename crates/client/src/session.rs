//! Session lifecycle: the identity state machine and its invalidation
//! plumbing.
//!
//! [`SessionSignals`] owns the credential store, the observable
//! [`SessionState`], and the navigation channel. Its `invalidate` routine is
//! the single local-logout path, shared by explicit logout and by the
//! pipeline's reaction to a superseded session - the two cannot drift apart
//! because they are the same code.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{instrument, warn};

use shopfront_core::User;

use crate::credentials::{CredentialStore, SessionToken};
use crate::error::ApiError;
use crate::http::ApiClient;

/// Capacity of the navigation broadcast channel.
const NAVIGATION_CHANNEL_CAPACITY: usize = 16;

/// Where the session machinery directs the consumer next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Show the login surface.
    Login {
        /// Set when a newer login on another device revoked this client's
        /// token, so the login surface can explain why the user is here.
        session_expired: bool,
    },
}

/// Identity state, observable through [`SessionManager::subscribe`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Startup: credential presence not yet checked.
    #[default]
    Unresolved,
    /// A stored credential exists and the identity fetch is in flight.
    Resolving,
    /// Logged in.
    Authenticated(User),
    /// No active session.
    Anonymous,
}

impl SessionState {
    /// The authenticated identity, if any.
    #[must_use]
    pub const fn user(&self) -> Option<&User> {
        match self {
            Self::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    /// Whether a user is logged in.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// Shared plumbing between the request pipeline and the session manager.
pub struct SessionSignals {
    store: Arc<dyn CredentialStore>,
    state: watch::Sender<SessionState>,
    navigation: broadcast::Sender<Navigation>,
}

impl SessionSignals {
    /// Create signals over a credential store.
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::Unresolved);
        let (navigation, _) = broadcast::channel(NAVIGATION_CHANNEL_CAPACITY);
        Arc::new(Self {
            store,
            state,
            navigation,
        })
    }

    pub(crate) fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub(crate) fn set_state(&self, next: SessionState) {
        self.state.send_replace(next);
    }

    pub(crate) fn publish(&self, navigation: Navigation) {
        // A send error only means nobody is subscribed right now.
        let _ = self.navigation.send(navigation);
    }

    /// Local logout: clear the credential, demote to `Anonymous`, and direct
    /// the consumer to the login surface.
    ///
    /// Called by [`SessionManager::logout`] and by the pipeline when a
    /// request is rejected with a superseded session.
    pub(crate) fn invalidate(&self, session_expired: bool) {
        self.store.clear();
        self.set_state(SessionState::Anonymous);
        self.publish(Navigation::Login { session_expired });
    }

    /// Observe session state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Observe navigation requests.
    #[must_use]
    pub fn navigation(&self) -> broadcast::Receiver<Navigation> {
        self.navigation.subscribe()
    }

    /// Snapshot of the current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Raw success payload of the login endpoint, returned to the caller for
/// follow-on UI actions.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    /// The issued session token. Already persisted by the time the caller
    /// sees this.
    pub token: String,
    /// The authenticated identity.
    pub user: User,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

/// Success payload of the registration endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    /// The created account. Registration does not log the user in.
    pub user: User,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    user: User,
}

/// Owns the identity state machine and drives login, registration, logout,
/// and startup re-hydration.
///
/// Cheaply cloneable; all clones share one state machine.
#[derive(Clone)]
pub struct SessionManager {
    api: ApiClient,
    signals: Arc<SessionSignals>,
}

impl SessionManager {
    /// Create a manager over the shared signals and pipeline.
    #[must_use]
    pub const fn new(api: ApiClient, signals: Arc<SessionSignals>) -> Self {
        Self { api, signals }
    }

    /// Re-hydrate the session at startup.
    ///
    /// With no stored credential this resolves to `Anonymous` without any
    /// network call. With one, the identity is fetched through the pipeline;
    /// any failure discards the credential and resolves to `Anonymous`.
    #[instrument(skip(self))]
    pub async fn resolve(&self) {
        if self.signals.store().get().is_none() {
            self.signals.set_state(SessionState::Anonymous);
            return;
        }

        self.signals.set_state(SessionState::Resolving);
        match self.api.get::<MeResponse>("/users/me").await {
            Ok(me) => {
                self.signals.set_state(SessionState::Authenticated(me.user));
            }
            Err(err) => {
                warn!(error = %err, "identity fetch failed, discarding stored credential");
                self.signals.store().clear();
                self.signals.set_state(SessionState::Anonymous);
            }
        }
    }

    /// Log in with username and password.
    ///
    /// On success the returned token is persisted and the state becomes
    /// `Authenticated`. Failures - notably
    /// [`ApiError::ConcurrentSessionConflict`] - are propagated unchanged,
    /// leave the state `Anonymous`, and are never retried here.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`] from the pipeline.
    #[instrument(skip(self, password), fields(username = %username))]
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let response: LoginResponse = self
            .api
            .post("/users/login", &LoginRequest { username, password })
            .await?;

        self.signals.store().set(&SessionToken::new(response.token.clone()));
        self.signals
            .set_state(SessionState::Authenticated(response.user.clone()));
        Ok(response)
    }

    /// Register a new account.
    ///
    /// Registration does not create a session; callers chain
    /// [`login`](Self::login) afterwards to complete the flow.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`] from the pipeline.
    #[instrument(skip(self, password), fields(username = %username))]
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<RegisterResponse, ApiError> {
        self.api
            .post(
                "/users",
                &RegisterRequest {
                    username,
                    email,
                    password,
                },
            )
            .await
    }

    /// Log out.
    ///
    /// The server-side call is best effort: its failure is logged and
    /// swallowed, and the local cleanup runs unconditionally - logout is a
    /// local guarantee, not contingent on server acknowledgment.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        match self.api.post_empty("/users/logout").await {
            Ok(()) => {}
            // The pipeline already ran the identical cleanup, with the
            // session-expired indicator set.
            Err(ApiError::SessionSuperseded) => return,
            Err(err) => {
                warn!(error = %err, "server logout failed, continuing with local cleanup");
            }
        }
        self.signals.invalidate(false);
    }

    /// Snapshot of the current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.signals.state()
    }

    /// Observe session state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.signals.subscribe()
    }

    /// Observe navigation requests (login redirects).
    #[must_use]
    pub fn navigation(&self) -> broadcast::Receiver<Navigation> {
        self.signals.navigation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use shopfront_core::UserId;

    #[test]
    fn test_invalidate_clears_store_and_demotes_state() {
        let store = Arc::new(MemoryCredentialStore::new());
        store.set(&SessionToken::new("tok-1"));
        let signals = SessionSignals::new(store.clone());
        let mut navigation = signals.navigation();

        signals.invalidate(true);

        assert!(store.get().is_none());
        assert_eq!(signals.state(), SessionState::Anonymous);
        assert_eq!(
            navigation.try_recv().expect("navigation published"),
            Navigation::Login {
                session_expired: true
            }
        );
    }

    #[test]
    fn test_invalidate_is_idempotent() {
        let signals = SessionSignals::new(Arc::new(MemoryCredentialStore::new()));
        signals.invalidate(false);
        signals.invalidate(false);
        assert_eq!(signals.state(), SessionState::Anonymous);
    }

    #[test]
    fn test_session_state_accessors() {
        let user = User {
            id: UserId::from("u-1"),
            username: "alice".to_string(),
            email: None,
        };
        let state = SessionState::Authenticated(user.clone());
        assert!(state.is_authenticated());
        assert_eq!(state.user(), Some(&user));
        assert!(!SessionState::Anonymous.is_authenticated());
        assert_eq!(SessionState::Unresolved.user(), None);
    }
}
