//! Session context: the observable credential store.
//!
//! A [`SessionContext`] is cheap to clone and is handed to both the request
//! coordinator and the live connection manager. State changes are published
//! through a `tokio::sync::watch` channel so either side can react to login
//! and logout without polling.
//!
//! Each transition has exactly one writer method:
//!
//! | Transition | Writer |
//! |------------|--------|
//! | login (password, register, OAuth) | [`SessionContext::login`] |
//! | logout | [`SessionContext::logout`] |
//! | silent renewal succeeded | [`SessionContext::renewal_succeeded`] |
//! | silent renewal failed | [`SessionContext::renewal_failed`] |
//! | credential expired locally | [`SessionContext::expire_if_stale`] |

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::credential::Credential;
use crate::traits::CredentialsProvider;

/// Snapshot of the session.
///
/// `is_authenticated` is true exactly when `credential` is present and was
/// not expired at the time of the last transition.
///
/// `session_id` changes on every login, logout, restore and expiry, but not
/// on renewal. Observers compare it to tell a user switch apart from a
/// refreshed credential, even when intermediate states were coalesced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub credential: Option<Credential>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub session_id: u64,
}

impl SessionState {
    fn with_credential(credential: Option<Credential>, session_id: u64) -> Self {
        let is_authenticated = credential.as_ref().is_some_and(|c| !c.is_expired());
        Self {
            credential: credential.filter(|_| is_authenticated),
            is_authenticated,
            is_loading: false,
            session_id,
        }
    }
}

/// Whether a transition starts a new session or keeps the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    NewSession,
    SameSession,
}

struct SessionInner {
    state: watch::Sender<SessionState>,
    store: Option<Arc<dyn CredentialsProvider>>,
}

/// Injectable, observable credential store.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<SessionInner>,
}

impl SessionContext {
    /// Create an unauthenticated, non-persistent session.
    pub fn new() -> Self {
        Self::build(SessionState::default(), None)
    }

    /// Create an unauthenticated session that persists through `store`.
    pub fn with_store(store: Arc<dyn CredentialsProvider>) -> Self {
        Self::build(SessionState::default(), Some(store))
    }

    /// Create a session already holding `credential` (not persisted).
    pub fn authenticated(credential: Credential) -> Self {
        Self::build(SessionState::with_credential(Some(credential), 0), None)
    }

    fn build(state: SessionState, store: Option<Arc<dyn CredentialsProvider>>) -> Self {
        let (state, _) = watch::channel(state);
        Self {
            inner: Arc::new(SessionInner { state, store }),
        }
    }

    /// Current state snapshot.
    pub fn snapshot(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().is_loading
    }

    /// Identifier of the current session. Unchanged by renewal.
    pub fn session_id(&self) -> u64 {
        self.inner.state.borrow().session_id
    }

    /// The held credential.
    ///
    /// A credential that expired while held is still returned: the server
    /// decides, and renewal needs the stale bearer. Use
    /// [`expire_if_stale`](Self::expire_if_stale) to end such a session locally.
    pub fn credential(&self) -> Option<Credential> {
        self.inner.state.borrow().credential.clone()
    }

    /// The held bearer string.
    pub fn access_token(&self) -> Option<String> {
        self.credential().map(|c| c.token().to_string())
    }

    /// Load a persisted credential, if any.
    ///
    /// An expired credential found on disk is discarded and cleared from the
    /// store. Returns whether the session ended up authenticated.
    pub async fn restore(&self) -> bool {
        let Some(store) = self.inner.store.clone() else {
            return self.is_authenticated();
        };

        self.inner.state.send_modify(|s| s.is_loading = true);

        let loaded = match store.load().await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(error = %e, "failed to load stored credential");
                None
            }
        };

        let restored = match loaded {
            Some(credential) if credential.is_expired() => {
                info!("stored credential has expired, discarding");
                if let Err(e) = store.clear().await {
                    warn!(error = %e, "failed to clear expired credential");
                }
                None
            }
            other => other,
        };

        let authenticated = self.apply(restored, Transition::NewSession).is_some();
        debug!(authenticated, "session restored");
        authenticated
    }

    /// Begin a session with a freshly issued credential.
    pub async fn login(&self, credential: Credential) {
        info!(subject = ?credential.subject(), "session started");
        self.replace(Some(credential), Transition::NewSession).await;
    }

    /// End the session.
    pub async fn logout(&self) {
        info!("session ended by logout");
        self.replace(None, Transition::NewSession).await;
    }

    /// Swap in the credential obtained by silent renewal.
    pub async fn renewal_succeeded(&self, credential: Credential) {
        debug!("session credential renewed");
        self.replace(Some(credential), Transition::SameSession).await;
    }

    /// Force the session to logged out after a failed renewal.
    pub async fn renewal_failed(&self) {
        warn!("credential renewal failed, session ended");
        self.replace(None, Transition::NewSession).await;
    }

    /// End the session if the held credential has expired.
    ///
    /// Returns true if a transition happened. The stored copy is left for the
    /// next [`restore`](Self::restore) to discard.
    pub fn expire_if_stale(&self) -> bool {
        let expired = self.inner.state.send_if_modified(|state| {
            let stale = state.credential.as_ref().is_some_and(|c| c.is_expired());
            if stale {
                *state = SessionState::with_credential(None, state.session_id.wrapping_add(1));
            }
            stale
        });
        if expired {
            info!("session credential expired");
        }
        expired
    }

    async fn replace(&self, credential: Option<Credential>, transition: Transition) {
        let saved = self.apply(credential, transition);
        self.persist(saved.as_ref()).await;
    }

    /// Publish a new state and return the credential it ended up holding.
    fn apply(&self, credential: Option<Credential>, transition: Transition) -> Option<Credential> {
        let mut held = None;
        self.inner.state.send_modify(|state| {
            let session_id = match transition {
                Transition::NewSession => state.session_id.wrapping_add(1),
                Transition::SameSession => state.session_id,
            };
            *state = SessionState::with_credential(credential, session_id);
            held = state.credential.clone();
        });
        held
    }

    async fn persist(&self, credential: Option<&Credential>) {
        let Some(store) = &self.inner.store else {
            return;
        };
        let result = match credential {
            Some(credential) => store.save(credential).await,
            None => store.clear().await,
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to persist session credential");
        }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("state", &*self.inner.state.borrow())
            .field("persistent", &self.inner.store.is_some())
            .finish()
    }
}
