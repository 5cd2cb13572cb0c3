use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::auth::SessionToken;
use crate::error::{AuthError, SessionError};

use super::storage::SessionStorage;

/// The transport the session machine reaches the server through. The
/// credential gateway implements it directly for in-process hosts.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str)
        -> Result<SessionToken, AuthError>;
    async fn invalidate(&self, token: &str) -> Result<(), AuthError>;
}

/// Views the client can be navigated to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Workspace,
    Login,
}

/// Navigation side effect sink.
pub trait Navigator: Send + Sync {
    fn goto(&self, route: Route);
}

/// Whether a user is signed in, as far as the client knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated { username: String },
    /// Transient: collapses back to `Unauthenticated` once observed.
    AuthenticationFailed,
}

/// Client-resident authentication state machine.
///
/// This is the single source of "is a user logged in"; nothing else in a
/// client inspects tokens directly. It is a cache of server-asserted
/// identity, not a storage entity.
pub struct SessionMachine<A, S, N> {
    api: A,
    storage: S,
    navigator: N,
    state: SessionState,
}

impl<A, S, N> SessionMachine<A, S, N>
where
    A: AuthApi + Clone + Send + Sync + 'static,
    S: SessionStorage,
    N: Navigator,
{
    pub fn new(api: A, storage: S, navigator: N) -> Self {
        Self {
            api,
            storage,
            navigator,
            state: SessionState::Unauthenticated,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Authenticated { .. })
    }

    pub fn username(&self) -> Option<&str> {
        match &self.state {
            SessionState::Authenticated { username } => Some(username),
            _ => None,
        }
    }

    /// Read the current state. Observing a failed attempt reverts it to
    /// `Unauthenticated`; the failure is fully recoverable by retrying.
    pub fn observe(&mut self) -> SessionState {
        let state = self.state.clone();
        if state == SessionState::AuthenticationFailed {
            self.state = SessionState::Unauthenticated;
        }
        state
    }

    /// Attempt a login. At most one attempt is in flight; a second call
    /// while `Authenticating` is rejected rather than interleaved.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), SessionError> {
        if self.state == SessionState::Authenticating {
            return Err(SessionError::LoginInFlight);
        }
        self.state = SessionState::Authenticating;
        match self.api.authenticate(username, password).await {
            Ok(session) => {
                self.storage.write(&session);
                info!(username = %session.username, "session established");
                self.state = SessionState::Authenticated {
                    username: session.username,
                };
                self.navigator.goto(Route::Workspace);
            }
            Err(error) => {
                warn!(%error, "authentication failed");
                self.state = SessionState::AuthenticationFailed;
            }
        }
        Ok(())
    }

    /// Log out. Server-side revocation is fire-and-forget: the local state
    /// transition and navigation never wait on the network, and a failure
    /// over there is swallowed.
    pub fn logout(&mut self) {
        if let Some(session) = self.storage.read() {
            let api = self.api.clone();
            tokio::spawn(async move {
                if let Err(error) = api.invalidate(&session.token).await {
                    warn!(%error, "server-side invalidation failed; local session cleared anyway");
                }
            });
        }
        self.storage.clear();
        self.navigator.goto(Route::Login);
        self.state = SessionState::Unauthenticated;
    }

    /// Rebuild authenticated state at client startup from the scoped
    /// storage alone. Purely local: a cached, well-formed, unexpired
    /// session is trusted without a round trip, so a reload never
    /// re-prompts while the session lives.
    pub fn recover_session(&mut self, now: OffsetDateTime) {
        match self.storage.read() {
            Some(session)
                if !session.token.is_empty()
                    && !session.username.is_empty()
                    && session.expires_at > now =>
            {
                info!(username = %session.username, "session recovered from storage");
                self.state = SessionState::Authenticated {
                    username: session.username,
                };
            }
            _ => {
                self.storage.clear();
                self.navigator.goto(Route::Login);
                self.state = SessionState::Unauthenticated;
            }
        }
    }
}
