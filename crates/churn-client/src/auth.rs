//! Session state shared by every view.

use std::sync::{Arc, Weak};

use churn_core::paths::AUTH_USER_KEY;
use churn_core::storage::{get_json, set_json};
use churn_core::types::{Session, User};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backend::Backend;
use crate::client::ApiClient;
use crate::{ApiError, Result};

// ─── AuthState ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated(Session),
    /// Routes like `Unauthenticated` but keeps the last login error.
    AuthFailed(ApiError),
}

impl AuthState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthState::Authenticated(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }

    pub fn last_error(&self) -> Option<&ApiError> {
        match self {
            AuthState::AuthFailed(e) => Some(e),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::Authenticating => "authenticating",
            AuthState::Authenticated(_) => "authenticated",
            AuthState::AuthFailed(_) => "auth_failed",
        }
    }
}

// ─── AuthContext ──────────────────────────────────────────────────────────

/// Owns the session and mediates login and logout.
///
/// Entering `Authenticated` persists `auth_token` and `auth_user`; leaving
/// it erases both. When the client drops its token after a rejected
/// request, the next [`state`](Self::state) read (or the task started by
/// [`spawn_watcher`](Self::spawn_watcher)) demotes the context to
/// `Unauthenticated`.
pub struct AuthContext<B> {
    client: Arc<ApiClient<B>>,
    state: watch::Sender<AuthState>,
}

impl<B: Backend> AuthContext<B> {
    /// A context with no session, ignoring storage.
    pub fn new(client: Arc<ApiClient<B>>) -> Self {
        let (state, _) = watch::channel(AuthState::Unauthenticated);
        Self { client, state }
    }

    /// Rebuild the session from durable storage without contacting the
    /// backend.
    ///
    /// Starts `Authenticated` only when both the token and a readable user
    /// record are stored; a lone half is erased.
    pub fn restore(client: Arc<ApiClient<B>>) -> Self {
        let ctx = Self::new(client);
        let token = ctx.client.token();
        let user = match get_json::<User>(ctx.client.storage().as_ref(), AUTH_USER_KEY) {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable stored user");
                None
            }
        };

        match (token, user) {
            (Some(token), Some(user)) => {
                tracing::debug!(user = %user.email, "restored session from storage");
                ctx.state
                    .send_replace(AuthState::Authenticated(Session { user, token }));
            }
            (None, None) => {}
            _ => {
                tracing::warn!("stored session is incomplete; clearing it");
                ctx.clear_stored_session();
            }
        }
        ctx
    }

    pub fn client(&self) -> &Arc<ApiClient<B>> {
        &self.client
    }

    /// Current state, after reconciling with the client's token.
    pub fn state(&self) -> AuthState {
        self.reconcile();
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn session(&self) -> Option<Session> {
        self.state().session().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    /// Log in and persist the session.
    ///
    /// On failure the session is cleared, the state becomes `AuthFailed`
    /// and the error is returned for the caller to display.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        self.state.send_replace(AuthState::Authenticating);

        let result = match self.client.login(email, password).await {
            Ok(session) => {
                match set_json(self.client.storage().as_ref(), AUTH_USER_KEY, &session.user) {
                    Ok(()) => Ok(session),
                    Err(e) => Err(ApiError::from(e)),
                }
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(session) => {
                self.state
                    .send_replace(AuthState::Authenticated(session.clone()));
                Ok(session)
            }
            Err(e) => {
                tracing::warn!(error = %e, "login failed");
                self.clear_stored_session();
                self.state.send_replace(AuthState::AuthFailed(e.clone()));
                Err(e)
            }
        }
    }

    /// End the session. Always lands in `Unauthenticated` with storage
    /// cleared, whatever the backend answers.
    pub async fn logout(&self) {
        if let Err(e) = self.client.logout().await {
            tracing::warn!(error = %e, "logout request failed; session cleared locally");
        }
        self.clear_stored_session();
        self.state.send_replace(AuthState::Unauthenticated);
    }

    /// Check a restored session with the backend.
    ///
    /// Returns `Ok(true)` when the token is accepted (refreshing the stored
    /// user record), `Ok(false)` when it was rejected or no session exists,
    /// and `Err` when the check itself failed, leaving the state unchanged.
    pub async fn validate_session(&self) -> Result<bool> {
        let Some(session) = self.session() else {
            return Ok(false);
        };
        match self.client.validate_session().await {
            Ok(user) => {
                if user != session.user {
                    if let Err(e) = set_json(self.client.storage().as_ref(), AUTH_USER_KEY, &user) {
                        tracing::warn!(error = %e, "could not persist refreshed user");
                    }
                    self.state.send_if_modified(|s| match s {
                        AuthState::Authenticated(current) if current.token == session.token => {
                            current.user = user;
                            true
                        }
                        _ => false,
                    });
                }
                Ok(true)
            }
            Err(ApiError::Authentication(reason)) => {
                tracing::info!(%reason, "stored session is no longer valid");
                self.reconcile();
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Demote to `Unauthenticated` if the client no longer holds this
    /// session's token. Returns true when a demotion happened.
    pub fn reconcile(&self) -> bool {
        let token = self.client.token();
        let demoted = self.state.send_if_modified(|s| match s {
            AuthState::Authenticated(session) if token.as_deref() != Some(&session.token) => {
                *s = AuthState::Unauthenticated;
                true
            }
            _ => false,
        });
        if demoted {
            tracing::info!("session token dropped; signed out");
            self.clear_stored_session();
        }
        demoted
    }

    /// Reconcile whenever the client's token changes.
    ///
    /// The task ends once the context is dropped and the token changes
    /// again; abort the handle on shutdown to stop it sooner.
    pub fn spawn_watcher(self: &Arc<Self>) -> JoinHandle<()>
    where
        B: 'static,
    {
        let weak: Weak<Self> = Arc::downgrade(self);
        let mut rx = self.client.subscribe_token();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let Some(ctx) = weak.upgrade() else {
                    break;
                };
                ctx.reconcile();
            }
        })
    }

    fn clear_stored_session(&self) {
        if self.client.token().is_some() {
            if let Err(e) = self.client.set_token(None) {
                tracing::error!(error = %e, "failed to clear stored token");
            }
        }
        if let Err(e) = self.client.storage().remove(AUTH_USER_KEY) {
            tracing::error!(error = %e, "failed to clear stored user");
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, Op};
    use churn_core::paths::AUTH_TOKEN_KEY;
    use churn_core::storage::{FileStorage, MemoryStorage, Storage};
    use std::time::Duration;
    use tempfile::TempDir;

    fn context_with(storage: Arc<dyn Storage>) -> AuthContext<MockBackend> {
        AuthContext::restore(Arc::new(ApiClient::new(MockBackend::default(), storage)))
    }

    fn fresh() -> AuthContext<MockBackend> {
        context_with(Arc::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn demo_login_authenticates() {
        let auth = fresh();
        let session = auth.login("demo@example.com", "password").await.unwrap();
        assert_eq!(session.user.email, "demo@example.com");
        assert!(!session.token.is_empty());
        assert!(auth.is_authenticated());
    }

    #[tokio::test]
    async fn bad_credentials_fail_with_authentication_error() {
        let auth = fresh();
        let err = auth.login("someone@example.com", "hunter2").await.unwrap_err();
        assert!(err.is_authentication());

        let state = auth.state();
        assert!(matches!(state, AuthState::AuthFailed(_)));
        assert!(!state.is_authenticated());
        assert_eq!(state.last_error(), Some(&err));
        assert_eq!(auth.client().token(), None);
    }

    #[tokio::test]
    async fn login_publishes_authenticating_then_authenticated() {
        let auth = fresh();
        let mut rx = auth.subscribe();
        auth.login("demo@example.com", "password").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_authenticated());
    }

    #[tokio::test]
    async fn session_survives_reload() {
        let dir = TempDir::new().unwrap();
        let storage = || -> Arc<dyn Storage> { Arc::new(FileStorage::in_state_dir(dir.path())) };

        let session = context_with(storage())
            .login("demo@example.com", "password")
            .await
            .unwrap();

        let reloaded = context_with(storage());
        assert_eq!(reloaded.state(), AuthState::Authenticated(session));
    }

    #[tokio::test]
    async fn login_recovers_from_corrupt_storage_file() {
        let dir = TempDir::new().unwrap();
        let storage = || -> Arc<dyn Storage> { Arc::new(FileStorage::in_state_dir(dir.path())) };
        std::fs::write(churn_core::paths::storage_path(dir.path()), "{not json").unwrap();

        let auth = context_with(storage());
        assert_eq!(auth.state(), AuthState::Unauthenticated);
        let session = auth.login("demo@example.com", "password").await.unwrap();

        let reloaded = context_with(storage());
        assert_eq!(reloaded.state(), AuthState::Authenticated(session));
    }

    #[test]
    fn reload_with_only_token_is_unauthenticated_and_clears_it() {
        let storage = Arc::new(MemoryStorage::with_entries([(AUTH_TOKEN_KEY, "orphan")]));
        let auth = context_with(storage.clone());
        assert_eq!(auth.state(), AuthState::Unauthenticated);
        assert!(storage.is_empty());
    }

    #[test]
    fn reload_with_only_user_is_unauthenticated_and_clears_it() {
        let storage = Arc::new(MemoryStorage::with_entries([(
            AUTH_USER_KEY,
            r#"{"id":"1","email":"a@b.c","name":"A","role":"admin"}"#,
        )]));
        let auth = context_with(storage.clone());
        assert_eq!(auth.state(), AuthState::Unauthenticated);
        assert!(storage.is_empty());
    }

    #[test]
    fn reload_with_corrupt_user_is_unauthenticated() {
        let storage = Arc::new(MemoryStorage::with_entries([
            (AUTH_TOKEN_KEY, "tok"),
            (AUTH_USER_KEY, "{not json"),
        ]));
        let auth = context_with(storage.clone());
        assert_eq!(auth.state(), AuthState::Unauthenticated);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn logout_clears_everything() {
        let storage = Arc::new(MemoryStorage::new());
        let auth = context_with(storage.clone());
        auth.login("demo@example.com", "password").await.unwrap();
        auth.logout().await;
        assert_eq!(auth.state(), AuthState::Unauthenticated);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn logout_clears_everything_when_network_fails() {
        let storage = Arc::new(MemoryStorage::new());
        let auth = context_with(storage.clone());
        auth.login("demo@example.com", "password").await.unwrap();
        auth.client()
            .backend()
            .fail(Op::Logout, ApiError::Network("unreachable".into()));

        auth.logout().await;
        assert_eq!(auth.state(), AuthState::Unauthenticated);
        assert!(storage.is_empty());
        assert_eq!(auth.client().backend().calls(Op::Logout), 1);
    }

    #[tokio::test]
    async fn rejected_request_demotes_session() {
        let storage = Arc::new(MemoryStorage::new());
        let auth = context_with(storage.clone());
        auth.login("demo@example.com", "password").await.unwrap();
        auth.client().backend().revoke_all();

        let err = auth.client().get_playbooks().await.unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(auth.state(), AuthState::Unauthenticated);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn watcher_demotes_without_a_state_read() {
        let auth = Arc::new(fresh());
        auth.login("demo@example.com", "password").await.unwrap();
        let mut rx = auth.subscribe();
        rx.borrow_and_update();
        let handle = auth.spawn_watcher();

        auth.client().backend().revoke_all();
        let _ = auth.client().get_overview().await;

        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("watcher did not publish")
            .unwrap();
        assert_eq!(*rx.borrow(), AuthState::Unauthenticated);
        handle.abort();
    }

    #[tokio::test]
    async fn validate_session_accepts_live_token() {
        let auth = fresh();
        auth.login("demo@example.com", "password").await.unwrap();
        assert!(auth.validate_session().await.unwrap());
        assert!(auth.is_authenticated());
    }

    #[tokio::test]
    async fn validate_session_demotes_revoked_token() {
        let dir = TempDir::new().unwrap();
        let storage = || -> Arc<dyn Storage> { Arc::new(FileStorage::in_state_dir(dir.path())) };
        context_with(storage())
            .login("demo@example.com", "password")
            .await
            .unwrap();

        // A new process trusts storage until validated.
        let reloaded = context_with(storage());
        assert!(reloaded.is_authenticated());
        reloaded.client().backend().revoke_all();

        assert!(!reloaded.validate_session().await.unwrap());
        assert_eq!(reloaded.state(), AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn validate_session_network_error_keeps_state() {
        let auth = fresh();
        auth.login("demo@example.com", "password").await.unwrap();
        auth.client()
            .backend()
            .fail(Op::CurrentUser, ApiError::Network("down".into()));
        assert!(auth.validate_session().await.is_err());
        assert!(auth.is_authenticated());
    }
}
