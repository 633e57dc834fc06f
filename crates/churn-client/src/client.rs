use std::sync::{Arc, Mutex};

use churn_core::paths::AUTH_TOKEN_KEY;
use churn_core::storage::Storage;
use churn_core::types::{
    Alert, AlertAction, AlertStatus, ChurnPrediction, LoginRequest, MetricsQuery, MetricsSeries,
    OverviewSnapshot, Playbook, PlaybookDraft, PlaybookPatch, PredictionRequest, Session, User,
};
use tokio::sync::watch;

use crate::backend::Backend;
use crate::{ApiError, Result};

// ─── ApiClient ────────────────────────────────────────────────────────────

/// The only path from the application to the backend.
///
/// Holds the bearer token in memory and mirrors it to durable storage under
/// `auth_token`. Every method except [`login`](Self::login) sends the
/// current token when one is held. A token-bearing request rejected as
/// unauthenticated drops the token, and subscribers of
/// [`subscribe_token`](Self::subscribe_token) observe `None`.
pub struct ApiClient<B> {
    backend: B,
    storage: Arc<dyn Storage>,
    token: watch::Sender<Option<String>>,
    // Keeps the storage write and the in-memory swap of `set_token` together.
    token_lock: Mutex<()>,
}

impl<B: Backend> ApiClient<B> {
    /// Create a client, seeding the token slot from storage.
    ///
    /// An unreadable storage entry is logged and treated as no token.
    pub fn new(backend: B, storage: Arc<dyn Storage>) -> Self {
        let initial = match storage.get(AUTH_TOKEN_KEY) {
            Ok(t) => t.filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, "could not read stored token");
                None
            }
        };
        let (token, _) = watch::channel(initial);
        Self {
            backend,
            storage,
            token,
            token_lock: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn token(&self) -> Option<String> {
        self.token.borrow().clone()
    }

    pub fn subscribe_token(&self) -> watch::Receiver<Option<String>> {
        self.token.subscribe()
    }

    /// Replace the token in storage and memory.
    ///
    /// Storage is written first; if that fails the in-memory token is left
    /// as it was and the error is returned, so callers never see the two
    /// disagree.
    pub fn set_token(&self, token: Option<String>) -> Result<()> {
        let _guard = self.token_lock.lock().unwrap_or_else(|e| e.into_inner());
        match &token {
            Some(t) => self.storage.set(AUTH_TOKEN_KEY, t)?,
            None => self.storage.remove(AUTH_TOKEN_KEY)?,
        }
        self.token.send_replace(token);
        Ok(())
    }

    // ─── Auth ─────────────────────────────────────────────────────────────

    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(ApiError::validation("a valid email address is required"));
        }
        if password.is_empty() {
            return Err(ApiError::validation("password is required"));
        }
        let resp = self
            .backend
            .login(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await?;
        self.set_token(Some(resp.token.clone()))?;
        tracing::info!(user = %resp.user.email, "logged in");
        Ok(resp.into())
    }

    /// Invalidate the session remotely and clear the token locally.
    ///
    /// The local token is cleared even when the remote call fails; the
    /// remote error is still returned.
    pub async fn logout(&self) -> Result<()> {
        let token = self.token();
        let remote = self.backend.logout(token.as_deref()).await;
        self.set_token(None)?;
        if let Err(e) = &remote {
            tracing::warn!(error = %e, "remote logout failed; local token cleared");
        }
        remote
    }

    /// Ask the backend who the current token belongs to.
    pub async fn validate_session(&self) -> Result<User> {
        let token = self.token();
        let result = self.backend.current_user(token.as_deref()).await;
        self.guard(token.as_deref(), result)
    }

    // ─── Dashboard data ───────────────────────────────────────────────────

    pub async fn get_overview(&self) -> Result<OverviewSnapshot> {
        let token = self.token();
        let result = self.backend.get_overview(token.as_deref()).await;
        self.guard(token.as_deref(), result)
    }

    pub async fn get_metrics(&self, customer_id: &str, range_days: u32) -> Result<MetricsSeries> {
        if customer_id.trim().is_empty() {
            return Err(ApiError::validation("customer id is required"));
        }
        if range_days == 0 {
            return Err(ApiError::validation("range must be at least one day"));
        }
        let query = MetricsQuery::new(customer_id.trim(), range_days);
        let token = self.token();
        let result = self.backend.get_metrics(token.as_deref(), &query).await;
        self.guard(token.as_deref(), result)
    }

    pub async fn get_playbooks(&self) -> Result<Vec<Playbook>> {
        let token = self.token();
        let result = self.backend.get_playbooks(token.as_deref()).await;
        self.guard(token.as_deref(), result)
    }

    pub async fn create_playbook(&self, draft: &PlaybookDraft) -> Result<Playbook> {
        validate_name(&draft.name)?;
        validate_rules(&draft.rules)?;
        let token = self.token();
        let result = self.backend.create_playbook(token.as_deref(), draft).await;
        self.guard(token.as_deref(), result)
    }

    pub async fn update_playbook(&self, id: &str, patch: &PlaybookPatch) -> Result<Playbook> {
        validate_id("playbook", id)?;
        if patch.is_empty() {
            return Err(ApiError::validation("nothing to update"));
        }
        if let Some(name) = &patch.name {
            validate_name(name)?;
        }
        if let Some(rules) = &patch.rules {
            validate_rules(rules)?;
        }
        let token = self.token();
        let result = self
            .backend
            .update_playbook(token.as_deref(), id, patch)
            .await;
        self.guard(token.as_deref(), result)
    }

    pub async fn delete_playbook(&self, id: &str) -> Result<()> {
        validate_id("playbook", id)?;
        let token = self.token();
        let result = self.backend.delete_playbook(token.as_deref(), id).await;
        self.guard(token.as_deref(), result)
    }

    pub async fn get_alerts(&self, status: Option<AlertStatus>) -> Result<Vec<Alert>> {
        let token = self.token();
        let result = self.backend.get_alerts(token.as_deref(), status).await;
        self.guard(token.as_deref(), result)
    }

    pub async fn take_alert_action(&self, id: &str, action: AlertAction) -> Result<()> {
        validate_id("alert", id)?;
        let token = self.token();
        let result = self
            .backend
            .take_alert_action(token.as_deref(), id, action)
            .await;
        self.guard(token.as_deref(), result)
    }

    /// Score a customer's behaviour with the churn model.
    pub async fn predict_churn(
        &self,
        usage_score: f64,
        support_tickets: u32,
    ) -> Result<ChurnPrediction> {
        if !usage_score.is_finite() || usage_score < 0.0 {
            return Err(ApiError::validation(
                "usage score must be a non-negative number",
            ));
        }
        self.backend
            .predict(&PredictionRequest {
                behavior_metrics_usage_score: usage_score,
                behavior_metrics_support_tickets: support_tickets,
            })
            .await
    }

    // ─── Internal ─────────────────────────────────────────────────────────

    /// Drop the token when the backend rejects the one we just sent.
    ///
    /// Compares against the token actually sent so a login that completed
    /// meanwhile is not undone.
    fn guard<T>(&self, sent: Option<&str>, result: Result<T>) -> Result<T> {
        if let Err(ApiError::Authentication(reason)) = &result {
            if sent.is_some() && self.token().as_deref() == sent {
                tracing::warn!(%reason, "session rejected by backend; clearing token");
                if let Err(e) = self.set_token(None) {
                    tracing::error!(error = %e, "failed to clear rejected token");
                }
            }
        }
        result
    }
}

fn validate_id(what: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(ApiError::validation(format!("{what} id is required")));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ApiError::validation("playbook name is required"));
    }
    Ok(())
}

fn validate_rules(rules: &[churn_core::types::Rule]) -> Result<()> {
    for (i, rule) in rules.iter().enumerate() {
        if rule.condition.trim().is_empty() || rule.action.trim().is_empty() {
            return Err(ApiError::validation(format!(
                "rule {} needs both a condition and an action",
                i + 1
            )));
        }
    }
    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, Op};
    use churn_core::storage::{FileStorage, MemoryStorage};
    use churn_core::types::Rule;
    use churn_core::ChurnError;

    /// Storage whose writes always fail.
    struct ReadOnlyStorage(MemoryStorage);

    impl Storage for ReadOnlyStorage {
        fn get(&self, key: &str) -> churn_core::Result<Option<String>> {
            self.0.get(key)
        }
        fn set(&self, _key: &str, _value: &str) -> churn_core::Result<()> {
            Err(ChurnError::ReadOnly("test storage".into()))
        }
        fn remove(&self, _key: &str) -> churn_core::Result<()> {
            Err(ChurnError::ReadOnly("test storage".into()))
        }
    }

    fn client() -> ApiClient<MockBackend> {
        ApiClient::new(MockBackend::default(), Arc::new(MemoryStorage::new()))
    }

    #[test]
    fn token_is_seeded_from_storage() {
        let storage = Arc::new(MemoryStorage::with_entries([(AUTH_TOKEN_KEY, "stored")]));
        let c = ApiClient::new(MockBackend::default(), storage);
        assert_eq!(c.token(), Some("stored".into()));
    }

    #[test]
    fn set_token_persists_to_storage() {
        let dir = tempfile::TempDir::new().unwrap();
        let c = ApiClient::new(
            MockBackend::default(),
            Arc::new(FileStorage::in_state_dir(dir.path())),
        );
        c.set_token(Some("abc".into())).unwrap();

        let reopened = ApiClient::new(
            MockBackend::default(),
            Arc::new(FileStorage::in_state_dir(dir.path())),
        );
        assert_eq!(reopened.token(), Some("abc".into()));

        c.set_token(None).unwrap();
        assert_eq!(c.storage().get(AUTH_TOKEN_KEY).unwrap(), None);
    }

    #[test]
    fn failed_storage_write_leaves_memory_untouched() {
        let storage = ReadOnlyStorage(MemoryStorage::with_entries([(AUTH_TOKEN_KEY, "old")]));
        let c = ApiClient::new(MockBackend::default(), Arc::new(storage));
        let err = c.set_token(Some("new".into())).unwrap_err();
        assert!(matches!(err, ApiError::Storage(_)));
        assert_eq!(c.token(), Some("old".into()));
        assert!(c.set_token(None).is_err());
        assert_eq!(c.token(), Some("old".into()));
    }

    #[tokio::test]
    async fn login_sets_token() {
        let c = client();
        let session = c.login("demo@example.com", "password").await.unwrap();
        assert_eq!(session.user.email, "demo@example.com");
        assert!(!session.token.is_empty());
        assert_eq!(c.token(), Some(session.token));
    }

    #[tokio::test]
    async fn login_validates_before_sending() {
        let c = client();
        let err = c.login("", "password").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        let err = c.login("demo@example.com", "").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(c.backend().calls(Op::Login), 0);
    }

    #[tokio::test]
    async fn logout_clears_token_even_when_remote_fails() {
        let c = client();
        c.login("demo@example.com", "password").await.unwrap();
        c.backend()
            .fail(Op::Logout, ApiError::Network("connection reset".into()));

        let err = c.logout().await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
        assert_eq!(c.token(), None);
        assert_eq!(c.storage().get(AUTH_TOKEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn rejected_token_is_dropped_and_broadcast() {
        let c = client();
        c.login("demo@example.com", "password").await.unwrap();
        let mut rx = c.subscribe_token();
        c.backend().revoke_all();

        let err = c.get_overview().await.unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(c.token(), None);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), None);
    }

    #[tokio::test]
    async fn calls_proceed_without_token() {
        let c = client();
        let err = c.get_alerts(None).await.unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(c.backend().calls(Op::Alerts), 1);
    }

    #[tokio::test]
    async fn playbook_validation_rejects_blank_fields() {
        let c = client();
        c.login("demo@example.com", "password").await.unwrap();

        let blank = PlaybookDraft {
            name: "  ".into(),
            ..Default::default()
        };
        assert!(matches!(
            c.create_playbook(&blank).await,
            Err(ApiError::Validation(_))
        ));

        let bad_rule = PlaybookDraft {
            name: "Ok".into(),
            rules: vec![Rule {
                condition: "x > 1".into(),
                action: "".into(),
            }],
            ..Default::default()
        };
        assert!(matches!(
            c.create_playbook(&bad_rule).await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            c.update_playbook("1", &PlaybookPatch::default()).await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            c.delete_playbook("").await,
            Err(ApiError::Validation(_))
        ));
        assert_eq!(c.backend().calls(Op::CreatePlaybook), 0);
    }

    #[tokio::test]
    async fn metrics_validation() {
        let c = client();
        assert!(matches!(
            c.get_metrics("cust-001", 0).await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            c.get_metrics(" ", 30).await,
            Err(ApiError::Validation(_))
        ));
        assert_eq!(c.backend().calls(Op::Metrics), 0);
    }

    #[tokio::test]
    async fn predict_rejects_negative_usage() {
        let c = client();
        assert!(matches!(
            c.predict_churn(-1.0, 2).await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            c.predict_churn(f64::NAN, 2).await,
            Err(ApiError::Validation(_))
        ));
        assert!(c.predict_churn(30.0, 7).await.unwrap().raises_alert());
    }

    #[tokio::test]
    async fn validate_session_returns_user() {
        let c = client();
        c.login("demo@example.com", "password").await.unwrap();
        let user = c.validate_session().await.unwrap();
        assert_eq!(user.email, "demo@example.com");
    }
}
