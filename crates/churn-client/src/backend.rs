use churn_core::types::{
    Alert, AlertAction, AlertStatus, ChurnPrediction, LoginRequest, LoginResponse, MetricsQuery,
    MetricsSeries, OverviewSnapshot, Playbook, PlaybookDraft, PlaybookPatch, PredictionRequest,
    User,
};

use crate::http::HttpBackend;
use crate::mock::MockBackend;
use crate::Result;

// ─── Backend ──────────────────────────────────────────────────────────────

/// One method per backend operation.
///
/// Implementations only move data; token bookkeeping and request
/// validation live in [`ApiClient`](crate::ApiClient). `token` is the bearer
/// credential to attach, if any. The backend is the authority on access
/// control and answers a missing or stale token with
/// [`ApiError::Authentication`](crate::ApiError::Authentication).
#[allow(async_fn_in_trait)]
pub trait Backend: Send + Sync {
    async fn login(&self, req: &LoginRequest) -> Result<LoginResponse>;
    async fn logout(&self, token: Option<&str>) -> Result<()>;
    /// The user the token belongs to (`GET /auth/session`).
    async fn current_user(&self, token: Option<&str>) -> Result<User>;
    async fn get_overview(&self, token: Option<&str>) -> Result<OverviewSnapshot>;
    async fn get_metrics(&self, token: Option<&str>, query: &MetricsQuery) -> Result<MetricsSeries>;
    async fn get_playbooks(&self, token: Option<&str>) -> Result<Vec<Playbook>>;
    async fn create_playbook(&self, token: Option<&str>, draft: &PlaybookDraft) -> Result<Playbook>;
    async fn update_playbook(
        &self,
        token: Option<&str>,
        id: &str,
        patch: &PlaybookPatch,
    ) -> Result<Playbook>;
    async fn delete_playbook(&self, token: Option<&str>, id: &str) -> Result<()>;
    async fn get_alerts(&self, token: Option<&str>, status: Option<AlertStatus>)
        -> Result<Vec<Alert>>;
    async fn take_alert_action(
        &self,
        token: Option<&str>,
        id: &str,
        action: AlertAction,
    ) -> Result<()>;
    /// Score a customer with the churn model (`POST /predict`).
    async fn predict(&self, req: &PredictionRequest) -> Result<ChurnPrediction>;
}

// ─── AnyBackend ───────────────────────────────────────────────────────────

/// Backend chosen at runtime from configuration.
pub enum AnyBackend {
    Http(HttpBackend),
    Mock(MockBackend),
}

macro_rules! dispatch {
    ($self:ident, $b:ident => $call:expr) => {
        match $self {
            AnyBackend::Http($b) => $call.await,
            AnyBackend::Mock($b) => $call.await,
        }
    };
}

impl Backend for AnyBackend {
    async fn login(&self, req: &LoginRequest) -> Result<LoginResponse> {
        dispatch!(self, b => b.login(req))
    }

    async fn logout(&self, token: Option<&str>) -> Result<()> {
        dispatch!(self, b => b.logout(token))
    }

    async fn current_user(&self, token: Option<&str>) -> Result<User> {
        dispatch!(self, b => b.current_user(token))
    }

    async fn get_overview(&self, token: Option<&str>) -> Result<OverviewSnapshot> {
        dispatch!(self, b => b.get_overview(token))
    }

    async fn get_metrics(&self, token: Option<&str>, query: &MetricsQuery) -> Result<MetricsSeries> {
        dispatch!(self, b => b.get_metrics(token, query))
    }

    async fn get_playbooks(&self, token: Option<&str>) -> Result<Vec<Playbook>> {
        dispatch!(self, b => b.get_playbooks(token))
    }

    async fn create_playbook(&self, token: Option<&str>, draft: &PlaybookDraft) -> Result<Playbook> {
        dispatch!(self, b => b.create_playbook(token, draft))
    }

    async fn update_playbook(
        &self,
        token: Option<&str>,
        id: &str,
        patch: &PlaybookPatch,
    ) -> Result<Playbook> {
        dispatch!(self, b => b.update_playbook(token, id, patch))
    }

    async fn delete_playbook(&self, token: Option<&str>, id: &str) -> Result<()> {
        dispatch!(self, b => b.delete_playbook(token, id))
    }

    async fn get_alerts(
        &self,
        token: Option<&str>,
        status: Option<AlertStatus>,
    ) -> Result<Vec<Alert>> {
        dispatch!(self, b => b.get_alerts(token, status))
    }

    async fn take_alert_action(
        &self,
        token: Option<&str>,
        id: &str,
        action: AlertAction,
    ) -> Result<()> {
        dispatch!(self, b => b.take_alert_action(token, id, action))
    }

    async fn predict(&self, req: &PredictionRequest) -> Result<ChurnPrediction> {
        dispatch!(self, b => b.predict(req))
    }
}
