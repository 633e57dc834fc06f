//! In-process backend serving configurable fixtures.
//!
//! Used for demos and tests. Tokens it issues look like
//! `mock-<generation>-<uuid>` so they stay valid across processes until
//! [`MockBackend::revoke_all`] bumps the generation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDate};
use churn_core::types::{
    Alert, AlertAction, AlertStatus, ChurnPrediction, LoginRequest, LoginResponse, MetricsPoint,
    MetricsQuery, MetricsSeries, OverviewSnapshot, Playbook, PlaybookDraft, PlaybookPatch,
    PredictionRequest, Rule, Severity, User,
};
use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::{ApiError, Result};

const TOKEN_PREFIX: &str = "mock-";

// ─── Op ───────────────────────────────────────────────────────────────────

/// Backend operations, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Login,
    Logout,
    CurrentUser,
    Overview,
    Metrics,
    Playbooks,
    CreatePlaybook,
    UpdatePlaybook,
    DeletePlaybook,
    Alerts,
    AlertAction,
    Predict,
}

// ─── MockFixtures ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockCredential {
    pub email: String,
    pub password: String,
    pub user: User,
}

/// Data served by [`MockBackend`]. Loadable from YAML so demo data can be
/// swapped without rebuilding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockFixtures {
    pub credentials: Vec<MockCredential>,
    pub overview: OverviewSnapshot,
    /// Oldest first; a metrics request returns the last `range` points.
    pub metrics: Vec<MetricsPoint>,
    pub playbooks: Vec<Playbook>,
    pub alerts: Vec<Alert>,
}

impl Default for MockFixtures {
    fn default() -> Self {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default();
        let metrics = (0..30u32)
            .map(|i| {
                let usage_score = 85.0 - f64::from(i) * 1.5;
                let support_tickets = i / 6;
                MetricsPoint {
                    date: start + ChronoDuration::days(i64::from(i)),
                    usage_score,
                    support_tickets,
                    churn_probability: (churn_probability(usage_score, support_tickets) * 100.0)
                        .round()
                        / 100.0,
                }
            })
            .collect();

        Self {
            credentials: vec![MockCredential {
                email: "demo@example.com".into(),
                password: "password".into(),
                user: User {
                    id: "1".into(),
                    email: "demo@example.com".into(),
                    name: "Demo User".into(),
                    role: "admin".into(),
                },
            }],
            overview: OverviewSnapshot {
                high_risk: 10,
                medium_risk: 20,
                low_risk: 70,
                average_clv: 1100.0,
                retention_rate: 0.78,
                active_playbooks_count: 2,
            },
            metrics,
            playbooks: vec![
                Playbook {
                    id: "1".into(),
                    name: "High Risk Outreach".into(),
                    description: "Personal call from the account manager".into(),
                    rules: vec![Rule {
                        condition: "churn_probability > 0.7".into(),
                        action: "schedule_call".into(),
                    }],
                },
                Playbook {
                    id: "2".into(),
                    name: "Low Usage Re-engagement".into(),
                    description: "Feature tips for customers whose usage dropped".into(),
                    rules: vec![Rule {
                        condition: "usage_score < 40".into(),
                        action: "send_email".into(),
                    }],
                },
            ],
            alerts: vec![
                Alert {
                    id: "1".into(),
                    message: "Acme Corp churn risk rose above 70%".into(),
                    severity: Severity::High,
                    date: start + ChronoDuration::days(28),
                    customer_id: Some("cust-001".into()),
                },
                Alert {
                    id: "2".into(),
                    message: "Support tickets doubled for Globex this week".into(),
                    severity: Severity::Medium,
                    date: start + ChronoDuration::days(29),
                    customer_id: Some("cust-002".into()),
                },
            ],
        }
    }
}

/// Heuristic stand-in for the churn model: low usage and many tickets push
/// the probability up.
pub fn churn_probability(usage_score: f64, support_tickets: u32) -> f64 {
    let z = -0.08 * (usage_score - 50.0) + 0.45 * (f64::from(support_tickets) - 3.0);
    1.0 / (1.0 + (-z).exp())
}

// ─── MockBackend ──────────────────────────────────────────────────────────

#[derive(Default)]
struct MockState {
    playbooks: Vec<Playbook>,
    next_playbook_id: u64,
    generation: u64,
    calls: HashMap<Op, usize>,
    failures: HashMap<Op, ApiError>,
}

pub struct MockBackend {
    fixtures: MockFixtures,
    latency: Option<Duration>,
    state: Mutex<MockState>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new(MockFixtures::default())
    }
}

impl MockBackend {
    pub fn new(fixtures: MockFixtures) -> Self {
        let next_playbook_id = fixtures
            .playbooks
            .iter()
            .filter_map(|p| p.id.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let state = MockState {
            playbooks: fixtures.playbooks.clone(),
            next_playbook_id,
            ..Default::default()
        };
        Self {
            fixtures,
            latency: None,
            state: Mutex::new(state),
        }
    }

    /// Load fixtures from a YAML file.
    pub fn from_yaml_file(path: &Path) -> churn_core::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let fixtures: MockFixtures = serde_yaml::from_str(&data)?;
        Ok(Self::new(fixtures))
    }

    /// Delay every response by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn fixtures(&self) -> &MockFixtures {
        &self.fixtures
    }

    /// Number of times `op` has been called.
    pub fn calls(&self, op: Op) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Make every subsequent `op` call fail with `err`.
    pub fn fail(&self, op: Op, err: ApiError) {
        self.lock().failures.insert(op, err);
    }

    pub fn clear_failure(&self, op: Op) {
        self.lock().failures.remove(&op);
    }

    /// Invalidate every token issued so far.
    pub fn revoke_all(&self) {
        self.lock().generation += 1;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count the call, wait out the latency and apply injected failures.
    async fn enter(&self, op: Op) -> Result<()> {
        {
            let mut st = self.lock();
            *st.calls.entry(op).or_insert(0) += 1;
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.lock().failures.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn authorize(&self, token: Option<&str>) -> Result<()> {
        let Some(token) = token else {
            return Err(ApiError::Authentication("missing bearer token".into()));
        };
        let generation = self.lock().generation;
        let valid = token
            .strip_prefix(TOKEN_PREFIX)
            .and_then(|rest| rest.split_once('-'))
            .and_then(|(g, _)| g.parse::<u64>().ok())
            .is_some_and(|g| g == generation);
        if valid {
            Ok(())
        } else {
            Err(ApiError::Authentication("invalid or expired token".into()))
        }
    }

    fn user_for_token(&self) -> Result<User> {
        // Tokens are not bound to a user; the first credential is the session user.
        self.fixtures
            .credentials
            .first()
            .map(|c| c.user.clone())
            .ok_or_else(|| ApiError::Authentication("no users configured".into()))
    }

    fn not_found(what: &str, id: &str) -> ApiError {
        ApiError::Server {
            status: 404,
            message: format!("{what} '{id}' not found"),
        }
    }
}

impl Backend for MockBackend {
    async fn login(&self, req: &LoginRequest) -> Result<LoginResponse> {
        self.enter(Op::Login).await?;
        let cred = self
            .fixtures
            .credentials
            .iter()
            .find(|c| c.email == req.email && c.password == req.password)
            .ok_or_else(|| ApiError::Authentication("invalid email or password".into()))?;
        let generation = self.lock().generation;
        Ok(LoginResponse {
            token: format!("{TOKEN_PREFIX}{generation}-{}", uuid::Uuid::new_v4()),
            user: cred.user.clone(),
        })
    }

    async fn logout(&self, _token: Option<&str>) -> Result<()> {
        self.enter(Op::Logout).await
    }

    async fn current_user(&self, token: Option<&str>) -> Result<User> {
        self.enter(Op::CurrentUser).await?;
        self.authorize(token)?;
        self.user_for_token()
    }

    async fn get_overview(&self, token: Option<&str>) -> Result<OverviewSnapshot> {
        self.enter(Op::Overview).await?;
        self.authorize(token)?;
        Ok(self.fixtures.overview.clone())
    }

    async fn get_metrics(&self, token: Option<&str>, query: &MetricsQuery) -> Result<MetricsSeries> {
        self.enter(Op::Metrics).await?;
        self.authorize(token)?;
        let points = &self.fixtures.metrics;
        let skip = points.len().saturating_sub(query.range_days as usize);
        Ok(MetricsSeries {
            customer_id: query.customer_id.clone(),
            data_points: points[skip..].to_vec(),
        })
    }

    async fn get_playbooks(&self, token: Option<&str>) -> Result<Vec<Playbook>> {
        self.enter(Op::Playbooks).await?;
        self.authorize(token)?;
        Ok(self.lock().playbooks.clone())
    }

    async fn create_playbook(&self, token: Option<&str>, draft: &PlaybookDraft) -> Result<Playbook> {
        self.enter(Op::CreatePlaybook).await?;
        self.authorize(token)?;
        let mut st = self.lock();
        let playbook = Playbook {
            id: st.next_playbook_id.to_string(),
            name: draft.name.clone(),
            description: draft.description.clone(),
            rules: draft.rules.clone(),
        };
        st.next_playbook_id += 1;
        st.playbooks.push(playbook.clone());
        Ok(playbook)
    }

    async fn update_playbook(
        &self,
        token: Option<&str>,
        id: &str,
        patch: &PlaybookPatch,
    ) -> Result<Playbook> {
        self.enter(Op::UpdatePlaybook).await?;
        self.authorize(token)?;
        let mut st = self.lock();
        let playbook = st
            .playbooks
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Self::not_found("playbook", id))?;
        patch.apply(playbook);
        Ok(playbook.clone())
    }

    async fn delete_playbook(&self, token: Option<&str>, id: &str) -> Result<()> {
        self.enter(Op::DeletePlaybook).await?;
        self.authorize(token)?;
        let mut st = self.lock();
        let before = st.playbooks.len();
        st.playbooks.retain(|p| p.id != id);
        if st.playbooks.len() == before {
            return Err(Self::not_found("playbook", id));
        }
        Ok(())
    }

    async fn get_alerts(
        &self,
        token: Option<&str>,
        _status: Option<AlertStatus>,
    ) -> Result<Vec<Alert>> {
        self.enter(Op::Alerts).await?;
        self.authorize(token)?;
        Ok(self.fixtures.alerts.clone())
    }

    async fn take_alert_action(
        &self,
        token: Option<&str>,
        id: &str,
        action: AlertAction,
    ) -> Result<()> {
        self.enter(Op::AlertAction).await?;
        self.authorize(token)?;
        if !self.fixtures.alerts.iter().any(|a| a.id == id) {
            return Err(Self::not_found("alert", id));
        }
        tracing::debug!(alert = id, action = action.as_str(), "mock alert action");
        Ok(())
    }

    async fn predict(&self, req: &PredictionRequest) -> Result<ChurnPrediction> {
        self.enter(Op::Predict).await?;
        let p = churn_probability(
            req.behavior_metrics_usage_score,
            req.behavior_metrics_support_tickets,
        );
        Ok(ChurnPrediction {
            churn_probability: p,
            churn_prediction: u8::from(p > 0.5),
        })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
