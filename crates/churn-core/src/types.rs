use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
}

/// The authenticated user plus the bearer token issued for them.
///
/// A session only exists whole: there is no token without a user and no
/// user without a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

impl From<LoginResponse> for Session {
    fn from(r: LoginResponse) -> Self {
        Session {
            user: r.user,
            token: r.token,
        }
    }
}

// ---------------------------------------------------------------------------
// Overview
// ---------------------------------------------------------------------------

/// Aggregate dashboard counters, always replaced wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewSnapshot {
    #[serde(rename = "highRisk")]
    pub high_risk: u64,
    #[serde(rename = "mediumRisk")]
    pub medium_risk: u64,
    #[serde(rename = "lowRisk")]
    pub low_risk: u64,
    #[serde(rename = "averageCLV")]
    pub average_clv: f64,
    #[serde(rename = "retentionRate")]
    pub retention_rate: f64,
    #[serde(rename = "activePlaybooksCount")]
    pub active_playbooks_count: u64,
}

impl OverviewSnapshot {
    pub fn total_customers(&self) -> u64 {
        self.high_risk
            .saturating_add(self.medium_risk)
            .saturating_add(self.low_risk)
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsPoint {
    pub date: NaiveDate,
    pub usage_score: f64,
    pub support_tickets: u32,
    pub churn_probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSeries {
    pub customer_id: String,
    pub data_points: Vec<MetricsPoint>,
}

impl MetricsSeries {
    pub fn latest(&self) -> Option<&MetricsPoint> {
        self.data_points.iter().max_by_key(|p| p.date)
    }
}

/// The selection a metrics series is fetched for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricsQuery {
    pub customer_id: String,
    pub range_days: u32,
}

impl MetricsQuery {
    pub fn new(customer_id: impl Into<String>, range_days: u32) -> Self {
        Self {
            customer_id: customer_id.into(),
            range_days,
        }
    }
}

// ---------------------------------------------------------------------------
// Playbooks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub condition: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playbook {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Fields for a new playbook. The server assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaybookDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl PlaybookDraft {
    /// True when `playbook` carries exactly the fields of this draft.
    pub fn matches(&self, playbook: &Playbook) -> bool {
        self.name == playbook.name
            && self.description == playbook.description
            && self.rules == playbook.rules
    }
}

/// Partial update; `None` leaves the field unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaybookPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<Rule>>,
}

impl PlaybookPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.rules.is_none()
    }

    pub fn apply(&self, playbook: &mut Playbook) {
        if let Some(name) = &self.name {
            playbook.name = name.clone();
        }
        if let Some(description) = &self.description {
            playbook.description = description.clone();
        }
        if let Some(rules) = &self.rules {
            playbook.rules = rules.clone();
        }
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub message: String,
    pub severity: Severity,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertAction {
    Acknowledge,
    Dismiss,
    Resolve,
}

impl AlertAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertAction::Acknowledge => "acknowledge",
            AlertAction::Dismiss => "dismiss",
            AlertAction::Resolve => "resolve",
        }
    }
}

impl std::str::FromStr for AlertAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "acknowledge" | "ack" => Ok(AlertAction::Acknowledge),
            "dismiss" => Ok(AlertAction::Dismiss),
            "resolve" => Ok(AlertAction::Resolve),
            other => Err(format!(
                "unknown alert action '{other}': expected acknowledge, dismiss or resolve"
            )),
        }
    }
}

/// Body of `POST /alerts/{id}/action`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertActionRequest {
    pub action: AlertAction,
}

/// Filter for `GET /alerts?status=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Dismissed,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Dismissed => "dismissed",
            AlertStatus::Resolved => "resolved",
        }
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(AlertStatus::Active),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "dismissed" => Ok(AlertStatus::Dismissed),
            "resolved" => Ok(AlertStatus::Resolved),
            other => Err(format!("unknown alert status '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Churn prediction
// ---------------------------------------------------------------------------

/// Probability above which a prediction raises a churn alert.
pub const ALERT_THRESHOLD: f64 = 0.7;
/// Probability above which a customer counts as medium risk.
pub const MEDIUM_RISK_THRESHOLD: f64 = 0.4;

/// Body of `POST /predict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub behavior_metrics_usage_score: f64,
    pub behavior_metrics_support_tickets: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChurnPrediction {
    pub churn_probability: f64,
    /// 1 when the model predicts churn (probability > 0.5), else 0.
    pub churn_prediction: u8,
}

impl ChurnPrediction {
    pub fn will_churn(&self) -> bool {
        self.churn_prediction == 1
    }

    pub fn band(&self) -> RiskBand {
        RiskBand::from_probability(self.churn_probability)
    }

    pub fn raises_alert(&self) -> bool {
        self.churn_probability > ALERT_THRESHOLD
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBand {
    High,
    Medium,
    Low,
}

impl RiskBand {
    pub fn from_probability(p: f64) -> Self {
        if p > ALERT_THRESHOLD {
            RiskBand::High
        } else if p > MEDIUM_RISK_THRESHOLD {
            RiskBand::Medium
        } else {
            RiskBand::Low
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            RiskBand::High => Severity::High,
            RiskBand::Medium => Severity::Medium,
            RiskBand::Low => Severity::Low,
        }
    }
}
