//! `reqwest` transport speaking the dashboard's JSON API.

use std::time::Duration;

use churn_core::types::{
    Alert, AlertAction, AlertActionRequest, AlertStatus, ChurnPrediction, LoginRequest,
    LoginResponse, MetricsQuery, MetricsSeries, OverviewSnapshot, Playbook, PlaybookDraft,
    PlaybookPatch, PredictionRequest, User,
};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::backend::Backend;
use crate::{ApiError, Result};

// ─── HttpBackend ──────────────────────────────────────────────────────────

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    model_url: String,
}

impl HttpBackend {
    /// `base_url` serves the dashboard API, `model_url` the churn model.
    /// `timeout` of `None` leaves requests unbounded.
    pub fn new(base_url: &str, model_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let client = builder
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model_url: model_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// URL under the API base with each segment percent-encoded, so ids
    /// holding `/`, `?` or `#` stay a single path segment.
    fn segment_url(&self, segments: &[&str]) -> Result<Url> {
        let invalid = || ApiError::validation(format!("invalid API base URL '{}'", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|()| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authed(rb: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token {
            Some(t) => rb.bearer_auth(t),
            None => rb,
        }
    }

    async fn send_json<T: DeserializeOwned>(rb: RequestBuilder) -> Result<T> {
        let resp = check(rb.send().await.map_err(network)?).await?;
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await.map_err(network)?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Server {
            status,
            message: format!("invalid response body: {e}"),
        })
    }

    async fn send_empty(rb: RequestBuilder) -> Result<()> {
        check(rb.send().await.map_err(network)?).await?;
        Ok(())
    }
}

fn network(e: reqwest::Error) -> ApiError {
    ApiError::Network(e.to_string())
}

/// Map a non-2xx response onto the error taxonomy.
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    });
    tracing::debug!(status = status.as_u16(), %message, "request failed");
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(ApiError::Authentication(message))
    } else {
        Err(ApiError::Server {
            status: status.as_u16(),
            message,
        })
    }
}

/// Pull `message` or `error` out of a JSON error body.
fn error_message(body: &str) -> Option<String> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|k| v.get(*k).and_then(|m| m.as_str()))
        .map(str::to_string)
}

impl Backend for HttpBackend {
    async fn login(&self, req: &LoginRequest) -> Result<LoginResponse> {
        Self::send_json(self.client.post(self.url("/auth/login")).json(req)).await
    }

    async fn logout(&self, token: Option<&str>) -> Result<()> {
        let rb = Self::authed(self.client.post(self.url("/auth/logout")), token);
        Self::send_empty(rb).await
    }

    async fn current_user(&self, token: Option<&str>) -> Result<User> {
        let rb = Self::authed(self.client.get(self.url("/auth/session")), token);
        Self::send_json(rb).await
    }

    async fn get_overview(&self, token: Option<&str>) -> Result<OverviewSnapshot> {
        let rb = Self::authed(self.client.get(self.url("/overview")), token);
        Self::send_json(rb).await
    }

    async fn get_metrics(&self, token: Option<&str>, query: &MetricsQuery) -> Result<MetricsSeries> {
        let range = query.range_days.to_string();
        let rb = self
            .client
            .get(self.url("/metrics"))
            .query(&[("customerId", query.customer_id.as_str()), ("range", &range)]);
        Self::send_json(Self::authed(rb, token)).await
    }

    async fn get_playbooks(&self, token: Option<&str>) -> Result<Vec<Playbook>> {
        let rb = Self::authed(self.client.get(self.url("/playbooks")), token);
        Self::send_json(rb).await
    }

    async fn create_playbook(&self, token: Option<&str>, draft: &PlaybookDraft) -> Result<Playbook> {
        let rb = Self::authed(self.client.post(self.url("/playbooks")), token).json(draft);
        Self::send_json(rb).await
    }

    async fn update_playbook(
        &self,
        token: Option<&str>,
        id: &str,
        patch: &PlaybookPatch,
    ) -> Result<Playbook> {
        let url = self.segment_url(&["playbooks", id])?;
        let rb = Self::authed(self.client.put(url), token).json(patch);
        Self::send_json(rb).await
    }

    async fn delete_playbook(&self, token: Option<&str>, id: &str) -> Result<()> {
        let url = self.segment_url(&["playbooks", id])?;
        let rb = Self::authed(self.client.delete(url), token);
        Self::send_empty(rb).await
    }

    async fn get_alerts(
        &self,
        token: Option<&str>,
        status: Option<AlertStatus>,
    ) -> Result<Vec<Alert>> {
        let mut rb = self.client.get(self.url("/alerts"));
        if let Some(s) = status {
            rb = rb.query(&[("status", s.as_str())]);
        }
        Self::send_json(Self::authed(rb, token)).await
    }

    async fn take_alert_action(
        &self,
        token: Option<&str>,
        id: &str,
        action: AlertAction,
    ) -> Result<()> {
        let url = self.segment_url(&["alerts", id, "action"])?;
        let rb = Self::authed(self.client.post(url), token).json(&AlertActionRequest { action });
        Self::send_empty(rb).await
    }

    async fn predict(&self, req: &PredictionRequest) -> Result<ChurnPrediction> {
        let url = format!("{}/predict", self.model_url);
        Self::send_json(self.client.post(url).json(req)).await
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
