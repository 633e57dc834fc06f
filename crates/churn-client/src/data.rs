//! Shared cache of dashboard data and the fetch/mutate operations on it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use churn_core::types::{
    Alert, AlertAction, AlertStatus, MetricsQuery, MetricsSeries, OverviewSnapshot, Playbook,
    PlaybookDraft, PlaybookPatch,
};
use tokio::sync::watch;

use crate::backend::Backend;
use crate::client::ApiClient;
use crate::{ApiError, Result};

// ─── Resource / DataState ─────────────────────────────────────────────────

/// A cached value and the error from its most recent failed fetch.
///
/// A failed fetch keeps the previous value so views can show stale data
/// next to the error.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource<T> {
    pub value: Option<T>,
    pub error: Option<ApiError>,
}

impl<T> Default for Resource<T> {
    fn default() -> Self {
        Self {
            value: None,
            error: None,
        }
    }
}

impl<T> Resource<T> {
    fn settle(&mut self, result: Result<T>, last_error: &mut Option<ApiError>, what: &str) {
        match result {
            Ok(v) => {
                self.value = Some(v);
                self.error = None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to fetch {what}");
                self.error = Some(e.clone());
                *last_error = Some(e);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataState {
    /// True until the first [`DataContext::mount`] has settled.
    pub loading: bool,
    /// Most recent read-path failure of any resource.
    pub error: Option<ApiError>,
    pub overview: Resource<OverviewSnapshot>,
    pub metrics: Resource<MetricsSeries>,
    /// Selection the metrics resource was last fetched for.
    pub metrics_query: Option<MetricsQuery>,
    pub playbooks: Resource<Vec<Playbook>>,
    pub alerts: Resource<Vec<Alert>>,
    pub alert_filter: Option<AlertStatus>,
}

impl Default for DataState {
    fn default() -> Self {
        Self {
            loading: true,
            error: None,
            overview: Resource::default(),
            metrics: Resource::default(),
            metrics_query: None,
            playbooks: Resource::default(),
            alerts: Resource::default(),
            alert_filter: None,
        }
    }
}

// ─── DataContext ──────────────────────────────────────────────────────────

/// Cache plus fetch orchestration for overview, metrics, playbooks and
/// alerts.
///
/// Read operations never fail to the caller: errors are logged and stored
/// on the matching [`Resource`]. Mutations return their error and, on
/// success, re-fetch the whole collection instead of patching it locally.
///
/// Every fetch records the epoch it started in. [`unmount`](Self::unmount)
/// advances the epoch so results of fetches begun before it are dropped
/// rather than written.
pub struct DataContext<B> {
    client: Arc<ApiClient<B>>,
    state: watch::Sender<DataState>,
    default_metrics: MetricsQuery,
    last_metrics: Mutex<Option<MetricsQuery>>,
    epoch: AtomicU64,
}

impl<B: Backend> DataContext<B> {
    /// `default_metrics` is the selection fetched by [`mount`](Self::mount).
    pub fn new(client: Arc<ApiClient<B>>, default_metrics: MetricsQuery) -> Self {
        let (state, _) = watch::channel(DataState::default());
        Self {
            client,
            state,
            default_metrics,
            last_metrics: Mutex::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn client(&self) -> &Arc<ApiClient<B>> {
        &self.client
    }

    pub fn state(&self) -> DataState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DataState> {
        self.state.subscribe()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Run the four initial fetches concurrently and clear `loading` once
    /// all have settled. Later refreshes never set `loading` again.
    pub async fn mount(&self) {
        let q = self.default_metrics.clone();
        tokio::join!(
            self.refresh_overview(),
            self.fetch_metrics(&q.customer_id, q.range_days),
            self.fetch_playbooks(),
            self.fetch_alerts(),
        );
        self.state.send_if_modified(|s| std::mem::replace(&mut s.loading, false));
    }

    /// Drop the results of every fetch still in flight.
    pub fn unmount(&self) {
        let previous = self.epoch.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(epoch = previous + 1, "data context unmounted");
    }

    pub fn clear_error(&self) {
        self.state.send_if_modified(|s| s.error.take().is_some());
    }

    // ─── Reads ────────────────────────────────────────────────────────────

    /// Fetch and replace the overview. Concurrent calls race; the last
    /// response to arrive wins.
    pub async fn refresh_overview(&self) {
        let epoch = self.epoch();
        let result = self.client.get_overview().await;
        self.apply(epoch, "overview", |s| {
            s.overview.settle(result, &mut s.error, "overview")
        });
    }

    /// Fetch metrics for a selection, skipping the call entirely when it
    /// matches the previous invocation, even if that one failed. Use
    /// [`refresh_metrics`](Self::refresh_metrics) to retry.
    pub async fn fetch_metrics(&self, customer_id: &str, range_days: u32) {
        let query = MetricsQuery::new(customer_id, range_days);
        {
            let mut last = self.lock_last_metrics();
            if last.as_ref() == Some(&query) {
                tracing::debug!(customer = %query.customer_id, range = query.range_days, "metrics selection unchanged; skipping");
                return;
            }
            *last = Some(query.clone());
        }
        self.load_metrics(query).await;
    }

    /// Re-fetch the current metrics selection, bypassing the guard.
    pub async fn refresh_metrics(&self) {
        let query = {
            let mut last = self.lock_last_metrics();
            let q = last.clone().unwrap_or_else(|| self.default_metrics.clone());
            *last = Some(q.clone());
            q
        };
        self.load_metrics(query).await;
    }

    pub async fn fetch_playbooks(&self) {
        let epoch = self.epoch();
        let result = self.client.get_playbooks().await;
        self.apply(epoch, "playbooks", |s| {
            s.playbooks.settle(result, &mut s.error, "playbooks")
        });
    }

    /// Fetch alerts using the current status filter.
    pub async fn fetch_alerts(&self) {
        let epoch = self.epoch();
        let filter = self.state.borrow().alert_filter;
        let result = self.client.get_alerts(filter).await;
        self.apply(epoch, "alerts", |s| {
            s.alerts.settle(result, &mut s.error, "alerts")
        });
    }

    /// Set the status filter used by the next [`fetch_alerts`](Self::fetch_alerts).
    pub fn set_alert_filter(&self, status: Option<AlertStatus>) {
        self.state.send_if_modified(|s| {
            let changed = s.alert_filter != status;
            s.alert_filter = status;
            changed
        });
    }

    // ─── Mutations ────────────────────────────────────────────────────────

    pub async fn create_playbook(&self, draft: PlaybookDraft) -> Result<Playbook> {
        let created = self
            .client
            .create_playbook(&draft)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "create playbook failed"))?;
        tracing::info!(id = %created.id, name = %created.name, "playbook created");
        self.fetch_playbooks().await;
        Ok(created)
    }

    pub async fn update_playbook(&self, id: &str, patch: PlaybookPatch) -> Result<Playbook> {
        let updated = self
            .client
            .update_playbook(id, &patch)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, id, "update playbook failed"))?;
        self.fetch_playbooks().await;
        Ok(updated)
    }

    pub async fn delete_playbook(&self, id: &str) -> Result<()> {
        self.client
            .delete_playbook(id)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, id, "delete playbook failed"))?;
        tracing::info!(id, "playbook deleted");
        self.fetch_playbooks().await;
        Ok(())
    }

    /// Act on an alert, then re-fetch the alert list. The cached alert is
    /// not modified locally.
    pub async fn take_alert_action(&self, id: &str, action: AlertAction) -> Result<()> {
        self.client
            .take_alert_action(id, action)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, id, "alert action failed"))?;
        self.fetch_alerts().await;
        Ok(())
    }

    // ─── Internal ─────────────────────────────────────────────────────────

    async fn load_metrics(&self, query: MetricsQuery) {
        let epoch = self.epoch();
        let result = self
            .client
            .get_metrics(&query.customer_id, query.range_days)
            .await;

        let current = self.lock_last_metrics().as_ref() == Some(&query);
        if !current {
            tracing::debug!(customer = %query.customer_id, "metrics selection changed; dropping response");
            return;
        }

        self.apply(epoch, "metrics", |s| {
            s.metrics.settle(result, &mut s.error, "metrics");
            s.metrics_query = Some(query);
        });
    }

    /// Write into the state unless the context was unmounted since `epoch`.
    fn apply(&self, epoch: u64, what: &str, f: impl FnOnce(&mut DataState)) {
        let applied = self.state.send_if_modified(|s| {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            f(s);
            true
        });
        if !applied {
            tracing::debug!(epoch, "discarding stale {what} result");
        }
    }

    fn lock_last_metrics(&self) -> std::sync::MutexGuard<'_, Option<MetricsQuery>> {
        self.last_metrics.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, Op};
    use churn_core::storage::MemoryStorage;
    use churn_core::types::Rule;
    use std::time::Duration;

    async fn context_with(mock: MockBackend) -> DataContext<MockBackend> {
        let client = Arc::new(ApiClient::new(mock, Arc::new(MemoryStorage::new())));
        client.login("demo@example.com", "password").await.unwrap();
        DataContext::new(client, MetricsQuery::new("cust-001", 30))
    }

    async fn context() -> DataContext<MockBackend> {
        context_with(MockBackend::default()).await
    }

    fn mock(data: &DataContext<MockBackend>) -> &MockBackend {
        data.client().backend()
    }

    #[tokio::test]
    async fn mount_loads_everything_and_clears_loading() {
        let data = context().await;
        assert!(data.state().loading);
        data.mount().await;

        let s = data.state();
        assert!(!s.loading);
        assert_eq!(s.error, None);
        let overview = s.overview.value.unwrap();
        assert_eq!(overview.high_risk, 10);
        assert_eq!(overview.medium_risk, 20);
        assert_eq!(overview.low_risk, 70);
        assert!((overview.average_clv - 1100.0).abs() < f64::EPSILON);
        assert!((overview.retention_rate - 0.78).abs() < f64::EPSILON);
        assert_eq!(overview.active_playbooks_count, 2);
        assert_eq!(s.metrics.value.unwrap().data_points.len(), 30);
        assert_eq!(s.playbooks.value.unwrap().len(), 2);
        assert_eq!(s.alerts.value.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn loading_clears_even_when_fetches_fail_and_never_rearms() {
        let data = context().await;
        mock(&data).fail(
            Op::Overview,
            ApiError::Server {
                status: 500,
                message: "boom".into(),
            },
        );
        data.mount().await;
        let s = data.state();
        assert!(!s.loading);
        assert!(s.overview.error.is_some());
        assert!(s.error.is_some());

        data.refresh_overview().await;
        data.fetch_playbooks().await;
        assert!(!data.state().loading);
    }

    #[tokio::test]
    async fn read_errors_are_recorded_not_returned() {
        let data = context().await;
        data.fetch_alerts().await;
        let before = data.state().alerts.value.clone();

        mock(&data).fail(Op::Alerts, ApiError::Network("offline".into()));
        data.fetch_alerts().await;

        let s = data.state();
        assert_eq!(s.alerts.value, before);
        assert_eq!(s.alerts.error, Some(ApiError::Network("offline".into())));
        assert_eq!(s.error, Some(ApiError::Network("offline".into())));

        data.clear_error();
        assert_eq!(data.state().error, None);
    }

    #[tokio::test]
    async fn identical_metrics_request_is_skipped() {
        let data = context().await;
        data.fetch_metrics("cust-001", 30).await;
        let first = data.state();
        data.fetch_metrics("cust-001", 30).await;
        assert_eq!(mock(&data).calls(Op::Metrics), 1);
        assert_eq!(data.state(), first);

        data.fetch_metrics("cust-001", 7).await;
        assert_eq!(mock(&data).calls(Op::Metrics), 2);
        assert_eq!(
            data.state().metrics_query,
            Some(MetricsQuery::new("cust-001", 7))
        );
    }

    #[tokio::test]
    async fn refresh_metrics_bypasses_guard() {
        let data = context().await;
        data.fetch_metrics("cust-002", 14).await;
        data.refresh_metrics().await;
        assert_eq!(mock(&data).calls(Op::Metrics), 2);
        assert_eq!(
            data.state().metrics.value.unwrap().customer_id,
            "cust-002"
        );
    }

    #[tokio::test]
    async fn failed_metrics_fetch_can_be_retried() {
        let data = context().await;
        mock(&data).fail(Op::Metrics, ApiError::Network("offline".into()));
        data.fetch_metrics("cust-001", 30).await;
        assert!(data.state().metrics.error.is_some());

        mock(&data).clear_failure(Op::Metrics);
        data.refresh_metrics().await;
        assert_eq!(mock(&data).calls(Op::Metrics), 2);
        let s = data.state();
        assert!(s.metrics.value.is_some());
        assert_eq!(s.metrics.error, None);
    }

    #[tokio::test]
    async fn identical_metrics_request_is_skipped_after_failure() {
        let data = context().await;
        mock(&data).fail(Op::Metrics, ApiError::Network("offline".into()));
        data.fetch_metrics("cust-001", 30).await;
        mock(&data).clear_failure(Op::Metrics);
        data.fetch_metrics("cust-001", 30).await;

        assert_eq!(mock(&data).calls(Op::Metrics), 1);
        let s = data.state();
        assert!(s.metrics.value.is_none());
        assert_eq!(s.metrics.error, Some(ApiError::Network("offline".into())));
    }

    #[tokio::test]
    async fn created_playbook_appears_after_refetch() {
        let data = context().await;
        data.fetch_playbooks().await;
        let draft = PlaybookDraft {
            name: "Renewal Nudge".into(),
            description: "Remind 30 days before renewal".into(),
            rules: vec![Rule {
                condition: "days_to_renewal < 30".into(),
                action: "send_email".into(),
            }],
        };

        let created = data.create_playbook(draft.clone()).await.unwrap();
        let list = data.state().playbooks.value.unwrap();
        assert!(list.iter().any(|p| draft.matches(p)));
        assert_eq!(list.last().map(|p| &p.id), Some(&created.id));
        assert_eq!(mock(&data).calls(Op::Playbooks), 2);
    }

    #[tokio::test]
    async fn deleted_playbook_is_gone_after_refetch() {
        let data = context().await;
        data.fetch_playbooks().await;
        data.delete_playbook("1").await.unwrap();
        let list = data.state().playbooks.value.unwrap();
        assert!(list.iter().all(|p| p.id != "1"));
        assert_eq!(list.len(), 1);
    }

    #[tokio::test]
    async fn updated_playbook_is_refetched() {
        let data = context().await;
        let patch = PlaybookPatch {
            name: Some("Renamed".into()),
            ..Default::default()
        };
        let updated = data.update_playbook("2", patch).await.unwrap();
        assert_eq!(updated.name, "Renamed");
        let list = data.state().playbooks.value.unwrap();
        assert_eq!(list[1].name, "Renamed");
    }

    #[tokio::test]
    async fn failed_mutation_returns_error_and_keeps_cache() {
        let data = context().await;
        data.fetch_playbooks().await;
        let before = data.state().playbooks;

        let err = data.delete_playbook("404").await.unwrap_err();
        assert!(matches!(err, ApiError::Server { status: 404, .. }));
        assert_eq!(data.state().playbooks, before);
        assert_eq!(mock(&data).calls(Op::Playbooks), 1);
    }

    #[tokio::test]
    async fn alert_action_triggers_refetch() {
        let data = context().await;
        data.fetch_alerts().await;
        data.take_alert_action("1", AlertAction::Dismiss)
            .await
            .unwrap();
        assert_eq!(mock(&data).calls(Op::AlertAction), 1);
        assert_eq!(mock(&data).calls(Op::Alerts), 2);
        assert_eq!(data.state().alerts.value.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn alert_filter_is_kept_in_state() {
        let data = context().await;
        data.set_alert_filter(Some(AlertStatus::Active));
        data.fetch_alerts().await;
        assert_eq!(data.state().alert_filter, Some(AlertStatus::Active));
    }

    #[tokio::test]
    async fn unmount_discards_in_flight_results() {
        let data =
            context_with(MockBackend::default().with_latency(Duration::from_millis(20))).await;
        tokio::join!(data.refresh_overview(), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            data.unmount();
        });
        assert_eq!(data.state().overview, Resource::default());
        assert_eq!(mock(&data).calls(Op::Overview), 1);

        data.refresh_overview().await;
        assert!(data.state().overview.value.is_some());
    }

    #[tokio::test]
    async fn superseded_metrics_selection_is_dropped() {
        let data =
            context_with(MockBackend::default().with_latency(Duration::from_millis(20))).await;
        tokio::join!(data.fetch_metrics("cust-001", 30), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            data.fetch_metrics("cust-002", 30).await;
        });
        let s = data.state();
        assert_eq!(s.metrics.value.unwrap().customer_id, "cust-002");
        assert_eq!(s.metrics_query, Some(MetricsQuery::new("cust-002", 30)));
    }
}
