use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use churn_client::{
    AnyBackend, ApiClient, AuthContext, AuthState, DataContext, HttpBackend, MockBackend,
};
use churn_core::config::{BackendKind, ClientConfig};
use churn_core::storage::FileStorage;
use churn_core::types::{MetricsQuery, Session};

/// Options that override the stored configuration for one invocation.
#[derive(Debug, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub mock: bool,
}

/// The contexts every view is handed: built once at startup and dropped on
/// exit.
pub struct App {
    pub config: ClientConfig,
    pub auth: Arc<AuthContext<AnyBackend>>,
    pub data: DataContext<AnyBackend>,
}

impl App {
    pub fn open(state_dir: &Path, overrides: Overrides) -> anyhow::Result<Self> {
        let mut config = ClientConfig::load(state_dir).context("failed to load config")?;
        if let Some(url) = overrides.base_url {
            config.backend = BackendKind::Http;
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
        if overrides.mock {
            config.backend = BackendKind::Mock;
        }

        let backend = build_backend(&config)?;
        tracing::debug!(backend = ?config.backend, state_dir = %state_dir.display(), "opening app");

        let storage = Arc::new(FileStorage::in_state_dir(state_dir));
        let client = Arc::new(ApiClient::new(backend, storage));
        let auth = Arc::new(AuthContext::restore(Arc::clone(&client)));
        let data = DataContext::new(
            client,
            MetricsQuery::new(
                config.default_customer_id.clone(),
                config.default_range_days,
            ),
        );

        Ok(Self {
            config,
            auth,
            data,
        })
    }

    /// Gate for views that need a signed-in user.
    pub fn require_session(&self) -> anyhow::Result<Session> {
        match self.auth.state() {
            AuthState::Authenticated(session) => Ok(session),
            AuthState::AuthFailed(e) => {
                anyhow::bail!("not logged in (last login failed: {e}); run: churn login")
            }
            _ => anyhow::bail!("not logged in; run: churn login"),
        }
    }

    /// After a view ran, report a session the backend rejected meanwhile.
    pub fn check_session(&self) -> anyhow::Result<()> {
        if !self.auth.is_authenticated() {
            anyhow::bail!("session expired; run: churn login");
        }
        Ok(())
    }
}

fn build_backend(config: &ClientConfig) -> anyhow::Result<AnyBackend> {
    match config.backend {
        BackendKind::Http => {
            let timeout = config.request_timeout_secs.map(Duration::from_secs);
            let http = HttpBackend::new(&config.api_base_url, &config.model_api_url, timeout)
                .context("failed to create HTTP client")?;
            Ok(AnyBackend::Http(http))
        }
        BackendKind::Mock => {
            let mock = match &config.mock_fixtures {
                Some(path) => MockBackend::from_yaml_file(path).with_context(|| {
                    format!("failed to load mock fixtures from {}", path.display())
                })?,
                None => MockBackend::default(),
            };
            Ok(AnyBackend::Mock(mock))
        }
    }
}
