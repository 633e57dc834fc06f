use crate::app::App;
use crate::cmd::{alerts, metrics, overview, playbooks};
use crate::output::{print_json, render_panel};
use churn_client::{DataState, Resource};

/// Mount the data context and render every panel from one snapshot.
pub async fn run(app: &App, json: bool) -> anyhow::Result<()> {
    let session = app.require_session()?;
    let watcher = app.auth.spawn_watcher();
    app.data.mount().await;
    app.data.unmount();
    watcher.abort();
    app.check_session()?;

    let state = app.data.state();
    if json {
        return print_json(&snapshot(&state));
    }
    println!("Signed in as {} ({})\n", session.user.name, session.user.role);
    print!("{}", render(&state));

    let nothing_loaded = state.overview.value.is_none()
        && state.metrics.value.is_none()
        && state.playbooks.value.is_none()
        && state.alerts.value.is_none();
    match &state.error {
        Some(e) if nothing_loaded => {
            Err(anyhow::Error::new(e.clone()).context("failed to load the dashboard"))
        }
        _ => Ok(()),
    }
}

pub(crate) fn render(state: &DataState) -> String {
    let metrics_title = match &state.metrics_query {
        Some(q) => format!("Metrics for {} (last {} days)", q.customer_id, q.range_days),
        None => "Metrics".to_string(),
    };
    [
        render_panel("Overview", state.loading, &state.overview, overview::render),
        render_panel(&metrics_title, state.loading, &state.metrics, metrics::render),
        render_panel("Playbooks", state.loading, &state.playbooks, |p| {
            playbooks::render(p)
        }),
        render_panel("Alerts", state.loading, &state.alerts, |a| alerts::render(a)),
    ]
    .join("\n")
}

fn snapshot(state: &DataState) -> serde_json::Value {
    fn panel<T: serde::Serialize>(r: &Resource<T>) -> serde_json::Value {
        serde_json::json!({
            "value": r.value,
            "error": r.error.as_ref().map(|e| e.to_string()),
        })
    }
    serde_json::json!({
        "overview": panel(&state.overview),
        "metrics": panel(&state.metrics),
        "playbooks": panel(&state.playbooks),
        "alerts": panel(&state.alerts),
    })
}
