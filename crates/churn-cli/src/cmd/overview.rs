use crate::app::App;
use crate::cmd::show_panel;
use crate::output::{format_table, percent};
use churn_core::types::OverviewSnapshot;

pub async fn run(app: &App, json: bool) -> anyhow::Result<()> {
    app.require_session()?;
    app.data.refresh_overview().await;
    app.check_session()?;
    let state = app.data.state();
    show_panel("Overview", false, &state.overview, json, render)
}

pub(crate) fn render(o: &OverviewSnapshot) -> String {
    let total = o.total_customers();
    let share = |n: u64| {
        if total == 0 {
            "-".to_string()
        } else {
            percent(n as f64 / total as f64)
        }
    };
    let rows = vec![
        vec!["High risk".into(), o.high_risk.to_string(), share(o.high_risk)],
        vec![
            "Medium risk".into(),
            o.medium_risk.to_string(),
            share(o.medium_risk),
        ],
        vec!["Low risk".into(), o.low_risk.to_string(), share(o.low_risk)],
    ];
    let mut out = format_table(&["SEGMENT", "CUSTOMERS", "SHARE"], &rows);
    out.push_str(&format!("Average CLV:      {:.2}\n", o.average_clv));
    out.push_str(&format!("Retention rate:   {}\n", percent(o.retention_rate)));
    out.push_str(&format!("Active playbooks: {}\n", o.active_playbooks_count));
    out
}
