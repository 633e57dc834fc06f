use crate::app::App;
use crate::cmd::show_panel;
use crate::output::{format_table, print_json};
use clap::Subcommand;
use churn_core::types::{Alert, AlertAction, AlertStatus};

#[derive(Subcommand)]
pub enum AlertsSubcommand {
    /// List alerts
    List {
        /// Only alerts in this status: active, acknowledged, dismissed or resolved
        #[arg(long)]
        status: Option<AlertStatus>,
    },

    /// Acknowledge, dismiss or resolve an alert
    Act {
        id: String,
        /// acknowledge (ack), dismiss or resolve
        action: AlertAction,
    },
}

pub async fn run(app: &App, subcmd: AlertsSubcommand, json: bool) -> anyhow::Result<()> {
    app.require_session()?;
    match subcmd {
        AlertsSubcommand::List { status } => {
            app.data.set_alert_filter(status);
            app.data.fetch_alerts().await;
        }
        AlertsSubcommand::Act { id, action } => {
            app.data.take_alert_action(&id, action).await?;
            if json {
                return print_json(&serde_json::json!({ "id": id, "action": action }));
            }
            println!("Alert {id}: {}", action.as_str());
        }
    }
    app.check_session()?;
    let state = app.data.state();
    let title = match state.alert_filter {
        Some(status) => format!("Alerts ({})", status.as_str()),
        None => "Alerts".to_string(),
    };
    show_panel(&title, false, &state.alerts, json, |a| render(a))
}

pub(crate) fn render(alerts: &[Alert]) -> String {
    if alerts.is_empty() {
        return "No alerts.\n".to_string();
    }
    let mut sorted: Vec<&Alert> = alerts.iter().collect();
    sorted.sort_by(|a, b| a.severity.cmp(&b.severity).then(b.date.cmp(&a.date)));
    let rows: Vec<Vec<String>> = sorted
        .into_iter()
        .map(|a| {
            vec![
                a.id.clone(),
                a.severity.to_string(),
                a.date.to_string(),
                a.customer_id.clone().unwrap_or_else(|| "-".into()),
                a.message.clone(),
            ]
        })
        .collect();
    format_table(&["ID", "SEVERITY", "DATE", "CUSTOMER", "MESSAGE"], &rows)
}
