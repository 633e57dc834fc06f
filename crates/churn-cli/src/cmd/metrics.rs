use crate::app::App;
use crate::cmd::show_panel;
use crate::output::{format_table, percent};
use churn_core::types::{MetricsSeries, RiskBand};

pub async fn run(
    app: &App,
    customer: Option<String>,
    range: Option<u32>,
    json: bool,
) -> anyhow::Result<()> {
    app.require_session()?;
    let customer = customer.unwrap_or_else(|| app.config.default_customer_id.clone());
    let range = range.unwrap_or(app.config.default_range_days);
    app.data.fetch_metrics(&customer, range).await;
    app.check_session()?;
    let state = app.data.state();
    show_panel(
        &format!("Metrics for {customer} (last {range} days)"),
        false,
        &state.metrics,
        json,
        render,
    )
}

pub(crate) fn render(series: &MetricsSeries) -> String {
    if series.data_points.is_empty() {
        return "No data points.\n".to_string();
    }
    let rows: Vec<Vec<String>> = series
        .data_points
        .iter()
        .map(|p| {
            vec![
                p.date.to_string(),
                format!("{:.1}", p.usage_score),
                p.support_tickets.to_string(),
                percent(p.churn_probability),
            ]
        })
        .collect();
    let mut out = format_table(&["DATE", "USAGE", "TICKETS", "CHURN"], &rows);
    if let Some(latest) = series.latest() {
        let band = RiskBand::from_probability(latest.churn_probability).severity();
        out.push_str(&format!(
            "Latest: {} churn probability on {} ({band} risk)\n",
            percent(latest.churn_probability),
            latest.date
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use churn_core::types::MetricsPoint;

    fn point(day: u32, churn: f64) -> MetricsPoint {
        MetricsPoint {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            usage_score: 42.0,
            support_tickets: 3,
            churn_probability: churn,
        }
    }

    #[test]
    fn latest_point_sets_the_band() {
        let series = MetricsSeries {
            customer_id: "cust-001".into(),
            data_points: vec![point(2, 0.2), point(1, 0.9)],
        };
        let out = render(&series);
        assert!(out.contains("2024-01-01  42.0   3        90%"));
        assert!(out.contains("Latest: 20% churn probability on 2024-01-02 (low risk)"));
    }

    #[test]
    fn empty_series() {
        let series = MetricsSeries {
            customer_id: "cust-001".into(),
            data_points: vec![],
        };
        assert_eq!(render(&series), "No data points.\n");
    }
}
