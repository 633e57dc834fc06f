use crate::app::App;
use crate::output::{percent, print_json};
use churn_core::types::ChurnPrediction;

/// Score a customer with the churn model. Needs no session.
pub async fn run(app: &App, usage: f64, tickets: u32, json: bool) -> anyhow::Result<()> {
    let prediction = app.auth.client().predict_churn(usage, tickets).await?;
    if json {
        print_json(&serde_json::json!({
            "churn_probability": prediction.churn_probability,
            "churn_prediction": prediction.churn_prediction,
            "risk": prediction.band(),
            "alert": prediction.raises_alert(),
        }))?;
    } else {
        print!("{}", render(&prediction));
    }
    Ok(())
}

pub(crate) fn render(p: &ChurnPrediction) -> String {
    let mut out = format!(
        "Churn probability: {} ({} risk)\n",
        percent(p.churn_probability),
        p.band().severity()
    );
    out.push_str(if p.will_churn() {
        "Prediction: likely to churn\n"
    } else {
        "Prediction: likely to stay\n"
    });
    if p.raises_alert() {
        out.push_str("Above the alert threshold: a high-risk alert would be raised.\n");
    }
    out
}
