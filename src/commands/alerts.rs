use crate::context::AppContext;
use crate::history::{price_alerts, AlertSeverity};
use anyhow::Result;
use log::info;

pub async fn run(app: &AppContext, threshold_pct: Option<f64>) -> Result<()> {
    let threshold_pct = threshold_pct.unwrap_or(app.settings().alert_threshold_pct);
    let service = app.service();
    let alerts = price_alerts(service.store(), threshold_pct);

    let critical = alerts
        .iter()
        .filter(|alert| alert.severity == AlertSeverity::Critical)
        .count();
    info!(
        "{} price alert(s) at {:.1}% threshold ({} critical)",
        alerts.len(),
        threshold_pct,
        critical
    );

    println!("{}", serde_json::to_string_pretty(&alerts)?);
    Ok(())
}
