use crate::context::AppContext;
use anyhow::{Context, Result};
use log::{info, warn};

pub async fn run(app: &AppContext, commodity: &str, region: &str, days_ahead: usize) -> Result<()> {
    info!(
        "Forecasting {} / {} for {} day(s) ahead",
        commodity, region, days_ahead
    );

    let service = app.service();
    let report = service
        .generate_forecast(commodity, region, days_ahead)
        .with_context(|| format!("Forecast for {commodity} / {region} failed"))?;

    if report.source.is_simulated() {
        warn!("Forecast for {} / {} is simulated, not model-based", commodity, region);
    }
    info!(
        "Forecast {}: {:?} trend, {:?} risk, {:?} confidence ({:+.2}% over {} day(s))",
        report.forecast_id,
        report.analysis.trend.direction,
        report.analysis.risk.level,
        report.analysis.confidence.level,
        report.analysis.trend.total_change_pct,
        report.days_ahead
    );

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
