use crate::context::AppContext;
use crate::service::ServiceHealth;
use anyhow::Result;
use log::{info, warn};

pub async fn run(app: &AppContext) -> Result<()> {
    let report = app.service().health();
    match report.status {
        ServiceHealth::Ready => info!(
            "Service ready: {} entities, {} records",
            report.entity_count, report.total_records
        ),
        ServiceHealth::Degraded => warn!(
            "Service degraded, forecasts are simulated: {}",
            report.model_error.as_deref().unwrap_or("model unavailable")
        ),
        ServiceHealth::Unavailable => warn!("Service unavailable: no price data loaded"),
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
