use crate::context::AppContext;
use crate::service::BatchOptions;
use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::path::Path;

pub async fn run(app: &AppContext, days_ahead: usize, output_path: Option<&Path>) -> Result<()> {
    let service = app.service();
    let report = tokio::task::spawn_blocking(move || {
        service.batch_forecast(days_ahead, BatchOptions { show_progress: true })
    })
    .await
    .context("Batch forecasting task panicked")?
    .context("Batch forecast failed")?;

    let statistics = &report.batch_summary.statistics;
    info!(
        "Batch finished: {} succeeded, {} failed, {} simulated ({:.2}% success)",
        statistics.successful_predictions,
        statistics.failed_predictions,
        statistics.simulated_predictions,
        statistics.success_rate
    );

    let payload = serde_json::to_string_pretty(&report)?;
    match output_path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(path, payload)
                .with_context(|| format!("Failed to write batch report to {}", path.display()))?;
            info!("Batch report written to {}", path.display());
        }
        None => println!("{payload}"),
    }

    Ok(())
}
